//! Idempotent schema DDL, run on every [`crate::Container::connect`]:
//! one unparameterized multi-statement string, safe to re-run because every
//! statement is `IF NOT EXISTS` / `CREATE OR REPLACE`.

pub const MIGRATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS blueprint_instances (
    id                            UUID PRIMARY KEY,
    name                          TEXT UNIQUE,
    status                        SMALLINT NOT NULL DEFAULT 0,
    last_status_update_timestamp  TIMESTAMPTZ,
    last_deployed_timestamp       TIMESTAMPTZ,
    last_deploy_attempt_timestamp TIMESTAMPTZ,
    metadata                      JSONB NOT NULL DEFAULT '{}',
    exports                       JSONB NOT NULL DEFAULT '{}',
    child_dependencies            JSONB NOT NULL DEFAULT '{}',
    durations                     JSONB NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS resources (
    id                             UUID PRIMARY KEY,
    name                           TEXT NOT NULL,
    type                           TEXT NOT NULL,
    template_name                  TEXT,
    template_index                 INTEGER,
    status                         SMALLINT NOT NULL DEFAULT 0,
    precise_status                 SMALLINT NOT NULL DEFAULT 0,
    last_status_update_timestamp   TIMESTAMPTZ,
    last_deployed_timestamp        TIMESTAMPTZ,
    last_deploy_attempt_timestamp  TIMESTAMPTZ,
    spec_data                      JSONB NOT NULL DEFAULT '{}',
    description                    TEXT,
    metadata                       JSONB NOT NULL DEFAULT '{}',
    depends_on_resources           JSONB NOT NULL DEFAULT '[]',
    depends_on_children            JSONB NOT NULL DEFAULT '[]',
    failure_reasons                JSONB NOT NULL DEFAULT '[]',
    drifted                        BOOLEAN NOT NULL DEFAULT FALSE,
    last_drift_detected_timestamp  TIMESTAMPTZ,
    durations                      JSONB NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS links (
    id                             UUID PRIMARY KEY,
    name                           TEXT NOT NULL,
    status                         SMALLINT NOT NULL DEFAULT 0,
    precise_status                 SMALLINT NOT NULL DEFAULT 0,
    last_status_update_timestamp   TIMESTAMPTZ,
    last_deployed_timestamp        TIMESTAMPTZ,
    last_deploy_attempt_timestamp  TIMESTAMPTZ,
    intermediary_resources_state   JSONB NOT NULL DEFAULT '[]',
    data                           JSONB NOT NULL DEFAULT '{}',
    failure_reasons                JSONB NOT NULL DEFAULT '[]',
    durations                      JSONB NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS blueprint_instance_resources (
    instance_id   UUID NOT NULL REFERENCES blueprint_instances(id) ON DELETE CASCADE,
    resource_name TEXT NOT NULL,
    resource_id   UUID NOT NULL REFERENCES resources(id) ON DELETE CASCADE,
    PRIMARY KEY (instance_id, resource_name)
);
CREATE INDEX IF NOT EXISTS idx_instance_resources_resource
    ON blueprint_instance_resources (resource_id);

CREATE TABLE IF NOT EXISTS blueprint_instance_links (
    instance_id UUID NOT NULL REFERENCES blueprint_instances(id) ON DELETE CASCADE,
    link_name   TEXT NOT NULL,
    link_id     UUID NOT NULL REFERENCES links(id) ON DELETE CASCADE,
    PRIMARY KEY (instance_id, link_name)
);
CREATE INDEX IF NOT EXISTS idx_instance_links_link
    ON blueprint_instance_links (link_id);

CREATE TABLE IF NOT EXISTS blueprint_instance_children (
    parent_instance_id UUID NOT NULL REFERENCES blueprint_instances(id) ON DELETE CASCADE,
    child_instance_name TEXT NOT NULL,
    child_instance_id   UUID NOT NULL REFERENCES blueprint_instances(id),
    PRIMARY KEY (parent_instance_id, child_instance_name)
);
CREATE INDEX IF NOT EXISTS idx_instance_children_child
    ON blueprint_instance_children (child_instance_id);

CREATE TABLE IF NOT EXISTS resource_drift (
    resource_id        UUID PRIMARY KEY REFERENCES resources(id) ON DELETE CASCADE,
    drifted_spec_data  JSONB NOT NULL DEFAULT '{}',
    difference         JSONB NOT NULL DEFAULT '{}',
    timestamp          TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS events (
    id           UUID PRIMARY KEY,
    type         TEXT NOT NULL,
    channel_type TEXT NOT NULL,
    channel_id   UUID NOT NULL,
    data         JSONB NOT NULL DEFAULT '{}',
    timestamp    TIMESTAMPTZ NOT NULL,
    "end"        BOOLEAN NOT NULL DEFAULT FALSE
);
CREATE INDEX IF NOT EXISTS idx_events_channel
    ON events (channel_type, channel_id, id);
CREATE INDEX IF NOT EXISTS idx_events_channel_timestamp
    ON events (channel_type, channel_id, "timestamp");

CREATE TABLE IF NOT EXISTS changesets (
    id                 UUID PRIMARY KEY,
    instance_id        UUID NOT NULL REFERENCES blueprint_instances(id) ON DELETE CASCADE,
    destroy            BOOLEAN NOT NULL DEFAULT FALSE,
    status             TEXT NOT NULL,
    blueprint_location TEXT NOT NULL,
    changes            JSONB NOT NULL DEFAULT '{}',
    created            TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_changesets_instance
    ON changesets (instance_id);

CREATE TABLE IF NOT EXISTS blueprint_validations (
    id                 UUID PRIMARY KEY,
    blueprint_location TEXT NOT NULL,
    status             TEXT NOT NULL,
    created            TIMESTAMPTZ NOT NULL
);

-- Aggregated read views: one JSON document per resource/link row joined to
-- its owning instance, letting `Instances::get` materialize the nested tree
-- in a single round trip per level.
CREATE OR REPLACE VIEW resources_json AS
SELECT
    ir.instance_id,
    ir.resource_name,
    jsonb_build_object(
        'id', r.id,
        'instance_id', ir.instance_id,
        'name', r.name,
        'resource_type', r.type,
        'template_name', r.template_name,
        'template_index', r.template_index,
        'status', r.status,
        'precise_status', r.precise_status,
        'last_status_update_timestamp', r.last_status_update_timestamp,
        'last_deployed_timestamp', r.last_deployed_timestamp,
        'last_deploy_attempt_timestamp', r.last_deploy_attempt_timestamp,
        'spec_data', r.spec_data,
        'description', r.description,
        'metadata', r.metadata,
        'depends_on_resources', r.depends_on_resources,
        'depends_on_children', r.depends_on_children,
        'failure_reasons', r.failure_reasons,
        'drifted', r.drifted,
        'last_drift_detected_timestamp', r.last_drift_detected_timestamp,
        'durations', r.durations
    ) AS resource
FROM resources r
JOIN blueprint_instance_resources ir ON ir.resource_id = r.id;

CREATE OR REPLACE VIEW links_json AS
SELECT
    il.instance_id,
    il.link_name,
    jsonb_build_object(
        'id', l.id,
        'instance_id', il.instance_id,
        'name', l.name,
        'status', l.status,
        'precise_status', l.precise_status,
        'last_status_update_timestamp', l.last_status_update_timestamp,
        'last_deployed_timestamp', l.last_deployed_timestamp,
        'last_deploy_attempt_timestamp', l.last_deploy_attempt_timestamp,
        'intermediary_resources', l.intermediary_resources_state,
        'data', l.data,
        'failure_reasons', l.failure_reasons,
        'durations', l.durations
    ) AS link
FROM links l
JOIN blueprint_instance_links il ON il.link_id = l.id;
"#;
