//! Row-level upsert statements shared by `instances::save_node` (the
//! recursive whole-tree save) and the standalone `Resources`/`Links`
//! sub-containers, so the two call sites can't drift apart.

use sqlx::PgConnection;

use crate::error::StoreError;
use crate::ids::InstanceId;
use crate::json::to_json;
use crate::model::{Link, Resource};

pub async fn upsert_resource_row(conn: &mut PgConnection, resource: &Resource) -> Result<(), StoreError> {
    let status: i16 = resource.status.into();
    let precise: i16 = resource.precise_status.into();
    sqlx::query(
        "INSERT INTO resources (
            id, name, type, template_name, template_index, status, precise_status,
            last_status_update_timestamp, last_deployed_timestamp, last_deploy_attempt_timestamp,
            spec_data, description, metadata, depends_on_resources, depends_on_children,
            failure_reasons, drifted, last_drift_detected_timestamp, durations
         ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19)
         ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            type = EXCLUDED.type,
            template_name = EXCLUDED.template_name,
            template_index = EXCLUDED.template_index,
            status = EXCLUDED.status,
            precise_status = EXCLUDED.precise_status,
            last_status_update_timestamp = EXCLUDED.last_status_update_timestamp,
            last_deployed_timestamp = EXCLUDED.last_deployed_timestamp,
            last_deploy_attempt_timestamp = EXCLUDED.last_deploy_attempt_timestamp,
            spec_data = EXCLUDED.spec_data,
            description = EXCLUDED.description,
            metadata = EXCLUDED.metadata,
            depends_on_resources = EXCLUDED.depends_on_resources,
            depends_on_children = EXCLUDED.depends_on_children,
            failure_reasons = EXCLUDED.failure_reasons,
            drifted = EXCLUDED.drifted,
            last_drift_detected_timestamp = EXCLUDED.last_drift_detected_timestamp,
            durations = EXCLUDED.durations",
    )
    .bind(resource.id.as_uuid())
    .bind(&resource.name)
    .bind(&resource.resource_type)
    .bind(&resource.template_name)
    .bind(resource.template_index)
    .bind(status)
    .bind(precise)
    .bind(resource.last_status_update_timestamp)
    .bind(resource.last_deployed_timestamp)
    .bind(resource.last_deploy_attempt_timestamp)
    .bind(&resource.spec_data)
    .bind(&resource.description)
    .bind(to_json(&resource.metadata)?)
    .bind(to_json(&resource.depends_on_resources)?)
    .bind(to_json(&resource.depends_on_children)?)
    .bind(to_json(&resource.failure_reasons)?)
    .bind(resource.drifted)
    .bind(resource.last_drift_detected_timestamp)
    .bind(&resource.durations)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn upsert_instance_resource_relation(
    conn: &mut PgConnection,
    instance_id: InstanceId,
    resource_name: &str,
    resource_id: uuid::Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO blueprint_instance_resources (instance_id, resource_name, resource_id)
         VALUES ($1,$2,$3)
         ON CONFLICT (instance_id, resource_name) DO UPDATE SET resource_id = EXCLUDED.resource_id",
    )
    .bind(instance_id.as_uuid())
    .bind(resource_name)
    .bind(resource_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn upsert_link_row(conn: &mut PgConnection, link: &Link) -> Result<(), StoreError> {
    let status: i16 = link.status.into();
    let precise: i16 = link.precise_status.into();
    sqlx::query(
        "INSERT INTO links (
            id, name, status, precise_status,
            last_status_update_timestamp, last_deployed_timestamp, last_deploy_attempt_timestamp,
            intermediary_resources_state, data, failure_reasons, durations
         ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11)
         ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            status = EXCLUDED.status,
            precise_status = EXCLUDED.precise_status,
            last_status_update_timestamp = EXCLUDED.last_status_update_timestamp,
            last_deployed_timestamp = EXCLUDED.last_deployed_timestamp,
            last_deploy_attempt_timestamp = EXCLUDED.last_deploy_attempt_timestamp,
            intermediary_resources_state = EXCLUDED.intermediary_resources_state,
            data = EXCLUDED.data,
            failure_reasons = EXCLUDED.failure_reasons,
            durations = EXCLUDED.durations",
    )
    .bind(link.id.as_uuid())
    .bind(&link.name)
    .bind(status)
    .bind(precise)
    .bind(link.last_status_update_timestamp)
    .bind(link.last_deployed_timestamp)
    .bind(link.last_deploy_attempt_timestamp)
    .bind(to_json(&link.intermediary_resources)?)
    .bind(&link.data)
    .bind(to_json(&link.failure_reasons)?)
    .bind(&link.durations)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn upsert_instance_link_relation(
    conn: &mut PgConnection,
    instance_id: InstanceId,
    link_name: &str,
    link_id: uuid::Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO blueprint_instance_links (instance_id, link_name, link_id)
         VALUES ($1,$2,$3)
         ON CONFLICT (instance_id, link_name) DO UPDATE SET link_id = EXCLUDED.link_id",
    )
    .bind(instance_id.as_uuid())
    .bind(link_name)
    .bind(link_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
