//! The `Instances` sub-container.

use std::collections::{HashMap, HashSet};

use async_recursion::async_recursion;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::ids::InstanceId;
use crate::json::{from_json, to_json};
use crate::model::{DeploymentStatus, Instance, InstanceStatusInfo, Tree};
use crate::sql::{
    upsert_instance_link_relation, upsert_instance_resource_relation, upsert_link_row,
    upsert_resource_row,
};

#[derive(Clone)]
pub struct Instances {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct InstanceRow {
    id: Uuid,
    name: Option<String>,
    status: i16,
    last_status_update_timestamp: Option<DateTime<Utc>>,
    last_deployed_timestamp: Option<DateTime<Utc>>,
    last_deploy_attempt_timestamp: Option<DateTime<Utc>>,
    metadata: Tree,
    exports: Tree,
    child_dependencies: Tree,
    durations: Tree,
}

fn bare_instance(row: InstanceRow) -> Result<Instance, StoreError> {
    let status = DeploymentStatus::try_from(row.status)
        .map_err(|e| StoreError::Internal(format!("instance {}: {e}", row.id)))?;
    Ok(Instance {
        id: InstanceId::from(row.id),
        name: row.name,
        status,
        last_status_update_timestamp: row.last_status_update_timestamp,
        last_deployed_timestamp: row.last_deployed_timestamp,
        last_deploy_attempt_timestamp: row.last_deploy_attempt_timestamp,
        metadata: row.metadata,
        exports: from_json(row.exports)?,
        child_dependencies: from_json(row.child_dependencies)?,
        durations: row.durations,
        resources: HashMap::new(),
        links: HashMap::new(),
        children: HashMap::new(),
    })
}

impl Instances {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve an instance name to its id.
    pub async fn lookup_id_by_name(&self, name: &str) -> Result<InstanceId, StoreError> {
        let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM blueprint_instances WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(id,)| InstanceId::from(id))
            .ok_or_else(|| StoreError::InstanceNotFound(name.to_string()))
    }

    /// Fetch an instance together with its resources, links, and the full
    /// tree of descendant child instances. A malformed `id` is
    /// treated the same as a missing one.
    pub async fn get(&self, id: &str) -> Result<Instance, StoreError> {
        let root_id = InstanceId::parse(id).map_err(|_| StoreError::InstanceNotFound(id.to_string()))?;
        self.get_by_id(root_id).await
    }

    pub async fn get_by_id(&self, root_id: InstanceId) -> Result<Instance, StoreError> {
        // 1. All (parent, child_name, child_id) edges reachable from root,
        // via one recursive query.
        #[derive(sqlx::FromRow)]
        struct Edge {
            parent_id: Uuid,
            child_name: String,
            child_id: Uuid,
        }
        let edges: Vec<Edge> = sqlx::query_as(
            r#"
            WITH RECURSIVE descendants(parent_id, child_name, child_id) AS (
                SELECT parent_instance_id, child_instance_name, child_instance_id
                FROM blueprint_instance_children
                WHERE parent_instance_id = $1
              UNION ALL
                SELECT c.parent_instance_id, c.child_instance_name, c.child_instance_id
                FROM blueprint_instance_children c
                JOIN descendants d ON c.parent_instance_id = d.child_id
            )
            SELECT parent_id, child_name, child_id FROM descendants
            "#,
        )
        .bind(root_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let mut node_ids: Vec<Uuid> = edges.iter().map(|e| e.child_id).collect();
        node_ids.push(root_id.as_uuid());

        // 2. Bare instance rows for root + every descendant, in one query.
        let rows: Vec<InstanceRow> =
            sqlx::query_as("SELECT * FROM blueprint_instances WHERE id = ANY($1)")
                .bind(&node_ids)
                .fetch_all(&self.pool)
                .await?;

        let mut nodes: HashMap<InstanceId, Instance> = HashMap::with_capacity(rows.len());
        for row in rows {
            let instance = bare_instance(row)?;
            nodes.insert(instance.id, instance);
        }

        if !nodes.contains_key(&root_id) {
            return Err(StoreError::InstanceNotFound(root_id.to_string()));
        }

        // 3. Resources and links for every node, joined in from the
        // aggregated read views.
        let resource_rows: Vec<(Uuid, Tree)> =
            sqlx::query_as("SELECT instance_id, resource FROM resources_json WHERE instance_id = ANY($1)")
                .bind(&node_ids)
                .fetch_all(&self.pool)
                .await?;
        for (instance_id, resource_json) in resource_rows {
            let resource: crate::model::Resource = from_json(resource_json)?;
            if let Some(instance) = nodes.get_mut(&InstanceId::from(instance_id)) {
                instance.resources.insert(resource.name.clone(), resource);
            }
        }

        let link_rows: Vec<(Uuid, Tree)> =
            sqlx::query_as("SELECT instance_id, link FROM links_json WHERE instance_id = ANY($1)")
                .bind(&node_ids)
                .fetch_all(&self.pool)
                .await?;
        for (instance_id, link_json) in link_rows {
            let link: crate::model::Link = from_json(link_json)?;
            if let Some(instance) = nodes.get_mut(&InstanceId::from(instance_id)) {
                instance.links.insert(link.name.clone(), link);
            }
        }

        // 4. Wire children into their parents in memory, keyed by parent id.
        let mut adjacency: HashMap<InstanceId, Vec<(String, InstanceId)>> = HashMap::new();
        for edge in edges {
            adjacency
                .entry(InstanceId::from(edge.parent_id))
                .or_default()
                .push((edge.child_name, InstanceId::from(edge.child_id)));
        }

        fn attach(
            id: InstanceId,
            nodes: &HashMap<InstanceId, Instance>,
            adjacency: &HashMap<InstanceId, Vec<(String, InstanceId)>>,
            ancestors: &mut HashSet<InstanceId>,
        ) -> Option<Instance> {
            let mut instance = nodes.get(&id)?.clone();
            if let Some(edges) = adjacency.get(&id) {
                for (child_name, child_id) in edges {
                    // Guard against a cycle in caller-supplied data; this
                    // component does not enforce acyclicity.
                    if ancestors.contains(child_id) {
                        continue;
                    }
                    ancestors.insert(*child_id);
                    if let Some(child) = attach(*child_id, nodes, adjacency, ancestors) {
                        instance.children.insert(child_name.clone(), child);
                    }
                    ancestors.remove(child_id);
                }
            }
            Some(instance)
        }

        let mut ancestors = HashSet::new();
        ancestors.insert(root_id);
        attach(root_id, &nodes, &adjacency, &mut ancestors)
            .ok_or_else(|| StoreError::InstanceNotFound(root_id.to_string()))
    }

    /// Transactional upsert of the instance row, every owned resource and
    /// link plus their relation rows, and every descendant child instance
    /// recursively, including the parent→child-name relation rows.
    pub async fn save(&self, instance: &Instance) -> Result<(), StoreError> {
        info!(instance_id = %instance.id, "saving instance");
        let mut tx = self.pool.begin().await?;
        save_node(&mut tx, instance).await?;
        tx.commit().await?;
        debug!(instance_id = %instance.id, "instance saved");
        Ok(())
    }

    /// Partial update: only `Some` fields in `info` are written. Zero rows
    /// affected maps to `InstanceNotFound`.
    pub async fn update_status(&self, id: InstanceId, info: InstanceStatusInfo) -> Result<(), StoreError> {
        let mut set_clauses = Vec::new();
        let mut idx = 1;
        macro_rules! push {
            ($name:literal) => {{
                idx += 1;
                set_clauses.push(format!("{} = ${}", $name, idx));
            }};
        }
        if info.status.is_some() {
            push!("status");
        }
        if info.last_status_update_timestamp.is_some() {
            push!("last_status_update_timestamp");
        }
        if info.last_deployed_timestamp.is_some() {
            push!("last_deployed_timestamp");
        }
        if info.last_deploy_attempt_timestamp.is_some() {
            push!("last_deploy_attempt_timestamp");
        }
        if info.durations.is_some() {
            push!("durations");
        }
        if set_clauses.is_empty() {
            // Nothing to write; confirm the instance exists so the
            // no-op call still honors the not-found contract.
            return self.get_by_id(id).await.map(|_| ());
        }

        let sql = format!(
            "UPDATE blueprint_instances SET {} WHERE id = $1",
            set_clauses.join(", ")
        );
        let mut query = sqlx::query(&sql).bind(id.as_uuid());
        if let Some(status) = info.status {
            query = query.bind(i16::from(status));
        }
        if let Some(ts) = info.last_status_update_timestamp {
            query = query.bind(ts);
        }
        if let Some(ts) = info.last_deployed_timestamp {
            query = query.bind(ts);
        }
        if let Some(ts) = info.last_deploy_attempt_timestamp {
            query = query.bind(ts);
        }
        if let Some(d) = info.durations {
            query = query.bind(d);
        }

        let result = query.execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::InstanceNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Fetch the current state, then delete its resources, links, and the
    /// instance row itself (relation rows cascade via FK) in one
    /// transaction; returns the prior state.
    pub async fn remove(&self, id: InstanceId) -> Result<Instance, StoreError> {
        let prior = self.get_by_id(id).await?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM resources WHERE id IN (
                SELECT resource_id FROM blueprint_instance_resources WHERE instance_id = $1
            )",
        )
        .bind(id.as_uuid())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM links WHERE id IN (
                SELECT link_id FROM blueprint_instance_links WHERE instance_id = $1
            )",
        )
        .bind(id.as_uuid())
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM blueprint_instances WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::InstanceNotFound(id.to_string()));
        }

        tx.commit().await?;
        info!(instance_id = %id, "instance removed");
        Ok(prior)
    }
}

#[async_recursion]
async fn save_node(conn: &mut PgConnection, instance: &Instance) -> Result<(), StoreError> {
    let status: i16 = instance.status.into();
    sqlx::query(
        "INSERT INTO blueprint_instances (
            id, name, status, last_status_update_timestamp, last_deployed_timestamp,
            last_deploy_attempt_timestamp, metadata, exports, child_dependencies, durations
         ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
         ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            status = EXCLUDED.status,
            last_status_update_timestamp = EXCLUDED.last_status_update_timestamp,
            last_deployed_timestamp = EXCLUDED.last_deployed_timestamp,
            last_deploy_attempt_timestamp = EXCLUDED.last_deploy_attempt_timestamp,
            metadata = EXCLUDED.metadata,
            exports = EXCLUDED.exports,
            child_dependencies = EXCLUDED.child_dependencies,
            durations = EXCLUDED.durations",
    )
    .bind(instance.id.as_uuid())
    .bind(&instance.name)
    .bind(status)
    .bind(instance.last_status_update_timestamp)
    .bind(instance.last_deployed_timestamp)
    .bind(instance.last_deploy_attempt_timestamp)
    .bind(&instance.metadata)
    .bind(to_json(&instance.exports)?)
    .bind(to_json(&instance.child_dependencies)?)
    .bind(&instance.durations)
    .execute(&mut *conn)
    .await?;

    for resource in instance.resources.values() {
        upsert_resource_row(conn, resource).await?;
        upsert_instance_resource_relation(conn, instance.id, &resource.name, resource.id.as_uuid()).await?;
    }

    for link in instance.links.values() {
        upsert_link_row(conn, link).await?;
        upsert_instance_link_relation(conn, instance.id, &link.name, link.id.as_uuid()).await?;
    }

    for (child_name, child) in instance.children.iter() {
        save_node(conn, child).await?;
        sqlx::query(
            "INSERT INTO blueprint_instance_children (parent_instance_id, child_instance_name, child_instance_id)
             VALUES ($1,$2,$3)
             ON CONFLICT (parent_instance_id, child_instance_name) DO UPDATE SET child_instance_id = EXCLUDED.child_instance_id",
        )
        .bind(instance.id.as_uuid())
        .bind(child_name)
        .bind(child.id.as_uuid())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}
