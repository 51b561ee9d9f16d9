//! The `Links` sub-container — identical shape to `Resources` minus
//! drift tracking, which only applies to resources.

use sqlx::PgPool;
use tracing::info;

use crate::error::StoreError;
use crate::ids::{InstanceId, LinkId};
use crate::json::to_json;
use crate::model::{Link, LinkStatusInfo};
use crate::sql::{upsert_instance_link_relation, upsert_link_row};

#[derive(Clone)]
pub struct Links {
    pool: PgPool,
}

impl Links {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: &str) -> Result<Link, StoreError> {
        let id = LinkId::parse(id).map_err(|_| StoreError::LinkNotFound(id.to_string()))?;
        self.get_by_id(id).await
    }

    pub async fn get_by_id(&self, id: LinkId) -> Result<Link, StoreError> {
        let row: Option<crate::model::Tree> =
            sqlx::query_scalar("SELECT link FROM links_json WHERE (link->>'id')::uuid = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        let link = row.ok_or_else(|| StoreError::LinkNotFound(id.to_string()))?;
        crate::json::from_json(link)
    }

    /// Fetch a link by its `"A::B"` name within an instance.
    pub async fn get_by_name(&self, instance_id: InstanceId, name: &str) -> Result<Link, StoreError> {
        let row: Option<crate::model::Tree> =
            sqlx::query_scalar("SELECT link FROM links_json WHERE instance_id = $1 AND link_name = $2")
                .bind(instance_id.as_uuid())
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        let link = row.ok_or_else(|| {
            StoreError::LinkNotFound(StoreError::composite_id(instance_id, "link", name))
        })?;
        crate::json::from_json(link)
    }

    /// Upsert the link row and its `(instance, name)` relation row in one
    /// transaction; an FK violation against a missing instance is
    /// translated to `InstanceNotFound`.
    pub async fn save(&self, instance_id: InstanceId, link: &Link) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        upsert_link_row(&mut tx, link).await.map_err(|e| match e {
            StoreError::Database(db) => StoreError::from_insert_error(db, instance_id),
            other => other,
        })?;
        upsert_instance_link_relation(&mut tx, instance_id, &link.name, link.id.as_uuid())
            .await
            .map_err(|e| StoreError::from_insert_error(e, instance_id))?;
        tx.commit().await?;
        info!(link_id = %link.id, instance_id = %instance_id, "link saved");
        Ok(())
    }

    pub async fn update_status(&self, id: LinkId, info: LinkStatusInfo) -> Result<(), StoreError> {
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
        if info.precise_status.is_some() {
            push!("precise_status");
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
        if info.failure_reasons.is_some() {
            push!("failure_reasons");
        }
        if info.durations.is_some() {
            push!("durations");
        }
        if set_clauses.is_empty() {
            return self.get_by_id(id).await.map(|_| ());
        }

        let sql = format!("UPDATE links SET {} WHERE id = $1", set_clauses.join(", "));
        let mut query = sqlx::query(&sql).bind(id.as_uuid());
        if let Some(status) = info.status {
            query = query.bind(i16::from(status));
        }
        if let Some(precise) = info.precise_status {
            query = query.bind(i16::from(precise));
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
        if let Some(reasons) = info.failure_reasons {
            query = query.bind(to_json(&reasons)?);
        }
        if let Some(d) = info.durations {
            query = query.bind(d);
        }

        let result = query.execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::LinkNotFound(id.to_string()));
        }
        Ok(())
    }

    pub async fn remove(&self, id: LinkId) -> Result<Link, StoreError> {
        let prior = self.get_by_id(id).await?;
        let result = sqlx::query("DELETE FROM links WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::LinkNotFound(id.to_string()));
        }
        info!(link_id = %id, "link removed");
        Ok(prior)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DeploymentStatus, PreciseStatus};

    fn test_url() -> Option<String> {
        std::env::var("TEST_DATABASE_URL").ok()
    }

    async fn connect() -> Links {
        crate::test_support::init_tracing();
        Links::new(PgPool::connect(&test_url().unwrap()).await.unwrap())
    }

    fn link(instance_id: InstanceId, name: &str) -> Link {
        Link {
            id: LinkId::new(),
            instance_id,
            name: name.to_string(),
            status: DeploymentStatus::Preparing,
            precise_status: PreciseStatus::Pending,
            last_status_update_timestamp: None,
            last_deployed_timestamp: None,
            last_deploy_attempt_timestamp: None,
            intermediary_resources: vec![],
            data: serde_json::json!({}),
            failure_reasons: vec![],
            durations: serde_json::json!({}),
        }
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn save_then_get_by_name_round_trips() {
        let links = connect().await;
        let instance_id = InstanceId::new();
        let l = link(instance_id, "A::B");
        links.save(instance_id, &l).await.unwrap();

        let fetched = links.get_by_name(instance_id, "A::B").await.unwrap();
        assert_eq!(fetched.id, l.id);
        assert_eq!(fetched.resource_names(), Some(("A", "B")));
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn remove_returns_prior_state_then_not_found() {
        let links = connect().await;
        let instance_id = InstanceId::new();
        let l = link(instance_id, "A::B");
        links.save(instance_id, &l).await.unwrap();

        let removed = links.remove(l.id).await.unwrap();
        assert_eq!(removed.id, l.id);
        assert!(matches!(links.get_by_id(l.id).await, Err(StoreError::LinkNotFound(_))));
    }
}
