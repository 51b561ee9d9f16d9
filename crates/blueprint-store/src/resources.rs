//! The `Resources` sub-container, including drift tracking.

use chrono::Utc;
use sqlx::PgPool;
use tracing::info;

use crate::error::StoreError;
use crate::ids::{InstanceId, ResourceId};
use crate::json::to_json;
use crate::model::{DeploymentStatus, PreciseStatus, Resource, ResourceDrift, ResourceStatusInfo};
use crate::sql::{upsert_instance_resource_relation, upsert_resource_row};

#[derive(Clone)]
pub struct Resources {
    pool: PgPool,
}

impl Resources {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch a resource by id. A malformed id is folded into
    /// not-found, same as every other lookup in this crate.
    pub async fn get(&self, id: &str) -> Result<Resource, StoreError> {
        let id = ResourceId::parse(id).map_err(|_| StoreError::ResourceNotFound(id.to_string()))?;
        self.get_by_id(id).await
    }

    pub async fn get_by_id(&self, id: ResourceId) -> Result<Resource, StoreError> {
        let row: Option<crate::model::Tree> =
            sqlx::query_scalar("SELECT resource FROM resources_json WHERE (resource->>'id')::uuid = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        let resource = row.ok_or_else(|| StoreError::ResourceNotFound(id.to_string()))?;
        crate::json::from_json(resource)
    }

    /// Fetch a resource by its logical name within an instance.
    pub async fn get_by_name(&self, instance_id: InstanceId, name: &str) -> Result<Resource, StoreError> {
        let row: Option<crate::model::Tree> =
            sqlx::query_scalar("SELECT resource FROM resources_json WHERE instance_id = $1 AND resource_name = $2")
                .bind(instance_id.as_uuid())
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        let resource = row.ok_or_else(|| {
            StoreError::ResourceNotFound(StoreError::composite_id(instance_id, "resource", name))
        })?;
        crate::json::from_json(resource)
    }

    /// Upsert the resource row and its `(instance, name)` relation row in one
    /// transaction. A foreign-key violation against a missing
    /// instance is translated to `InstanceNotFound`.
    pub async fn save(&self, instance_id: InstanceId, resource: &Resource) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        upsert_resource_row(&mut tx, resource)
            .await
            .map_err(|e| match e {
                StoreError::Database(db) => StoreError::from_insert_error(db, instance_id),
                other => other,
            })?;
        upsert_instance_resource_relation(&mut tx, instance_id, &resource.name, resource.id.as_uuid())
            .await
            .map_err(|e| StoreError::from_insert_error(e, instance_id))?;
        tx.commit().await?;
        info!(resource_id = %resource.id, instance_id = %instance_id, "resource saved");
        Ok(())
    }

    /// Partial update, mirroring `Instances::update_status`.
    pub async fn update_status(&self, id: ResourceId, info: ResourceStatusInfo) -> Result<(), StoreError> {
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

        let sql = format!("UPDATE resources SET {} WHERE id = $1", set_clauses.join(", "));
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
            return Err(StoreError::ResourceNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Delete the resource row (the relation and any drift row cascade via
    /// FK) and return its prior state.
    pub async fn remove(&self, id: ResourceId) -> Result<Resource, StoreError> {
        let prior = self.get_by_id(id).await?;
        let result = sqlx::query("DELETE FROM resources WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ResourceNotFound(id.to_string()));
        }
        info!(resource_id = %id, "resource removed");
        Ok(prior)
    }

    /// The resource's drift record, or an empty one if an existing resource
    /// has no drift row. `ResourceNotFound` if the resource itself doesn't
    /// exist — a `LEFT JOIN` against `resources` distinguishes that case
    /// from "resource exists, no drift row" in one round trip.
    pub async fn get_drift(&self, id: ResourceId) -> Result<ResourceDrift, StoreError> {
        #[allow(clippy::type_complexity)]
        let row: Option<(
            Option<crate::model::Tree>,
            Option<crate::model::Tree>,
            Option<chrono::DateTime<Utc>>,
        )> = sqlx::query_as(
            "SELECT d.drifted_spec_data, d.difference, d.timestamp
             FROM resources r
             LEFT JOIN resource_drift d ON d.resource_id = r.id
             WHERE r.id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or_else(|| StoreError::ResourceNotFound(id.to_string()))?;
        Ok(match row {
            (Some(drifted_spec_data), Some(difference), Some(timestamp)) => ResourceDrift {
                resource_id: id,
                drifted_spec_data,
                difference,
                timestamp,
            },
            _ => ResourceDrift::empty(id, Utc::now()),
        })
    }

    /// Upsert the drift row and set the owning resource's `drifted` flag to
    /// `true` in one transaction.
    pub async fn save_drift(&self, drift: &ResourceDrift) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO resource_drift (resource_id, drifted_spec_data, difference, timestamp)
             VALUES ($1,$2,$3,$4)
             ON CONFLICT (resource_id) DO UPDATE SET
                drifted_spec_data = EXCLUDED.drifted_spec_data,
                difference = EXCLUDED.difference,
                timestamp = EXCLUDED.timestamp",
        )
        .bind(drift.resource_id.as_uuid())
        .bind(&drift.drifted_spec_data)
        .bind(&drift.difference)
        .bind(drift.timestamp)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::from_insert_error(e, drift.resource_id))?;

        let result = sqlx::query("UPDATE resources SET drifted = TRUE, last_drift_detected_timestamp = $2 WHERE id = $1")
            .bind(drift.resource_id.as_uuid())
            .bind(drift.timestamp)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ResourceNotFound(drift.resource_id.to_string()));
        }
        tx.commit().await?;
        Ok(())
    }

    /// Delete the drift row and reset the owning resource's `drifted` flag
    /// to `false` in one transaction.
    pub async fn remove_drift(&self, id: ResourceId) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM resource_drift WHERE resource_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("UPDATE resources SET drifted = FALSE, last_drift_detected_timestamp = NULL WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ResourceNotFound(id.to_string()));
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FailureReason, ResourceMetadata};

    fn test_url() -> Option<String> {
        std::env::var("TEST_DATABASE_URL").ok()
    }

    async fn connect() -> Resources {
        crate::test_support::init_tracing();
        Resources::new(PgPool::connect(&test_url().unwrap()).await.unwrap())
    }

    fn resource(instance_id: InstanceId, name: &str) -> Resource {
        Resource {
            id: ResourceId::new(),
            instance_id,
            name: name.to_string(),
            resource_type: "aws::s3::bucket".into(),
            template_name: None,
            template_index: None,
            status: DeploymentStatus::Preparing,
            precise_status: PreciseStatus::Pending,
            last_status_update_timestamp: None,
            last_deployed_timestamp: None,
            last_deploy_attempt_timestamp: None,
            spec_data: serde_json::json!({}),
            description: None,
            metadata: ResourceMetadata::default(),
            depends_on_resources: vec![],
            depends_on_children: vec![],
            failure_reasons: vec![],
            drifted: false,
            last_drift_detected_timestamp: None,
            durations: serde_json::json!({}),
        }
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn drift_round_trip_sets_and_clears_flag() {
        let resources = connect().await;
        let instance_id = InstanceId::new();
        let r = resource(instance_id, "bucket");
        resources.save(instance_id, &r).await.unwrap();

        let drift = ResourceDrift {
            resource_id: r.id,
            drifted_spec_data: serde_json::json!({"acl": "private"}),
            difference: serde_json::json!({"acl": {"before": "public", "after": "private"}}),
            timestamp: Utc::now(),
        };
        resources.save_drift(&drift).await.unwrap();
        let fetched = resources.get_by_id(r.id).await.unwrap();
        assert!(fetched.drifted);

        resources.remove_drift(r.id).await.unwrap();
        let fetched = resources.get_by_id(r.id).await.unwrap();
        assert!(!fetched.drifted);
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn get_drift_on_existing_resource_without_drift_is_empty() {
        let resources = connect().await;
        let instance_id = InstanceId::new();
        let r = resource(instance_id, "bucket-no-drift");
        resources.save(instance_id, &r).await.unwrap();

        let drift = resources.get_drift(r.id).await.unwrap();
        assert_eq!(drift.resource_id, r.id);
        assert_eq!(drift.drifted_spec_data, serde_json::Value::Null);
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn get_drift_on_missing_resource_is_resource_not_found() {
        let resources = connect().await;
        let err = resources.get_drift(ResourceId::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::ResourceNotFound(_)));
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn save_against_missing_instance_is_instance_not_found() {
        let resources = connect().await;
        let r = resource(InstanceId::new(), "orphan");
        let err = resources.save(r.instance_id, &r).await.unwrap_err();
        assert!(matches!(err, StoreError::InstanceNotFound(_)));
    }

    #[test]
    fn failure_reason_round_trips_through_json() {
        let reasons = vec![FailureReason {
            message: "timeout".into(),
            timestamp: Utc::now(),
        }];
        let value = to_json(&reasons).unwrap();
        let back: Vec<FailureReason> = crate::json::from_json(value).unwrap();
        assert_eq!(back, reasons);
    }
}
