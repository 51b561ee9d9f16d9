//! The `Changesets` sub-container — an independent three-operation
//! store, FK-checked against the owning instance on insert.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;

use crate::error::StoreError;
use crate::ids::ChangesetId;
use crate::json::{from_json, to_json};
use crate::model::Changeset;

#[derive(Clone)]
pub struct Changesets {
    pool: PgPool,
}

impl Changesets {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: &str) -> Result<Changeset, StoreError> {
        let id = ChangesetId::parse(id).map_err(|_| StoreError::ChangesetNotFound(id.to_string()))?;
        self.get_by_id(id).await
    }

    pub async fn get_by_id(&self, id: ChangesetId) -> Result<Changeset, StoreError> {
        #[derive(sqlx::FromRow)]
        struct Row {
            id: uuid::Uuid,
            instance_id: uuid::Uuid,
            destroy: bool,
            status: String,
            blueprint_location: String,
            changes: crate::model::Tree,
            created: DateTime<Utc>,
        }
        let row: Option<Row> = sqlx::query_as("SELECT * FROM changesets WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        let row = row.ok_or_else(|| StoreError::ChangesetNotFound(id.to_string()))?;
        Ok(Changeset {
            id: ChangesetId::from(row.id),
            instance_id: crate::ids::InstanceId::from(row.instance_id),
            destroy: row.destroy,
            status: row
                .status
                .parse()
                .map_err(|e| StoreError::Internal(format!("changeset {}: {e}", row.id)))?,
            blueprint_location: row.blueprint_location,
            changes: from_json(row.changes)?,
            created: row.created,
        })
    }

    /// Upsert by id, updating `status` and `changes` on conflict. FK
    /// violation against a missing instance is translated to
    /// `InstanceNotFound`.
    pub async fn save(&self, changeset: &Changeset) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO changesets (id, instance_id, destroy, status, blueprint_location, changes, created)
             VALUES ($1,$2,$3,$4,$5,$6,$7)
             ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                changes = EXCLUDED.changes",
        )
        .bind(changeset.id.as_uuid())
        .bind(changeset.instance_id.as_uuid())
        .bind(changeset.destroy)
        .bind(changeset.status.to_string())
        .bind(&changeset.blueprint_location)
        .bind(to_json(&changeset.changes)?)
        .bind(changeset.created)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from_insert_error(e, changeset.instance_id))?;

        info!(changeset_id = %changeset.id, "changeset saved");
        Ok(())
    }

    /// Delete every changeset created strictly before `threshold`. Unconditional success if none match.
    pub async fn cleanup(&self, threshold: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM changesets WHERE created < $1")
            .bind(threshold)
            .execute(&self.pool)
            .await?;
        info!(deleted = result.rows_affected(), "changesets cleaned up");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChangesetStatus;

    fn test_url() -> Option<String> {
        std::env::var("TEST_DATABASE_URL").ok()
    }

    async fn connect() -> (Changesets, crate::instances::Instances) {
        crate::test_support::init_tracing();
        let pool = PgPool::connect(&test_url().unwrap()).await.unwrap();
        (Changesets::new(pool.clone()), crate::instances::Instances::new(pool))
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn save_then_get_round_trips() {
        let (changesets, instances) = connect().await;
        let instance = crate::model::Instance::new(Some("changeset-target".into()));
        instances.save(&instance).await.unwrap();

        let cs = Changeset {
            id: ChangesetId::new(),
            instance_id: instance.id,
            destroy: false,
            status: ChangesetStatus::Pending,
            blueprint_location: "s3://bucket/blueprint.yaml".into(),
            changes: serde_json::json!({"add": ["bucket"]}),
            created: Utc::now(),
        };
        changesets.save(&cs).await.unwrap();
        let fetched = changesets.get_by_id(cs.id).await.unwrap();
        assert_eq!(fetched.status, ChangesetStatus::Pending);
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn cleanup_removes_only_entries_older_than_threshold() {
        let (changesets, instances) = connect().await;
        let instance = crate::model::Instance::new(Some("cleanup-target".into()));
        instances.save(&instance).await.unwrap();

        let threshold = Utc::now();
        let old = Changeset {
            id: ChangesetId::new(),
            instance_id: instance.id,
            destroy: false,
            status: ChangesetStatus::Complete,
            blueprint_location: "loc".into(),
            changes: serde_json::json!({}),
            created: threshold - chrono::Duration::hours(1),
        };
        let recent = Changeset {
            id: ChangesetId::new(),
            ..old.clone()
        };
        let mut recent = recent;
        recent.created = threshold + chrono::Duration::hours(1);

        changesets.save(&old).await.unwrap();
        changesets.save(&recent).await.unwrap();
        changesets.cleanup(threshold).await.unwrap();

        assert!(matches!(changesets.get_by_id(old.id).await, Err(StoreError::ChangesetNotFound(_))));
        assert!(changesets.get_by_id(recent.id).await.is_ok());
    }
}
