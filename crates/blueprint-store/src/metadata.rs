//! The `Metadata` sub-container — same CRUD shape as `Exports`,
//! against the instance's freeform `metadata jsonb` tree instead of its
//! typed export map.

use sqlx::PgPool;

use crate::error::StoreError;
use crate::ids::InstanceId;
use crate::model::Tree;

#[derive(Clone)]
pub struct Metadata {
    pool: PgPool,
}

impl Metadata {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load(&self, instance_id: InstanceId) -> Result<Tree, StoreError> {
        let row: Option<(Tree,)> =
            sqlx::query_as("SELECT metadata FROM blueprint_instances WHERE id = $1")
                .bind(instance_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.ok_or_else(|| StoreError::InstanceNotFound(instance_id.to_string()))?.0)
    }

    pub async fn get_all(&self, instance_id: InstanceId) -> Result<Tree, StoreError> {
        self.load(instance_id).await
    }

    /// A single top-level metadata key. `ExportNotFound`'s metadata sibling
    /// doesn't exist as its own kind, so a
    /// missing key on an existing instance returns an empty tree rather than
    /// an error, matching `ResourceDrift::empty`'s "absent row is not an
    /// error" precedent.
    pub async fn get(&self, instance_id: InstanceId, name: &str) -> Result<Tree, StoreError> {
        let tree = self.load(instance_id).await?;
        Ok(tree.get(name).cloned().unwrap_or(Tree::Null))
    }

    pub async fn save_all(&self, instance_id: InstanceId, metadata: Tree) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE blueprint_instances SET metadata = $2 WHERE id = $1")
            .bind(instance_id.as_uuid())
            .bind(&metadata)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::InstanceNotFound(instance_id.to_string()));
        }
        Ok(())
    }

    pub async fn save(&self, instance_id: InstanceId, name: &str, value: Tree) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE blueprint_instances SET metadata = jsonb_set(metadata, $2, $3, true) WHERE id = $1",
        )
        .bind(instance_id.as_uuid())
        .bind(vec![name.to_string()])
        .bind(&value)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::InstanceNotFound(instance_id.to_string()));
        }
        Ok(())
    }

    pub async fn remove_all(&self, instance_id: InstanceId) -> Result<(), StoreError> {
        self.save_all(instance_id, Tree::Object(Default::default())).await
    }

    pub async fn remove(&self, instance_id: InstanceId, name: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE blueprint_instances SET metadata = metadata - $2 WHERE id = $1",
        )
        .bind(instance_id.as_uuid())
        .bind(name)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::InstanceNotFound(instance_id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_url() -> Option<String> {
        std::env::var("TEST_DATABASE_URL").ok()
    }

    async fn connect() -> (Metadata, crate::instances::Instances) {
        crate::test_support::init_tracing();
        let pool = PgPool::connect(&test_url().unwrap()).await.unwrap();
        (Metadata::new(pool.clone()), crate::instances::Instances::new(pool))
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn save_then_get_then_remove_key() {
        let (metadata, instances) = connect().await;
        let instance = crate::model::Instance::new(Some("metadata-target".into()));
        instances.save(&instance).await.unwrap();

        metadata.save(instance.id, "team", serde_json::json!("platform")).await.unwrap();
        let value = metadata.get(instance.id, "team").await.unwrap();
        assert_eq!(value, serde_json::json!("platform"));

        metadata.remove(instance.id, "team").await.unwrap();
        let value = metadata.get(instance.id, "team").await.unwrap();
        assert_eq!(value, Tree::Null);
    }
}
