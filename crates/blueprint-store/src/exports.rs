//! The `Exports` sub-container — CRUD against the `exports jsonb`
//! column on the instance row.

use std::collections::HashMap;

use sqlx::PgPool;

use crate::error::StoreError;
use crate::ids::InstanceId;
use crate::json::{from_json, to_json};
use crate::model::Export;

#[derive(Clone)]
pub struct Exports {
    pool: PgPool,
}

impl Exports {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load(&self, instance_id: InstanceId) -> Result<HashMap<String, Export>, StoreError> {
        let row: Option<(crate::model::Tree,)> =
            sqlx::query_as("SELECT exports FROM blueprint_instances WHERE id = $1")
                .bind(instance_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        let exports = row.ok_or_else(|| StoreError::InstanceNotFound(instance_id.to_string()))?.0;
        from_json(exports)
    }

    /// All exports on the instance.
    pub async fn get_all(&self, instance_id: InstanceId) -> Result<HashMap<String, Export>, StoreError> {
        self.load(instance_id).await
    }

    /// A single export by name. `ExportNotFound` if the instance exists but
    /// has no such key; `InstanceNotFound` if the instance itself is missing.
    pub async fn get(&self, instance_id: InstanceId, name: &str) -> Result<Export, StoreError> {
        let exports = self.load(instance_id).await?;
        exports.get(name).cloned().ok_or_else(|| {
            StoreError::ExportNotFound(StoreError::composite_id(instance_id, "export", name))
        })
    }

    /// Replace the entire export map.
    pub async fn save_all(
        &self,
        instance_id: InstanceId,
        exports: HashMap<String, Export>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE blueprint_instances SET exports = $2 WHERE id = $1")
            .bind(instance_id.as_uuid())
            .bind(to_json(&exports)?)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::InstanceNotFound(instance_id.to_string()));
        }
        Ok(())
    }

    /// Merge a single named export into the map.
    pub async fn save(&self, instance_id: InstanceId, name: &str, export: Export) -> Result<(), StoreError> {
        let mut exports = self.load(instance_id).await?;
        exports.insert(name.to_string(), export);
        self.save_all(instance_id, exports).await
    }

    /// Reset the export map to empty.
    pub async fn remove_all(&self, instance_id: InstanceId) -> Result<(), StoreError> {
        self.save_all(instance_id, HashMap::new()).await
    }

    /// Remove a single named export; a no-op if it was already absent.
    pub async fn remove(&self, instance_id: InstanceId, name: &str) -> Result<(), StoreError> {
        let mut exports = self.load(instance_id).await?;
        exports.remove(name);
        self.save_all(instance_id, exports).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_url() -> Option<String> {
        std::env::var("TEST_DATABASE_URL").ok()
    }

    async fn connect() -> (Exports, crate::instances::Instances) {
        crate::test_support::init_tracing();
        let pool = PgPool::connect(&test_url().unwrap()).await.unwrap();
        (Exports::new(pool.clone()), crate::instances::Instances::new(pool))
    }

    fn export(value: &str) -> Export {
        Export {
            value: serde_json::json!(value),
            export_type: "string".into(),
            field: "spec.bucketName".into(),
            description: None,
        }
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn save_then_get_then_remove() {
        let (exports, instances) = connect().await;
        let instance = crate::model::Instance::new(Some("exports-target".into()));
        instances.save(&instance).await.unwrap();

        exports.save(instance.id, "bucketName", export("my-bucket")).await.unwrap();
        let fetched = exports.get(instance.id, "bucketName").await.unwrap();
        assert_eq!(fetched.value, serde_json::json!("my-bucket"));

        exports.remove(instance.id, "bucketName").await.unwrap();
        let err = exports.get(instance.id, "bucketName").await.unwrap_err();
        assert!(matches!(err, StoreError::ExportNotFound(_)));
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn get_on_missing_instance_is_instance_not_found() {
        let (exports, _instances) = connect().await;
        let err = exports.get(InstanceId::new(), "anything").await.unwrap_err();
        assert!(matches!(err, StoreError::InstanceNotFound(_)));
    }
}
