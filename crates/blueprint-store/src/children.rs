//! The `Children` sub-container — the parent↔child-name relation
//! between blueprint instances.

use sqlx::PgPool;
use tracing::info;

use crate::error::StoreError;
use crate::ids::InstanceId;
use crate::instances::Instances;
use crate::json::to_json;
use crate::model::{Instance, Tree};

#[derive(Clone)]
pub struct Children {
    pool: PgPool,
    instances: Instances,
}

impl Children {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self {
            instances: Instances::new(pool.clone()),
            pool,
        }
    }

    /// The named child, reconstructed as a full tree.
    pub async fn get(&self, parent_id: InstanceId, child_name: &str) -> Result<Instance, StoreError> {
        let child_id: Option<(uuid::Uuid,)> = sqlx::query_as(
            "SELECT child_instance_id FROM blueprint_instance_children
             WHERE parent_instance_id = $1 AND child_instance_name = $2",
        )
        .bind(parent_id.as_uuid())
        .bind(child_name)
        .fetch_optional(&self.pool)
        .await?;

        let (child_id,) = child_id.ok_or_else(|| {
            StoreError::InstanceNotFound(StoreError::composite_id(parent_id, "child", child_name))
        })?;

        self.instances.get_by_id(InstanceId::from(child_id)).await
    }

    /// Verify both instances exist, then upsert the `(parent, child_name) →
    /// child_id` relation. Re-attaching under the same name updates the id.
    pub async fn attach(
        &self,
        parent_id: InstanceId,
        child_id: InstanceId,
        child_name: &str,
    ) -> Result<(), StoreError> {
        self.instances.get_by_id(parent_id).await?;
        self.instances.get_by_id(child_id).await?;

        sqlx::query(
            "INSERT INTO blueprint_instance_children (parent_instance_id, child_instance_name, child_instance_id)
             VALUES ($1,$2,$3)
             ON CONFLICT (parent_instance_id, child_instance_name) DO UPDATE SET child_instance_id = EXCLUDED.child_instance_id",
        )
        .bind(parent_id.as_uuid())
        .bind(child_name)
        .bind(child_id.as_uuid())
        .execute(&self.pool)
        .await?;

        info!(parent_id = %parent_id, child_id = %child_id, child_name, "child attached");
        Ok(())
    }

    /// Delete the relation row. Zero rows affected maps to `InstanceNotFound`
    /// against the composite item id `instance:<parent>:child:<name>`.
    pub async fn detach(&self, parent_id: InstanceId, child_name: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "DELETE FROM blueprint_instance_children
             WHERE parent_instance_id = $1 AND child_instance_name = $2",
        )
        .bind(parent_id.as_uuid())
        .bind(child_name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::InstanceNotFound(StoreError::composite_id(
                parent_id, "child", child_name,
            )));
        }
        info!(parent_id = %parent_id, child_name, "child detached");
        Ok(())
    }

    /// Write a dependency record into the parent's `child_dependencies` map
    /// under `childName`, after checking the parent exists.
    pub async fn save_dependencies(
        &self,
        parent_id: InstanceId,
        child_name: &str,
        deps: Tree,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE blueprint_instances
             SET child_dependencies = jsonb_set(child_dependencies, $2, $3, true)
             WHERE id = $1",
        )
        .bind(parent_id.as_uuid())
        .bind(vec![child_name.to_string()])
        .bind(to_json(&deps)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::InstanceNotFound(parent_id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Instance;

    fn test_url() -> Option<String> {
        std::env::var("TEST_DATABASE_URL").ok()
    }

    async fn connect() -> (Children, Instances) {
        crate::test_support::init_tracing();
        let pool = PgPool::connect(&test_url().unwrap()).await.unwrap();
        (Children::new(pool.clone()), Instances::new(pool))
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn attach_then_detach_then_get_is_not_found() {
        let (children, instances) = connect().await;
        let parent = Instance::new(Some("parent".into()));
        let child = Instance::new(Some("networking".into()));
        instances.save(&parent).await.unwrap();
        instances.save(&child).await.unwrap();

        children.attach(parent.id, child.id, "networking").await.unwrap();
        let fetched = children.get(parent.id, "networking").await.unwrap();
        assert_eq!(fetched.id, child.id);

        children.detach(parent.id, "networking").await.unwrap();
        let err = children.get(parent.id, "networking").await.unwrap_err();
        assert!(matches!(err, StoreError::InstanceNotFound(item) if item == format!("instance:{}:child:networking", parent.id)));
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn attach_against_missing_child_is_instance_not_found() {
        let (children, instances) = connect().await;
        let parent = Instance::new(Some("parent-only".into()));
        instances.save(&parent).await.unwrap();

        let err = children.attach(parent.id, InstanceId::new(), "ghost").await.unwrap_err();
        assert!(matches!(err, StoreError::InstanceNotFound(_)));
    }
}
