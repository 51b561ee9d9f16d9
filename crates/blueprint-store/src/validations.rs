//! The `Validations` sub-container — independent of instances
//! entirely; no FK to check on insert.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;

use crate::error::StoreError;
use crate::ids::ValidationId;
use crate::model::Validation;

#[derive(Clone)]
pub struct Validations {
    pool: PgPool,
}

impl Validations {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: &str) -> Result<Validation, StoreError> {
        let id = ValidationId::parse(id).map_err(|_| StoreError::ValidationNotFound(id.to_string()))?;
        self.get_by_id(id).await
    }

    pub async fn get_by_id(&self, id: ValidationId) -> Result<Validation, StoreError> {
        #[derive(sqlx::FromRow)]
        struct Row {
            id: uuid::Uuid,
            blueprint_location: String,
            status: String,
            created: DateTime<Utc>,
        }
        let row: Option<Row> = sqlx::query_as("SELECT * FROM blueprint_validations WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        let row = row.ok_or_else(|| StoreError::ValidationNotFound(id.to_string()))?;
        Ok(Validation {
            id: ValidationId::from(row.id),
            blueprint_location: row.blueprint_location,
            status: row
                .status
                .parse()
                .map_err(|e| StoreError::Internal(format!("validation {}: {e}", row.id)))?,
            created: row.created,
        })
    }

    /// Upsert by id, updating `status` on conflict.
    pub async fn save(&self, validation: &Validation) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO blueprint_validations (id, blueprint_location, status, created)
             VALUES ($1,$2,$3,$4)
             ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status",
        )
        .bind(validation.id.as_uuid())
        .bind(&validation.blueprint_location)
        .bind(validation.status.to_string())
        .bind(validation.created)
        .execute(&self.pool)
        .await?;

        info!(validation_id = %validation.id, "validation saved");
        Ok(())
    }

    /// Delete every validation request created strictly before `threshold`.
    /// Unconditional success if none match.
    pub async fn cleanup(&self, threshold: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM blueprint_validations WHERE created < $1")
            .bind(threshold)
            .execute(&self.pool)
            .await?;
        info!(deleted = result.rows_affected(), "validations cleaned up");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ValidationStatus;

    fn test_url() -> Option<String> {
        std::env::var("TEST_DATABASE_URL").ok()
    }

    async fn connect() -> Validations {
        crate::test_support::init_tracing();
        Validations::new(PgPool::connect(&test_url().unwrap()).await.unwrap())
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn save_then_get_round_trips() {
        let validations = connect().await;
        let v = Validation {
            id: ValidationId::new(),
            blueprint_location: "s3://bucket/blueprint.yaml".into(),
            status: ValidationStatus::Pending,
            created: Utc::now(),
        };
        validations.save(&v).await.unwrap();
        let fetched = validations.get_by_id(v.id).await.unwrap();
        assert_eq!(fetched.status, ValidationStatus::Pending);

        let mut updated = v.clone();
        updated.status = ValidationStatus::Valid;
        validations.save(&updated).await.unwrap();
        let fetched = validations.get_by_id(v.id).await.unwrap();
        assert_eq!(fetched.status, ValidationStatus::Valid);
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn missing_validation_is_not_found() {
        let validations = connect().await;
        let err = validations.get_by_id(ValidationId::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::ValidationNotFound(_)));
    }
}
