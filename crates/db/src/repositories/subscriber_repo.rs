//! Repository for the `patient_subscribers` table.

use clinica_core::types::DbId;
use sqlx::PgPool;

use crate::models::subscriber::{CreateSubscriber, PatientSubscriber};

/// Column list for `patient_subscribers` queries.
const COLUMNS: &str = "id, tenant_id, email, display_name, is_active, created_at, updated_at";

/// Provides CRUD operations for patient subscribers.
pub struct SubscriberRepo;

impl SubscriberRepo {
    pub async fn create(
        pool: &PgPool,
        input: &CreateSubscriber,
    ) -> Result<PatientSubscriber, sqlx::Error> {
        let query = format!(
            "INSERT INTO patient_subscribers (tenant_id, email, display_name) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PatientSubscriber>(&query)
            .bind(input.tenant_id)
            .bind(&input.email)
            .bind(&input.display_name)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<PatientSubscriber>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM patient_subscribers WHERE id = $1");
        sqlx::query_as::<_, PatientSubscriber>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Active subscribers of a tenant, by id.
    pub async fn list_active_subscribers(
        pool: &PgPool,
        tenant_id: DbId,
    ) -> Result<Vec<PatientSubscriber>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM patient_subscribers \
             WHERE tenant_id = $1 AND is_active = true \
             ORDER BY id"
        );
        sqlx::query_as::<_, PatientSubscriber>(&query)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }

    /// Activate or deactivate a subscriber. Returns `false` if not found.
    pub async fn set_active(pool: &PgPool, id: DbId, is_active: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE patient_subscribers SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(is_active)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
