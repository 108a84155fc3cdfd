//! Repository for the `tenants` table.

use clinica_core::types::DbId;
use sqlx::PgPool;

use crate::models::tenant::{CreateTenant, Tenant};

/// Column list for `tenants` queries.
const COLUMNS: &str = "id, name, is_active, cycle_predictor_enabled, created_at, updated_at";

/// Provides CRUD operations for tenants.
pub struct TenantRepo;

impl TenantRepo {
    pub async fn create(pool: &PgPool, input: &CreateTenant) -> Result<Tenant, sqlx::Error> {
        let query = format!(
            "INSERT INTO tenants (name, cycle_predictor_enabled) \
             VALUES ($1, $2) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Tenant>(&query)
            .bind(&input.name)
            .bind(input.cycle_predictor_enabled.unwrap_or(false))
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Tenant>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tenants WHERE id = $1");
        sqlx::query_as::<_, Tenant>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Active tenants with the cycle-predictor module enabled, by id.
    ///
    /// These are the only tenants the evaluator visits.
    pub async fn list_active(pool: &PgPool) -> Result<Vec<Tenant>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tenants \
             WHERE is_active = true AND cycle_predictor_enabled = true \
             ORDER BY id"
        );
        sqlx::query_as::<_, Tenant>(&query).fetch_all(pool).await
    }

    /// Turn the cycle-predictor module on or off.
    ///
    /// Returns `false` if the tenant does not exist.
    pub async fn set_cycle_predictor(
        pool: &PgPool,
        id: DbId,
        enabled: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE tenants SET cycle_predictor_enabled = $2 WHERE id = $1")
            .bind(id)
            .bind(enabled)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
