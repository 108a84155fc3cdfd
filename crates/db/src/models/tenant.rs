//! Tenant (clinic) entity.

use clinica_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `tenants` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Tenant {
    pub id: DbId,
    pub name: String,
    pub is_active: bool,
    pub cycle_predictor_enabled: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a tenant.
#[derive(Debug, Deserialize)]
pub struct CreateTenant {
    pub name: String,
    pub cycle_predictor_enabled: Option<bool>,
}
