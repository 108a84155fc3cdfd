//! Patient subscriber entity.

use clinica_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `patient_subscribers` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PatientSubscriber {
    pub id: DbId,
    pub tenant_id: DbId,
    pub email: String,
    pub display_name: String,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a subscriber.
#[derive(Debug, Deserialize)]
pub struct CreateSubscriber {
    pub tenant_id: DbId,
    pub email: String,
    pub display_name: String,
}
