//! Append-only delivery audit rows.

use clinica_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// `notification_logs.status` for a delivered notification.
pub const LOG_STATUS_SENT: &str = "sent";

/// `notification_logs.status` for a dead-lettered notification.
pub const LOG_STATUS_FAILED: &str = "failed";

/// A row from the `notification_logs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct NotificationLog {
    pub id: DbId,
    pub pending_notification_id: Option<DbId>,
    pub notification_rule_id: Option<DbId>,
    pub recipient_id: DbId,
    pub sent_at: Timestamp,
    pub status: String,
    pub channel_used: Option<String>,
    pub error_message: Option<String>,
}
