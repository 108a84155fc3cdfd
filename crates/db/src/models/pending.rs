//! Queued notification models.

use chrono::NaiveDate;
use clinica_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::{PendingNotificationStatus, StatusId};

/// A row from the `pending_notifications` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PendingNotification {
    pub id: DbId,
    pub notification_rule_id: DbId,
    pub recipient_id: DbId,
    pub subject: String,
    pub body: String,
    pub scheduled_for: Timestamp,
    pub scheduled_date: NaiveDate,
    pub channel: String,
    pub status_id: StatusId,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub claimed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl PendingNotification {
    pub fn status(&self) -> Option<PendingNotificationStatus> {
        PendingNotificationStatus::from_id(self.status_id)
    }
}

/// A rendered notification ready to be queued.
#[derive(Debug, Clone)]
pub struct NewPendingNotification {
    pub notification_rule_id: DbId,
    pub recipient_id: DbId,
    pub subject: String,
    pub body: String,
    pub scheduled_for: Timestamp,
    /// Deployment-local date of the enqueue; part of the idempotency key.
    pub scheduled_date: NaiveDate,
    pub channel: String,
}
