//! Read access to the append-only `notification_logs` table.
//!
//! Rows are written by `PendingNotificationRepo` as part of terminal
//! transitions; nothing in the engine updates or deletes them.

use clinica_core::types::DbId;
use sqlx::PgPool;

use crate::models::delivery_log::NotificationLog;

/// Column list for `notification_logs` queries.
const COLUMNS: &str = "\
    id, pending_notification_id, notification_rule_id, recipient_id, sent_at, \
    status, channel_used, error_message";

/// Provides queries over the delivery audit log.
pub struct DeliveryLogRepo;

impl DeliveryLogRepo {
    pub async fn list_for_pending(
        pool: &PgPool,
        pending_notification_id: DbId,
    ) -> Result<Vec<NotificationLog>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_logs \
             WHERE pending_notification_id = $1 \
             ORDER BY id"
        );
        sqlx::query_as::<_, NotificationLog>(&query)
            .bind(pending_notification_id)
            .fetch_all(pool)
            .await
    }

    /// Most recent log rows for a recipient, newest first.
    pub async fn list_for_recipient(
        pool: &PgPool,
        recipient_id: DbId,
        limit: i64,
    ) -> Result<Vec<NotificationLog>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_logs \
             WHERE recipient_id = $1 \
             ORDER BY sent_at DESC, id DESC \
             LIMIT $2"
        );
        sqlx::query_as::<_, NotificationLog>(&query)
            .bind(recipient_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
