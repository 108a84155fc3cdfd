//! Repository for the `pending_notifications` queue.
//!
//! Uses `PendingNotificationStatus` from `models::status` for every
//! transition. Terminal transitions (`sent`, `dead`) write the delivery log
//! row in the same transaction and only apply to rows still in `sending`,
//! so a worker that lost its claim cannot finish a row twice.

use clinica_core::types::{DbId, Timestamp};
use sqlx::{PgExecutor, PgPool};

use crate::models::delivery_log::{LOG_STATUS_FAILED, LOG_STATUS_SENT};
use crate::models::pending::{NewPendingNotification, PendingNotification};
use crate::models::status::PendingNotificationStatus;

/// Column list for `pending_notifications` queries.
const COLUMNS: &str = "\
    id, notification_rule_id, recipient_id, subject, body, \
    scheduled_for, scheduled_date, channel, status_id, retry_count, last_error, \
    claimed_at, created_at, updated_at";

/// Provides queue operations for pending notifications.
pub struct PendingNotificationRepo;

impl PendingNotificationRepo {
    // -----------------------------------------------------------------------
    // Producer side
    // -----------------------------------------------------------------------

    /// Queue a rendered notification.
    ///
    /// Returns `None` when a live row for the same rule, recipient and
    /// scheduled date already exists. Accepts a pool or an open transaction
    /// so cursor updates can share the enqueue's transaction.
    pub async fn enqueue<'e>(
        executor: impl PgExecutor<'e>,
        input: &NewPendingNotification,
    ) -> Result<Option<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO pending_notifications \
                 (notification_rule_id, recipient_id, subject, body, \
                  scheduled_for, scheduled_date, channel, status_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (notification_rule_id, recipient_id, scheduled_date) \
                 WHERE status_id IN (1, 2, 3) \
             DO NOTHING \
             RETURNING id",
        )
        .bind(input.notification_rule_id)
        .bind(input.recipient_id)
        .bind(&input.subject)
        .bind(&input.body)
        .bind(input.scheduled_for)
        .bind(input.scheduled_date)
        .bind(&input.channel)
        .bind(PendingNotificationStatus::Pending.id())
        .fetch_optional(executor)
        .await
    }

    /// Whether a rule already reached a recipient at or after the instant
    /// `since`.
    ///
    /// Counts any non-dead queue row and any successful delivery log. The
    /// comparison is on timestamps, so the database session time zone plays
    /// no part.
    pub async fn exists_since(
        pool: &PgPool,
        rule_id: DbId,
        recipient_id: DbId,
        since: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS ( \
                 SELECT 1 FROM pending_notifications \
                 WHERE notification_rule_id = $1 AND recipient_id = $2 \
                   AND scheduled_for >= $3 AND status_id <> $4 \
             ) OR EXISTS ( \
                 SELECT 1 FROM notification_logs \
                 WHERE notification_rule_id = $1 AND recipient_id = $2 \
                   AND sent_at >= $3 AND status = $5 \
             )",
        )
        .bind(rule_id)
        .bind(recipient_id)
        .bind(since)
        .bind(PendingNotificationStatus::Dead.id())
        .bind(LOG_STATUS_SENT)
        .fetch_one(pool)
        .await
    }

    // -----------------------------------------------------------------------
    // Consumer side
    // -----------------------------------------------------------------------

    /// Atomically claim the next due row.
    ///
    /// Rows are taken in `scheduled_for` order. A recipient that already has
    /// a row in `sending` is skipped so one recipient's notifications go out
    /// in order. `FOR UPDATE SKIP LOCKED` keeps concurrent workers apart.
    pub async fn claim_next(pool: &PgPool) -> Result<Option<PendingNotification>, sqlx::Error> {
        let query = format!(
            "UPDATE pending_notifications \
             SET status_id = $1, claimed_at = NOW() \
             WHERE id = ( \
                 SELECT p.id FROM pending_notifications p \
                 WHERE p.status_id = $2 AND p.scheduled_for <= NOW() \
                   AND NOT EXISTS ( \
                       SELECT 1 FROM pending_notifications s \
                       WHERE s.recipient_id = p.recipient_id AND s.status_id = $1 \
                   ) \
                 ORDER BY p.scheduled_for, p.id \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PendingNotification>(&query)
            .bind(PendingNotificationStatus::Sending.id())
            .bind(PendingNotificationStatus::Pending.id())
            .fetch_optional(pool)
            .await
    }

    /// Finish a claimed row successfully and append the `sent` log.
    ///
    /// Returns `false` (and writes nothing) if the row is no longer in
    /// `sending`.
    pub async fn mark_sent(
        pool: &PgPool,
        id: DbId,
        channel_used: &str,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let row: Option<(DbId, DbId)> = sqlx::query_as(
            "UPDATE pending_notifications \
             SET status_id = $2, last_error = NULL \
             WHERE id = $1 AND status_id = $3 \
             RETURNING notification_rule_id, recipient_id",
        )
        .bind(id)
        .bind(PendingNotificationStatus::Sent.id())
        .bind(PendingNotificationStatus::Sending.id())
        .fetch_optional(&mut *tx)
        .await?;

        let Some((rule_id, recipient_id)) = row else {
            return Ok(false);
        };

        sqlx::query(
            "INSERT INTO notification_logs \
                 (pending_notification_id, notification_rule_id, recipient_id, status, channel_used) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(rule_id)
        .bind(recipient_id)
        .bind(LOG_STATUS_SENT)
        .bind(channel_used)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Return a claimed row to `pending` after a retryable failure.
    pub async fn schedule_retry(
        pool: &PgPool,
        id: DbId,
        retry_count: i32,
        error: &str,
        next_attempt_at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE pending_notifications \
             SET status_id = $2, retry_count = $3, last_error = $4, \
                 scheduled_for = $5, claimed_at = NULL \
             WHERE id = $1 AND status_id = $6",
        )
        .bind(id)
        .bind(PendingNotificationStatus::Pending.id())
        .bind(retry_count)
        .bind(error)
        .bind(next_attempt_at)
        .bind(PendingNotificationStatus::Sending.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Dead-letter a claimed row and append the `failed` log.
    pub async fn mark_dead(
        pool: &PgPool,
        id: DbId,
        retry_count: i32,
        error: &str,
        channel_attempted: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let row: Option<(DbId, DbId)> = sqlx::query_as(
            "UPDATE pending_notifications \
             SET status_id = $2, retry_count = $3, last_error = $4 \
             WHERE id = $1 AND status_id = $5 \
             RETURNING notification_rule_id, recipient_id",
        )
        .bind(id)
        .bind(PendingNotificationStatus::Dead.id())
        .bind(retry_count)
        .bind(error)
        .bind(PendingNotificationStatus::Sending.id())
        .fetch_optional(&mut *tx)
        .await?;

        let Some((rule_id, recipient_id)) = row else {
            return Ok(false);
        };

        sqlx::query(
            "INSERT INTO notification_logs \
                 (pending_notification_id, notification_rule_id, recipient_id, status, \
                  channel_used, error_message) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(id)
        .bind(rule_id)
        .bind(recipient_id)
        .bind(LOG_STATUS_FAILED)
        .bind(channel_attempted)
        .bind(error)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Return rows stuck in `sending` for longer than `stale_after_secs` to
    /// `pending`. Returns the number of rows released.
    pub async fn release_stale(pool: &PgPool, stale_after_secs: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE pending_notifications \
             SET status_id = $1, claimed_at = NULL \
             WHERE status_id = $2 AND claimed_at < NOW() - make_interval(secs => $3)",
        )
        .bind(PendingNotificationStatus::Pending.id())
        .bind(PendingNotificationStatus::Sending.id())
        .bind(stale_after_secs as f64)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<PendingNotification>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM pending_notifications WHERE id = $1");
        sqlx::query_as::<_, PendingNotification>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Rows addressed to a recipient, oldest first.
    pub async fn list_for_recipient(
        pool: &PgPool,
        recipient_id: DbId,
    ) -> Result<Vec<PendingNotification>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM pending_notifications \
             WHERE recipient_id = $1 \
             ORDER BY scheduled_for, id"
        );
        sqlx::query_as::<_, PendingNotification>(&query)
            .bind(recipient_id)
            .fetch_all(pool)
            .await
    }

    /// Rows produced by a rule, oldest first.
    pub async fn list_for_rule(
        pool: &PgPool,
        rule_id: DbId,
    ) -> Result<Vec<PendingNotification>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM pending_notifications \
             WHERE notification_rule_id = $1 \
             ORDER BY scheduled_for, id"
        );
        sqlx::query_as::<_, PendingNotification>(&query)
            .bind(rule_id)
            .fetch_all(pool)
            .await
    }
}
