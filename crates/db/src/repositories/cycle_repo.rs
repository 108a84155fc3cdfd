//! Repository for cycle-tracking data: `cycle_profiles`, `cycle_logs`,
//! `symptom_logs` and `cycle_notification_settings`.
//!
//! The evaluator reads a subscriber's data through [`CycleRepo::get_cycle_state`]
//! and advances the idempotency cursors through [`CycleRepo::advance_cursor`]
//! inside the same transaction that enqueues the notification.

use chrono::{Duration, NaiveDate};
use clinica_core::cycle::CycleState;
use clinica_core::evaluation::Cursor;
use clinica_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::models::cycle::{
    assemble_cycle_state, CycleLog, CycleNotificationSettings, CycleProfileRow, SymptomLog,
    UpsertCycleProfile, UpsertCycleSettings,
};

/// Column list for `cycle_profiles` queries.
const PROFILE_COLUMNS: &str = "\
    subscriber_id, cycle_length, period_length, conception_date, due_date, \
    last_gyn_checkup_date, created_at, updated_at";

/// Column list for `cycle_logs` queries.
const LOG_COLUMNS: &str = "id, subscriber_id, start_date, duration_days, created_at";

/// Column list for `symptom_logs` queries.
const SYMPTOM_COLUMNS: &str = "id, subscriber_id, symptom_code, logged_at";

/// Column list for `cycle_notification_settings` queries.
const SETTINGS_COLUMNS: &str = "\
    subscriber_id, contraceptive_enabled, contraceptive_time, contraceptive_frequency, \
    rhythm_method_enabled, fertile_window_alerts, ovulation_alert, gyn_checkup_alert, \
    period_confirmation_reminder, rhythm_abstinence_alerts, \
    last_contraceptive_sent_date, last_period_reminder_sent, last_checkup_reminder_sent, \
    created_at, updated_at";

/// Symptoms logged within this window feed symptom-alert rules.
const RECENT_SYMPTOM_HOURS: i64 = 24;

fn cursor_column(cursor: Cursor) -> &'static str {
    match cursor {
        Cursor::PeriodReminder => "last_period_reminder_sent",
        Cursor::CheckupReminder => "last_checkup_reminder_sent",
        Cursor::Contraceptive => "last_contraceptive_sent_date",
    }
}

/// Provides access to per-subscriber biological state.
pub struct CycleRepo;

impl CycleRepo {
    // -----------------------------------------------------------------------
    // Profile
    // -----------------------------------------------------------------------

    /// Create or replace a subscriber's cycle profile. Missing lengths fall
    /// back to the column defaults (28 / 5 days).
    pub async fn upsert_profile(
        pool: &PgPool,
        subscriber_id: DbId,
        input: &UpsertCycleProfile,
    ) -> Result<CycleProfileRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO cycle_profiles \
                 (subscriber_id, cycle_length, period_length, conception_date, due_date, \
                  last_gyn_checkup_date) \
             VALUES ($1, COALESCE($2, 28), COALESCE($3, 5), $4, $5, $6) \
             ON CONFLICT (subscriber_id) DO UPDATE SET \
                 cycle_length = EXCLUDED.cycle_length, \
                 period_length = EXCLUDED.period_length, \
                 conception_date = EXCLUDED.conception_date, \
                 due_date = EXCLUDED.due_date, \
                 last_gyn_checkup_date = EXCLUDED.last_gyn_checkup_date \
             RETURNING {PROFILE_COLUMNS}"
        );
        sqlx::query_as::<_, CycleProfileRow>(&query)
            .bind(subscriber_id)
            .bind(input.cycle_length)
            .bind(input.period_length)
            .bind(input.conception_date)
            .bind(input.due_date)
            .bind(input.last_gyn_checkup_date)
            .fetch_one(pool)
            .await
    }

    pub async fn get_profile(
        pool: &PgPool,
        subscriber_id: DbId,
    ) -> Result<Option<CycleProfileRow>, sqlx::Error> {
        let query = format!("SELECT {PROFILE_COLUMNS} FROM cycle_profiles WHERE subscriber_id = $1");
        sqlx::query_as::<_, CycleProfileRow>(&query)
            .bind(subscriber_id)
            .fetch_optional(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Logs
    // -----------------------------------------------------------------------

    pub async fn add_cycle_log(
        pool: &PgPool,
        subscriber_id: DbId,
        start_date: NaiveDate,
        duration_days: Option<i32>,
    ) -> Result<CycleLog, sqlx::Error> {
        let query = format!(
            "INSERT INTO cycle_logs (subscriber_id, start_date, duration_days) \
             VALUES ($1, $2, $3) \
             RETURNING {LOG_COLUMNS}"
        );
        sqlx::query_as::<_, CycleLog>(&query)
            .bind(subscriber_id)
            .bind(start_date)
            .bind(duration_days)
            .fetch_one(pool)
            .await
    }

    /// Start date of the most recent cycle log.
    pub async fn latest_cycle_start(
        pool: &PgPool,
        subscriber_id: DbId,
    ) -> Result<Option<NaiveDate>, sqlx::Error> {
        sqlx::query_scalar("SELECT MAX(start_date) FROM cycle_logs WHERE subscriber_id = $1")
            .bind(subscriber_id)
            .fetch_one(pool)
            .await
    }

    pub async fn log_symptom(
        pool: &PgPool,
        subscriber_id: DbId,
        symptom_code: &str,
        logged_at: Timestamp,
    ) -> Result<SymptomLog, sqlx::Error> {
        let query = format!(
            "INSERT INTO symptom_logs (subscriber_id, symptom_code, logged_at) \
             VALUES ($1, $2, $3) \
             RETURNING {SYMPTOM_COLUMNS}"
        );
        sqlx::query_as::<_, SymptomLog>(&query)
            .bind(subscriber_id)
            .bind(symptom_code)
            .bind(logged_at)
            .fetch_one(pool)
            .await
    }

    /// Distinct symptom codes logged at or after `since`.
    pub async fn symptom_codes_since(
        pool: &PgPool,
        subscriber_id: DbId,
        since: Timestamp,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT DISTINCT symptom_code FROM symptom_logs \
             WHERE subscriber_id = $1 AND logged_at >= $2 \
             ORDER BY symptom_code",
        )
        .bind(subscriber_id)
        .bind(since)
        .fetch_all(pool)
        .await
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    /// Create or patch notification settings. `None` fields keep the stored
    /// value, or take the column default when the row is new.
    pub async fn upsert_settings(
        pool: &PgPool,
        subscriber_id: DbId,
        input: &UpsertCycleSettings,
    ) -> Result<CycleNotificationSettings, sqlx::Error> {
        let query = format!(
            "INSERT INTO cycle_notification_settings AS s \
                 (subscriber_id, contraceptive_enabled, contraceptive_time, \
                  contraceptive_frequency, rhythm_method_enabled, fertile_window_alerts, \
                  ovulation_alert, gyn_checkup_alert, period_confirmation_reminder, \
                  rhythm_abstinence_alerts) \
             VALUES ($1, COALESCE($2, false), $3, COALESCE($4, 'daily'), COALESCE($5, false), \
                     COALESCE($6, true), COALESCE($7, true), COALESCE($8, true), \
                     COALESCE($9, true), COALESCE($10, false)) \
             ON CONFLICT (subscriber_id) DO UPDATE SET \
                 contraceptive_enabled = COALESCE($2, s.contraceptive_enabled), \
                 contraceptive_time = COALESCE($3, s.contraceptive_time), \
                 contraceptive_frequency = COALESCE($4, s.contraceptive_frequency), \
                 rhythm_method_enabled = COALESCE($5, s.rhythm_method_enabled), \
                 fertile_window_alerts = COALESCE($6, s.fertile_window_alerts), \
                 ovulation_alert = COALESCE($7, s.ovulation_alert), \
                 gyn_checkup_alert = COALESCE($8, s.gyn_checkup_alert), \
                 period_confirmation_reminder = COALESCE($9, s.period_confirmation_reminder), \
                 rhythm_abstinence_alerts = COALESCE($10, s.rhythm_abstinence_alerts) \
             RETURNING {SETTINGS_COLUMNS}"
        );
        sqlx::query_as::<_, CycleNotificationSettings>(&query)
            .bind(subscriber_id)
            .bind(input.contraceptive_enabled)
            .bind(&input.contraceptive_time)
            .bind(input.contraceptive_frequency.map(|f| f.as_str()))
            .bind(input.rhythm_method_enabled)
            .bind(input.fertile_window_alerts)
            .bind(input.ovulation_alert)
            .bind(input.gyn_checkup_alert)
            .bind(input.period_confirmation_reminder)
            .bind(input.rhythm_abstinence_alerts)
            .fetch_one(pool)
            .await
    }

    pub async fn get_settings(
        pool: &PgPool,
        subscriber_id: DbId,
    ) -> Result<Option<CycleNotificationSettings>, sqlx::Error> {
        let query = format!(
            "SELECT {SETTINGS_COLUMNS} FROM cycle_notification_settings WHERE subscriber_id = $1"
        );
        sqlx::query_as::<_, CycleNotificationSettings>(&query)
            .bind(subscriber_id)
            .fetch_optional(pool)
            .await
    }

    /// Subscribers of a tenant with the contraceptive reminder switched on.
    ///
    /// Only active subscribers are returned; the time itself is validated by
    /// the caller.
    pub async fn list_contraceptive_settings(
        pool: &PgPool,
        tenant_id: DbId,
    ) -> Result<Vec<CycleNotificationSettings>, sqlx::Error> {
        let query = format!(
            "SELECT {SETTINGS_COLUMNS} FROM cycle_notification_settings \
             WHERE contraceptive_enabled = true AND contraceptive_time IS NOT NULL \
               AND subscriber_id IN ( \
                   SELECT id FROM patient_subscribers \
                   WHERE tenant_id = $1 AND is_active = true \
               ) \
             ORDER BY subscriber_id"
        );
        sqlx::query_as::<_, CycleNotificationSettings>(&query)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Assembled state
    // -----------------------------------------------------------------------

    /// Everything the evaluator needs to know about one subscriber at `now`.
    pub async fn get_cycle_state(
        pool: &PgPool,
        subscriber_id: DbId,
        now: Timestamp,
    ) -> Result<CycleState, sqlx::Error> {
        let profile = Self::get_profile(pool, subscriber_id).await?;
        let latest_start = Self::latest_cycle_start(pool, subscriber_id).await?;
        let settings = Self::get_settings(pool, subscriber_id).await?;
        let symptoms = Self::symptom_codes_since(
            pool,
            subscriber_id,
            now - Duration::hours(RECENT_SYMPTOM_HOURS),
        )
        .await?;
        Ok(assemble_cycle_state(
            profile.as_ref(),
            latest_start,
            settings.as_ref(),
            symptoms,
        ))
    }

    // -----------------------------------------------------------------------
    // Cursors
    // -----------------------------------------------------------------------

    /// Compare-and-set an idempotency cursor to `today`.
    ///
    /// The cursor only moves when it is NULL or strictly earlier than
    /// `older_than`. Creates the settings row with defaults if it is missing.
    /// Returns `true` if this call advanced the cursor; a concurrent caller
    /// that lost the race gets `false` and must not enqueue.
    pub async fn advance_cursor(
        conn: &mut PgConnection,
        subscriber_id: DbId,
        cursor: Cursor,
        today: NaiveDate,
        older_than: NaiveDate,
    ) -> Result<bool, sqlx::Error> {
        let column = cursor_column(cursor);
        let query = format!(
            "INSERT INTO cycle_notification_settings AS s (subscriber_id, {column}) \
             VALUES ($1, $2) \
             ON CONFLICT (subscriber_id) DO UPDATE SET {column} = EXCLUDED.{column} \
             WHERE s.{column} IS NULL OR s.{column} < $3"
        );
        let result = sqlx::query(&query)
            .bind(subscriber_id)
            .bind(today)
            .bind(older_than)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
