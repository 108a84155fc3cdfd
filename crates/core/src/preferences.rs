//! Per-subscriber notification preferences and contraceptive timing.
//!
//! `contraceptive_time` is stored as a 5-character `HH:MM` string in 24-hour
//! local time (deployment timezone). The fine pass compares it against the
//! current local minute with a ±[`CONTRACEPTIVE_TOLERANCE_MINUTES`] window.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Accepted distance, in minutes, between the configured pill time and the tick.
pub const CONTRACEPTIVE_TOLERANCE_MINUTES: i64 = 2;

/// Minimum days between two weekly contraceptive reminders.
pub const WEEKLY_REMINDER_DAYS: i64 = 7;

const MINUTES_PER_DAY: i64 = 24 * 60;

// ---------------------------------------------------------------------------
// ContraceptiveFrequency
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContraceptiveFrequency {
    /// Daily pill.
    #[default]
    Daily,
    /// Weekly patch or ring change.
    Weekly,
}

impl ContraceptiveFrequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }

    /// Parse a stored value; unknown values fall back to daily.
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value {
            Some("weekly") => Self::Weekly,
            _ => Self::Daily,
        }
    }
}

// ---------------------------------------------------------------------------
// NotificationPreferences
// ---------------------------------------------------------------------------

/// Per-subscriber gates and idempotency cursors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPreferences {
    pub contraceptive_enabled: bool,
    pub contraceptive_time: Option<NaiveTime>,
    pub contraceptive_frequency: ContraceptiveFrequency,
    pub rhythm_method_enabled: bool,
    pub fertile_window_alerts: bool,
    pub ovulation_alert: bool,
    pub gyn_checkup_alert: bool,
    pub period_confirmation_reminder: bool,
    pub rhythm_abstinence_alerts: bool,
    pub last_contraceptive_sent_date: Option<NaiveDate>,
    pub last_period_reminder_sent: Option<NaiveDate>,
    pub last_checkup_reminder_sent: Option<NaiveDate>,
}

impl Default for NotificationPreferences {
    /// Preferences for a subscriber who never opened the settings screen.
    fn default() -> Self {
        Self {
            contraceptive_enabled: false,
            contraceptive_time: None,
            contraceptive_frequency: ContraceptiveFrequency::Daily,
            rhythm_method_enabled: false,
            fertile_window_alerts: true,
            ovulation_alert: true,
            gyn_checkup_alert: true,
            period_confirmation_reminder: true,
            rhythm_abstinence_alerts: false,
            last_contraceptive_sent_date: None,
            last_period_reminder_sent: None,
            last_checkup_reminder_sent: None,
        }
    }
}

impl NotificationPreferences {
    /// Whether a contraceptive reminder is due at local time `now`.
    ///
    /// Requires the feature to be enabled with a configured time, the current
    /// minute to be within tolerance, and the frequency cursor to allow it.
    pub fn contraceptive_due(&self, now: NaiveDateTime) -> bool {
        if !self.contraceptive_enabled {
            return false;
        }
        let Some(configured) = self.contraceptive_time else {
            return false;
        };
        if minute_offset(configured, now.time()) > CONTRACEPTIVE_TOLERANCE_MINUTES {
            return false;
        }
        let today = now.date();
        match (self.contraceptive_frequency, self.last_contraceptive_sent_date) {
            (_, None) => true,
            (ContraceptiveFrequency::Daily, Some(last)) => last < today,
            (ContraceptiveFrequency::Weekly, Some(last)) => {
                (today - last).num_days() >= WEEKLY_REMINDER_DAYS
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Time of day
// ---------------------------------------------------------------------------

/// Parse an `HH:MM` 24-hour time.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, CoreError> {
    let trimmed = value.trim();
    if trimmed.len() != 5 {
        return Err(CoreError::Validation(format!(
            "Time of day must be HH:MM (got '{value}')"
        )));
    }
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .map_err(|e| CoreError::Validation(format!("Invalid time of day '{value}': {e}")))
}

/// Absolute distance in minutes between two times of day, wrapping at midnight.
///
/// `23:59` and `00:01` are two minutes apart.
pub fn minute_offset(a: NaiveTime, b: NaiveTime) -> i64 {
    let a = i64::from(a.hour() * 60 + a.minute());
    let b = i64::from(b.hour() * 60 + b.minute());
    let diff = (a - b).abs();
    diff.min(MINUTES_PER_DAY - diff)
}
