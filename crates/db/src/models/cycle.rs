//! Cycle-tracking rows and their assembly into [`CycleState`].

use chrono::NaiveDate;
use clinica_core::cycle::{CycleProfile, CycleState, Pregnancy};
use clinica_core::preferences::{parse_time_of_day, ContraceptiveFrequency, NotificationPreferences};
use clinica_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `cycle_profiles` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CycleProfileRow {
    pub subscriber_id: DbId,
    pub cycle_length: i32,
    pub period_length: i32,
    pub conception_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub last_gyn_checkup_date: Option<NaiveDate>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating or replacing a cycle profile.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpsertCycleProfile {
    pub cycle_length: Option<i32>,
    pub period_length: Option<i32>,
    pub conception_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub last_gyn_checkup_date: Option<NaiveDate>,
}

/// A row from the `cycle_logs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CycleLog {
    pub id: DbId,
    pub subscriber_id: DbId,
    pub start_date: NaiveDate,
    pub duration_days: Option<i32>,
    pub created_at: Timestamp,
}

/// A row from the `symptom_logs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SymptomLog {
    pub id: DbId,
    pub subscriber_id: DbId,
    pub symptom_code: String,
    pub logged_at: Timestamp,
}

/// A row from the `cycle_notification_settings` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CycleNotificationSettings {
    pub subscriber_id: DbId,
    pub contraceptive_enabled: bool,
    pub contraceptive_time: Option<String>,
    pub contraceptive_frequency: String,
    pub rhythm_method_enabled: bool,
    pub fertile_window_alerts: bool,
    pub ovulation_alert: bool,
    pub gyn_checkup_alert: bool,
    pub period_confirmation_reminder: bool,
    pub rhythm_abstinence_alerts: bool,
    pub last_contraceptive_sent_date: Option<NaiveDate>,
    pub last_period_reminder_sent: Option<NaiveDate>,
    pub last_checkup_reminder_sent: Option<NaiveDate>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl CycleNotificationSettings {
    /// Convert to the domain preferences.
    ///
    /// An unparseable `contraceptive_time` is treated as unset so one bad
    /// value cannot stall the fine pass.
    pub fn to_preferences(&self) -> NotificationPreferences {
        NotificationPreferences {
            contraceptive_enabled: self.contraceptive_enabled,
            contraceptive_time: self
                .contraceptive_time
                .as_deref()
                .and_then(|t| parse_time_of_day(t).ok()),
            contraceptive_frequency: ContraceptiveFrequency::parse_lenient(Some(
                &self.contraceptive_frequency,
            )),
            rhythm_method_enabled: self.rhythm_method_enabled,
            fertile_window_alerts: self.fertile_window_alerts,
            ovulation_alert: self.ovulation_alert,
            gyn_checkup_alert: self.gyn_checkup_alert,
            period_confirmation_reminder: self.period_confirmation_reminder,
            rhythm_abstinence_alerts: self.rhythm_abstinence_alerts,
            last_contraceptive_sent_date: self.last_contraceptive_sent_date,
            last_period_reminder_sent: self.last_period_reminder_sent,
            last_checkup_reminder_sent: self.last_checkup_reminder_sent,
        }
    }
}

/// DTO for creating or patching notification settings. `None` keeps the
/// stored value (or the column default on insert). Cursors are owned by the
/// evaluator and cannot be set here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpsertCycleSettings {
    pub contraceptive_enabled: Option<bool>,
    /// `HH:MM`, 24-hour, deployment timezone.
    pub contraceptive_time: Option<String>,
    pub contraceptive_frequency: Option<ContraceptiveFrequency>,
    pub rhythm_method_enabled: Option<bool>,
    pub fertile_window_alerts: Option<bool>,
    pub ovulation_alert: Option<bool>,
    pub gyn_checkup_alert: Option<bool>,
    pub period_confirmation_reminder: Option<bool>,
    pub rhythm_abstinence_alerts: Option<bool>,
}

/// Assemble the evaluator's view of one subscriber.
///
/// Missing rows fall back to defaults: no profile means default lengths and
/// no pregnancy, no settings row means [`NotificationPreferences::default`].
pub fn assemble_cycle_state(
    profile: Option<&CycleProfileRow>,
    latest_start: Option<NaiveDate>,
    settings: Option<&CycleNotificationSettings>,
    recent_symptoms: Vec<String>,
) -> CycleState {
    let cycle = match profile {
        Some(p) => CycleProfile::new(latest_start, p.cycle_length, p.period_length),
        None => CycleProfile {
            last_cycle_start: latest_start,
            ..CycleProfile::default()
        },
    };
    let pregnancy = profile.and_then(|p| {
        p.conception_date.map(|conception_date| Pregnancy {
            conception_date,
            due_date: p.due_date,
        })
    });
    CycleState {
        cycle,
        pregnancy,
        preferences: settings
            .map(CycleNotificationSettings::to_preferences)
            .unwrap_or_default(),
        recent_symptoms,
        last_gyn_checkup: profile.and_then(|p| p.last_gyn_checkup_date),
    }
}
