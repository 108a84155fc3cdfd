//! Notification rule types and trigger conditions.
//!
//! A rule's `trigger_condition` is stored as a small JSON object whose single
//! key selects the trigger shape. [`TriggerCondition::parse`] turns it into a
//! tagged enum after checking that the shape is legal for the rule's
//! [`NotificationType`]; the evaluator then dispatches on the enum.
//!
//! | Type               | JSON                              | Discriminator             |
//! |--------------------|-----------------------------------|---------------------------|
//! | cycle_phase        | `{"days_before_period": N}`       | `days_before_period:N`    |
//! | cycle_phase        | `{"on_ovulation": true}`          | `on_ovulation`            |
//! | cycle_phase        | `{"in_fertile_window": true}`     | `in_fertile_window`       |
//! | cycle_phase        | `{"rhythm_abstinence": true}`     | `rhythm_abstinence`       |
//! | cycle_phase        | `{"period_confirmation": true}`   | `period_confirmation`     |
//! | symptom_alert      | `{"symptom_codes": [..]}`         | `symptom_codes`           |
//! | prenatal_weekly    | `{"weekday": 0..6}`               | `weekday`                 |
//! | prenatal_milestone | `{"gestation_week": W}`           | `gestation_week:W`        |
//! | system             | `{"contraceptive_reminder": true}`| `contraceptive_reminder`  |
//! | system             | `{"checkup_reminder_days": N}`    | `checkup_reminder_days`   |
//! | custom             | `{"handler": "name", ..}`         | `custom:name`             |

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cycle::MAX_GESTATION_WEEK;
use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Upper bound for `days_before_period` (longest supported cycle).
pub const MAX_DAYS_BEFORE_PERIOD: u32 = 45;

/// Upper bound for `checkup_reminder_days` (ten years).
pub const MAX_CHECKUP_REMINDER_DAYS: u32 = 3_650;

/// Maximum number of symptom codes on a single symptom-alert rule.
pub const MAX_SYMPTOM_CODES: usize = 50;

/// Weekday index used by `prenatal_weekly` triggers: 0 = Monday.
const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

// ---------------------------------------------------------------------------
// NotificationType
// ---------------------------------------------------------------------------

/// The closed set of rule categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    CyclePhase,
    SymptomAlert,
    PrenatalWeekly,
    PrenatalMilestone,
    System,
    Custom,
}

impl NotificationType {
    pub const ALL: [NotificationType; 6] = [
        Self::CyclePhase,
        Self::SymptomAlert,
        Self::PrenatalWeekly,
        Self::PrenatalMilestone,
        Self::System,
        Self::Custom,
    ];

    /// The database representation stored in `notification_rules.notification_type`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CyclePhase => "cycle_phase",
            Self::SymptomAlert => "symptom_alert",
            Self::PrenatalWeekly => "prenatal_weekly",
            Self::PrenatalMilestone => "prenatal_milestone",
            Self::System => "system",
            Self::Custom => "custom",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == value)
            .ok_or_else(|| CoreError::Validation(format!("Unknown notification type '{value}'")))
    }

    /// Enqueue priority when several rules fire for the same subscriber on
    /// the same day. Lower values are inserted first; ties break on rule id.
    pub fn priority(self) -> i16 {
        match self {
            Self::System => 0,
            Self::PrenatalMilestone => 1,
            Self::PrenatalWeekly => 2,
            Self::CyclePhase => 3,
            Self::SymptomAlert => 4,
            Self::Custom => 5,
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TriggerCondition
// ---------------------------------------------------------------------------

/// A parsed rule trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerCondition {
    /// Fire `N` days before the predicted next period start.
    DaysBeforePeriod(u32),
    /// Fire on the predicted ovulation day.
    OnOvulation,
    /// Fire on each day of the fertile window.
    InFertileWindow,
    /// Fire on each day of the widened rhythm-method abstinence window.
    RhythmAbstinence,
    /// Fire once when the predicted period is more than three days late.
    PeriodConfirmation,
    /// Fire when one of these symptoms was logged in the last 24 hours.
    SymptomCodes(Vec<String>),
    /// Fire weekly on this weekday while the subscriber is pregnant.
    Weekday(Weekday),
    /// Fire once when the subscriber enters this gestation week.
    GestationWeek(u32),
    /// Daily contraceptive pill reminder, evaluated by the fine pass only.
    ContraceptiveReminder,
    /// Gynecological check-up reminder `days` after the last check-up.
    CheckupReminder { days: u32 },
    /// Opaque trigger evaluated by a registered handler.
    Custom { handler: String, params: Value },
}

impl TriggerCondition {
    /// Parse and validate a stored trigger for a rule of type `kind`.
    pub fn parse(kind: NotificationType, value: &Value) -> Result<Self, CoreError> {
        let obj = value
            .as_object()
            .ok_or_else(|| malformed("trigger condition must be a JSON object"))?;

        if kind == NotificationType::Custom {
            let handler = obj
                .get("handler")
                .and_then(Value::as_str)
                .filter(|h| !h.trim().is_empty())
                .ok_or_else(|| malformed("custom trigger requires a non-empty 'handler'"))?;
            return Ok(Self::Custom {
                handler: handler.to_string(),
                params: value.clone(),
            });
        }

        let mut entries = obj.iter();
        let (key, val) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => return Err(malformed("trigger condition must have exactly one key")),
        };

        let condition = match key.as_str() {
            "days_before_period" => {
                Self::DaysBeforePeriod(bounded(key, val, 0, MAX_DAYS_BEFORE_PERIOD)?)
            }
            "on_ovulation" => {
                expect_true(key, val)?;
                Self::OnOvulation
            }
            "in_fertile_window" => {
                expect_true(key, val)?;
                Self::InFertileWindow
            }
            "rhythm_abstinence" => {
                expect_true(key, val)?;
                Self::RhythmAbstinence
            }
            "period_confirmation" => {
                expect_true(key, val)?;
                Self::PeriodConfirmation
            }
            "symptom_codes" => Self::SymptomCodes(symptom_codes(val)?),
            "weekday" => {
                let index = bounded(key, val, 0, 6)?;
                Self::Weekday(WEEKDAYS[index as usize])
            }
            "gestation_week" => Self::GestationWeek(bounded(key, val, 1, MAX_GESTATION_WEEK)?),
            "contraceptive_reminder" => {
                expect_true(key, val)?;
                Self::ContraceptiveReminder
            }
            "checkup_reminder_days" => Self::CheckupReminder {
                days: bounded(key, val, 1, MAX_CHECKUP_REMINDER_DAYS)?,
            },
            other => return Err(malformed(format!("unknown trigger key '{other}'"))),
        };

        if condition.notification_type() != kind {
            return Err(malformed(format!(
                "trigger '{key}' is not valid for {kind} rules"
            )));
        }

        Ok(condition)
    }

    /// The only rule type this trigger shape is legal for.
    pub fn notification_type(&self) -> NotificationType {
        match self {
            Self::DaysBeforePeriod(_)
            | Self::OnOvulation
            | Self::InFertileWindow
            | Self::RhythmAbstinence
            | Self::PeriodConfirmation => NotificationType::CyclePhase,
            Self::SymptomCodes(_) => NotificationType::SymptomAlert,
            Self::Weekday(_) => NotificationType::PrenatalWeekly,
            Self::GestationWeek(_) => NotificationType::PrenatalMilestone,
            Self::ContraceptiveReminder | Self::CheckupReminder { .. } => NotificationType::System,
            Self::Custom { .. } => NotificationType::Custom,
        }
    }

    /// Key that makes a rule unique within `(tenant, notification_type)`.
    pub fn discriminator(&self) -> String {
        match self {
            Self::DaysBeforePeriod(n) => format!("days_before_period:{n}"),
            Self::OnOvulation => "on_ovulation".to_string(),
            Self::InFertileWindow => "in_fertile_window".to_string(),
            Self::RhythmAbstinence => "rhythm_abstinence".to_string(),
            Self::PeriodConfirmation => "period_confirmation".to_string(),
            Self::SymptomCodes(_) => "symptom_codes".to_string(),
            Self::Weekday(_) => "weekday".to_string(),
            Self::GestationWeek(w) => format!("gestation_week:{w}"),
            Self::ContraceptiveReminder => "contraceptive_reminder".to_string(),
            Self::CheckupReminder { .. } => "checkup_reminder_days".to_string(),
            Self::Custom { handler, .. } => format!("custom:{handler}"),
        }
    }

    /// Serialize back to the stored JSON form.
    pub fn to_json(&self) -> Value {
        match self {
            Self::DaysBeforePeriod(n) => json!({ "days_before_period": n }),
            Self::OnOvulation => json!({ "on_ovulation": true }),
            Self::InFertileWindow => json!({ "in_fertile_window": true }),
            Self::RhythmAbstinence => json!({ "rhythm_abstinence": true }),
            Self::PeriodConfirmation => json!({ "period_confirmation": true }),
            Self::SymptomCodes(codes) => json!({ "symptom_codes": codes }),
            Self::Weekday(day) => json!({ "weekday": day.num_days_from_monday() }),
            Self::GestationWeek(w) => json!({ "gestation_week": w }),
            Self::ContraceptiveReminder => json!({ "contraceptive_reminder": true }),
            Self::CheckupReminder { days } => json!({ "checkup_reminder_days": days }),
            Self::Custom { params, .. } => params.clone(),
        }
    }

    /// Whether the trigger belongs to the 5-minute fine pass rather than the
    /// daily pass.
    pub fn is_fine_pass(&self) -> bool {
        matches!(self, Self::ContraceptiveReminder)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn malformed(msg: impl Into<String>) -> CoreError {
    CoreError::Validation(format!("Malformed trigger condition: {}", msg.into()))
}

fn expect_true(key: &str, val: &Value) -> Result<(), CoreError> {
    match val.as_bool() {
        Some(true) => Ok(()),
        _ => Err(malformed(format!("'{key}' must be true"))),
    }
}

fn bounded(key: &str, val: &Value, min: u32, max: u32) -> Result<u32, CoreError> {
    let n = val
        .as_u64()
        .ok_or_else(|| malformed(format!("'{key}' must be a non-negative integer")))?;
    if n < u64::from(min) || n > u64::from(max) {
        return Err(malformed(format!(
            "'{key}' must be between {min} and {max} (got {n})"
        )));
    }
    Ok(n as u32)
}

fn symptom_codes(val: &Value) -> Result<Vec<String>, CoreError> {
    let items = val
        .as_array()
        .ok_or_else(|| malformed("'symptom_codes' must be an array of strings"))?;
    if items.is_empty() || items.len() > MAX_SYMPTOM_CODES {
        return Err(malformed(format!(
            "'symptom_codes' must contain between 1 and {MAX_SYMPTOM_CODES} codes"
        )));
    }
    items
        .iter()
        .map(|item| {
            item.as_str()
                .filter(|code| !code.trim().is_empty())
                .map(str::to_string)
                .ok_or_else(|| malformed("'symptom_codes' entries must be non-empty strings"))
        })
        .collect()
}
