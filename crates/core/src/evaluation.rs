//! Pure due-today decisions for the daily evaluator pass.
//!
//! [`check_daily`] answers "should this trigger fire for this subscriber
//! today?" without touching the database. Some answers carry a guard the
//! caller must apply atomically with the enqueue (an idempotency cursor or a
//! once-per-pregnancy check); see [`DueCheck`].

use chrono::{Datelike, NaiveDate};

use crate::cycle::CycleState;
use crate::rules::TriggerCondition;
use crate::template::TemplateContext;

// ---------------------------------------------------------------------------
// DueCheck
// ---------------------------------------------------------------------------

/// Idempotency cursors stored in `cycle_notification_settings`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// `last_period_reminder_sent`
    PeriodReminder,
    /// `last_checkup_reminder_sent`
    CheckupReminder,
    /// `last_contraceptive_sent_date`
    Contraceptive,
}

/// Outcome of evaluating one trigger against one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DueCheck {
    /// Nothing to send today (including "not enough data").
    NotDue,
    /// Due; the pending-table uniqueness key prevents duplicates.
    Due,
    /// Due if the cursor can be advanced to today in the same transaction.
    DueWithCursor(Cursor),
    /// Due unless a delivery already exists for this rule and recipient on
    /// or after `since`.
    DueOnce { since: NaiveDate },
    /// Decision belongs to a registered custom handler.
    DelegateCustom,
}

impl DueCheck {
    pub fn is_not_due(&self) -> bool {
        matches!(self, Self::NotDue)
    }
}

// ---------------------------------------------------------------------------
// Daily decision
// ---------------------------------------------------------------------------

/// Decide whether `trigger` fires for a subscriber in `state` on `today`.
///
/// Preference gates are applied here; a subscriber whose preferences do not
/// permit the rule's category is simply not due.
pub fn check_daily(trigger: &TriggerCondition, today: NaiveDate, state: &CycleState) -> DueCheck {
    let prefs = &state.preferences;
    let predictions = state.cycle.predictions();
    let due_if = |cond: bool| if cond { DueCheck::Due } else { DueCheck::NotDue };

    match trigger {
        TriggerCondition::DaysBeforePeriod(days) => match predictions {
            Some(p) if prefs.fertile_window_alerts => {
                due_if(p.days_until_next_period(today) == i64::from(*days))
            }
            _ => DueCheck::NotDue,
        },
        TriggerCondition::OnOvulation => match predictions {
            Some(p) if prefs.ovulation_alert => due_if(today == p.ovulation),
            _ => DueCheck::NotDue,
        },
        TriggerCondition::InFertileWindow => match predictions {
            Some(p) if prefs.fertile_window_alerts => due_if(p.fertile_window.contains(today)),
            _ => DueCheck::NotDue,
        },
        TriggerCondition::RhythmAbstinence => match predictions {
            Some(p) if prefs.rhythm_method_enabled && prefs.rhythm_abstinence_alerts => {
                due_if(p.rhythm_window.contains(today))
            }
            _ => DueCheck::NotDue,
        },
        // Once per predicted period: a cursor on or after the overdue date
        // means this lateness was already confirmed.
        TriggerCondition::PeriodConfirmation => match predictions {
            Some(p)
                if prefs.period_confirmation_reminder
                    && p.is_period_overdue(today)
                    && prefs
                        .last_period_reminder_sent
                        .is_none_or(|last| last < p.overdue_from()) =>
            {
                DueCheck::DueWithCursor(Cursor::PeriodReminder)
            }
            _ => DueCheck::NotDue,
        },
        TriggerCondition::SymptomCodes(codes) => due_if(
            state
                .recent_symptoms
                .iter()
                .any(|logged| codes.iter().any(|code| code == logged)),
        ),
        TriggerCondition::Weekday(weekday) => match (&state.pregnancy, today.weekday()) {
            (Some(pregnancy), current) if current == *weekday => {
                due_if(pregnancy.gestation_week(today).is_some())
            }
            _ => DueCheck::NotDue,
        },
        TriggerCondition::GestationWeek(week) => match &state.pregnancy {
            Some(pregnancy) if pregnancy.gestation_week(today) == Some(*week) => DueCheck::DueOnce {
                since: pregnancy.conception_date,
            },
            _ => DueCheck::NotDue,
        },
        TriggerCondition::CheckupReminder { days } => {
            let Some(last_checkup) = state.last_gyn_checkup else {
                return DueCheck::NotDue;
            };
            let overdue = (today - last_checkup).num_days() >= i64::from(*days);
            let already_reminded = prefs
                .last_checkup_reminder_sent
                .is_some_and(|sent| sent >= last_checkup);
            if prefs.gyn_checkup_alert && overdue && !already_reminded {
                DueCheck::DueWithCursor(Cursor::CheckupReminder)
            } else {
                DueCheck::NotDue
            }
        }
        // Handled by the fine pass.
        TriggerCondition::ContraceptiveReminder => DueCheck::NotDue,
        TriggerCondition::Custom { .. } => DueCheck::DelegateCustom,
    }
}

// ---------------------------------------------------------------------------
// Template context
// ---------------------------------------------------------------------------

/// Build the template variables for one subscriber on `today`.
///
/// `days_until` counts down to the due date for pregnant subscribers and to
/// the predicted next period otherwise (it is omitted once that date passed).
pub fn template_context(
    today: NaiveDate,
    patient_name: &str,
    tenant_name: &str,
    state: &CycleState,
) -> TemplateContext {
    let predictions = state.cycle.predictions();
    let pregnancy = state.pregnancy.as_ref();

    let days_until = match (pregnancy, predictions) {
        (Some(p), _) => Some((p.expected_due_date() - today).num_days()),
        (None, Some(p)) => Some(p.days_until_next_period(today)),
        (None, None) => None,
    }
    .filter(|days| *days >= 0);

    TemplateContext {
        patient_name: Some(patient_name.to_string()),
        date: Some(today),
        days_until,
        week_number: pregnancy.and_then(|p| p.gestation_week(today)),
        due_date: pregnancy.map(|p| p.expected_due_date()),
        cycle_day: predictions.map(|p| p.cycle_day(today)),
        phase_name: predictions.map(|p| p.phase(today).name().to_string()),
        tenant_name: Some(tenant_name.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Weekday};

    use super::*;
    use crate::cycle::{CycleProfile, Pregnancy};
    use crate::preferences::NotificationPreferences;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn cycling(start: NaiveDate) -> CycleState {
        CycleState {
            cycle: CycleProfile::new(Some(start), 28, 5),
            ..Default::default()
        }
    }

    fn pregnant(conception: NaiveDate) -> CycleState {
        CycleState {
            pregnancy: Some(Pregnancy {
                conception_date: conception,
                due_date: None,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn days_before_period_due_on_exact_day() {
        let state = cycling(date(2026, 1, 15));
        let trigger = TriggerCondition::DaysBeforePeriod(2);
        assert_eq!(check_daily(&trigger, date(2026, 2, 10), &state), DueCheck::Due);
        assert!(check_daily(&trigger, date(2026, 2, 9), &state).is_not_due());
        assert!(check_daily(&trigger, date(2026, 2, 11), &state).is_not_due());
    }

    #[test]
    fn days_before_period_respects_preference() {
        let mut state = cycling(date(2026, 1, 15));
        state.preferences.fertile_window_alerts = false;
        let trigger = TriggerCondition::DaysBeforePeriod(2);
        assert!(check_daily(&trigger, date(2026, 2, 10), &state).is_not_due());
    }

    #[test]
    fn no_cycle_log_never_due_for_cycle_phase() {
        let state = CycleState::default();
        for trigger in [
            TriggerCondition::DaysBeforePeriod(0),
            TriggerCondition::OnOvulation,
            TriggerCondition::InFertileWindow,
            TriggerCondition::RhythmAbstinence,
            TriggerCondition::PeriodConfirmation,
        ] {
            assert!(check_daily(&trigger, date(2026, 2, 10), &state).is_not_due());
        }
    }

    #[test]
    fn ovulation_gated_by_preference() {
        let mut state = cycling(date(2026, 1, 15));
        assert_eq!(
            check_daily(&TriggerCondition::OnOvulation, date(2026, 1, 29), &state),
            DueCheck::Due
        );
        state.preferences.ovulation_alert = false;
        assert!(check_daily(&TriggerCondition::OnOvulation, date(2026, 1, 29), &state).is_not_due());
    }

    #[test]
    fn fertile_window_due_every_day_of_window() {
        let state = cycling(date(2026, 1, 15));
        let due_days = (0..28)
            .map(|i| date(2026, 1, 15) + Duration::days(i))
            .filter(|d| check_daily(&TriggerCondition::InFertileWindow, *d, &state) == DueCheck::Due)
            .count();
        assert_eq!(due_days, 7);
    }

    #[test]
    fn rhythm_requires_both_flags() {
        let mut state = cycling(date(2026, 1, 15));
        let trigger = TriggerCondition::RhythmAbstinence;
        assert!(check_daily(&trigger, date(2026, 1, 22), &state).is_not_due());
        state.preferences.rhythm_method_enabled = true;
        state.preferences.rhythm_abstinence_alerts = true;
        assert_eq!(check_daily(&trigger, date(2026, 1, 22), &state), DueCheck::Due);
        assert_eq!(check_daily(&trigger, date(2026, 2, 1), &state), DueCheck::Due);
        assert!(check_daily(&trigger, date(2026, 2, 2), &state).is_not_due());
    }

    #[test]
    fn period_confirmation_uses_cursor() {
        let mut state = cycling(date(2026, 1, 15));
        let trigger = TriggerCondition::PeriodConfirmation;
        assert!(check_daily(&trigger, date(2026, 2, 15), &state).is_not_due());
        assert_eq!(
            check_daily(&trigger, date(2026, 2, 16), &state),
            DueCheck::DueWithCursor(Cursor::PeriodReminder)
        );
        state.preferences.last_period_reminder_sent = Some(date(2026, 2, 16));
        assert!(check_daily(&trigger, date(2026, 2, 16), &state).is_not_due());
    }

    #[test]
    fn period_confirmation_fires_once_per_overdue_period() {
        let mut state = cycling(date(2026, 1, 15));
        let trigger = TriggerCondition::PeriodConfirmation;
        let mut fired = Vec::new();
        for offset in 0..10 {
            let today = date(2026, 2, 16) + Duration::days(offset);
            let check = check_daily(&trigger, today, &state);
            if check == DueCheck::DueWithCursor(Cursor::PeriodReminder) {
                fired.push(today);
                state.preferences.last_period_reminder_sent = Some(today);
            }
        }
        assert_eq!(fired, vec![date(2026, 2, 16)]);
    }

    #[test]
    fn period_confirmation_rearms_after_new_cycle() {
        let mut state = cycling(date(2026, 1, 15));
        state.preferences.last_period_reminder_sent = Some(date(2026, 2, 16));
        // Logging a new start moves the prediction; the old cursor no longer blocks.
        state.cycle.last_cycle_start = Some(date(2026, 2, 20));
        let trigger = TriggerCondition::PeriodConfirmation;
        assert!(check_daily(&trigger, date(2026, 3, 23), &state).is_not_due());
        assert_eq!(
            check_daily(&trigger, date(2026, 3, 24), &state),
            DueCheck::DueWithCursor(Cursor::PeriodReminder)
        );
    }

    #[test]
    fn prenatal_weekly_on_monday() {
        let state = pregnant(date(2025, 12, 1));
        let trigger = TriggerCondition::Weekday(Weekday::Mon);
        assert_eq!(check_daily(&trigger, date(2026, 2, 16), &state), DueCheck::Due);
        assert!(check_daily(&trigger, date(2026, 2, 17), &state).is_not_due());
    }

    #[test]
    fn prenatal_weekly_requires_pregnancy() {
        let state = cycling(date(2026, 1, 15));
        let trigger = TriggerCondition::Weekday(Weekday::Mon);
        assert!(check_daily(&trigger, date(2026, 2, 16), &state).is_not_due());
    }

    #[test]
    fn no_prenatal_rule_past_week_42() {
        let conception = date(2025, 1, 6);
        let state = pregnant(conception);
        let week_43_monday = conception + Duration::days(42 * 7);
        assert_eq!(week_43_monday.weekday(), Weekday::Mon);
        assert!(
            check_daily(&TriggerCondition::Weekday(Weekday::Mon), week_43_monday, &state)
                .is_not_due()
        );
        let week_42_monday = conception + Duration::days(41 * 7);
        assert_eq!(
            check_daily(&TriggerCondition::Weekday(Weekday::Mon), week_42_monday, &state),
            DueCheck::Due
        );
        assert_eq!(
            check_daily(&TriggerCondition::GestationWeek(42), week_42_monday, &state),
            DueCheck::DueOnce { since: conception }
        );
    }

    #[test]
    fn milestone_due_once_in_week() {
        let state = pregnant(date(2025, 12, 1));
        assert_eq!(
            check_daily(&TriggerCondition::GestationWeek(12), date(2026, 2, 16), &state),
            DueCheck::DueOnce {
                since: date(2025, 12, 1)
            }
        );
        assert!(
            check_daily(&TriggerCondition::GestationWeek(13), date(2026, 2, 16), &state)
                .is_not_due()
        );
    }

    #[test]
    fn symptom_alert_matches_any_code() {
        let mut state = CycleState::default();
        let trigger = TriggerCondition::SymptomCodes(vec!["severe_pain".into(), "fever".into()]);
        assert!(check_daily(&trigger, date(2026, 2, 16), &state).is_not_due());
        state.recent_symptoms = vec!["headache".into(), "fever".into()];
        assert_eq!(check_daily(&trigger, date(2026, 2, 16), &state), DueCheck::Due);
    }

    #[test]
    fn checkup_reminder_once_per_checkup() {
        let mut state = CycleState {
            last_gyn_checkup: Some(date(2025, 2, 1)),
            ..Default::default()
        };
        let trigger = TriggerCondition::CheckupReminder { days: 365 };
        assert!(check_daily(&trigger, date(2026, 1, 31), &state).is_not_due());
        assert_eq!(
            check_daily(&trigger, date(2026, 2, 1), &state),
            DueCheck::DueWithCursor(Cursor::CheckupReminder)
        );
        state.preferences.last_checkup_reminder_sent = Some(date(2026, 2, 1));
        assert!(check_daily(&trigger, date(2026, 3, 1), &state).is_not_due());
    }

    #[test]
    fn contraceptive_never_due_in_daily_pass() {
        let state = CycleState {
            preferences: NotificationPreferences {
                contraceptive_enabled: true,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(
            check_daily(&TriggerCondition::ContraceptiveReminder, date(2026, 2, 16), &state)
                .is_not_due()
        );
    }

    #[test]
    fn custom_is_delegated() {
        let trigger = TriggerCondition::Custom {
            handler: "x".into(),
            params: serde_json::json!({ "handler": "x" }),
        };
        assert_eq!(
            check_daily(&trigger, date(2026, 2, 16), &CycleState::default()),
            DueCheck::DelegateCustom
        );
    }

    #[test]
    fn context_for_cycling_subscriber() {
        let state = cycling(date(2026, 1, 15));
        let ctx = template_context(date(2026, 2, 10), "Ana", "Clínica Sol", &state);
        assert_eq!(ctx.days_until, Some(2));
        assert_eq!(ctx.cycle_day, Some(27));
        assert_eq!(ctx.phase_name.as_deref(), Some("luteal"));
        assert_eq!(ctx.week_number, None);
        assert_eq!(ctx.tenant_name.as_deref(), Some("Clínica Sol"));
    }

    #[test]
    fn context_for_pregnant_subscriber() {
        let state = pregnant(date(2025, 12, 1));
        let ctx = template_context(date(2026, 2, 16), "Ana", "Clínica Sol", &state);
        assert_eq!(ctx.week_number, Some(12));
        assert_eq!(ctx.due_date, Some(date(2026, 8, 24)));
        assert_eq!(ctx.cycle_day, None);
    }

    #[test]
    fn late_period_omits_days_until() {
        let state = cycling(date(2026, 1, 15));
        let ctx = template_context(date(2026, 2, 20), "Ana", "Clínica Sol", &state);
        assert_eq!(ctx.days_until, None);
    }
}
