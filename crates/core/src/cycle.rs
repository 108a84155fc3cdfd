//! Menstrual cycle and pregnancy arithmetic.
//!
//! Everything here is pure date math over [`NaiveDate`]s that are already
//! expressed in the deployment timezone. With `L` = most recent cycle start,
//! `C` = cycle length:
//!
//! - next period: `L + C`
//! - ovulation: `L + C - 14`
//! - fertile window: `[ovulation - 5, ovulation + 1]`
//! - rhythm abstinence window: fertile window widened by 2 days on each side
//! - gestation week: `floor((today - conception) / 7) + 1`

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::preferences::NotificationPreferences;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const DEFAULT_CYCLE_LENGTH: i32 = 28;
pub const DEFAULT_PERIOD_LENGTH: i32 = 5;

pub const MIN_CYCLE_LENGTH: i32 = 21;
pub const MAX_CYCLE_LENGTH: i32 = 45;
pub const MIN_PERIOD_LENGTH: i32 = 1;
pub const MAX_PERIOD_LENGTH: i32 = 10;

/// Days between ovulation and the following period.
pub const LUTEAL_PHASE_DAYS: i64 = 14;

/// Fertile window starts this many days before ovulation.
pub const FERTILE_DAYS_BEFORE_OVULATION: i64 = 5;

/// Fertile window ends this many days after ovulation.
pub const FERTILE_DAYS_AFTER_OVULATION: i64 = 1;

/// Extra days added on each side of the fertile window for rhythm-method users.
pub const RHYTHM_MARGIN_DAYS: i64 = 2;

/// A period later than this many days past its prediction asks for confirmation.
pub const PERIOD_CONFIRMATION_GRACE_DAYS: i64 = 3;

/// Last gestation week for which prenatal rules are evaluated.
pub const MAX_GESTATION_WEEK: u32 = 42;

/// Estimated due date offset from conception (38 weeks).
pub const CONCEPTION_TO_DUE_DAYS: i64 = 266;

// ---------------------------------------------------------------------------
// DateWindow
// ---------------------------------------------------------------------------

/// An inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Number of days in the window (inclusive).
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    fn widen(&self, days: i64) -> Self {
        Self {
            start: self.start - Duration::days(days),
            end: self.end + Duration::days(days),
        }
    }
}

// ---------------------------------------------------------------------------
// CycleProfile
// ---------------------------------------------------------------------------

/// The cycle inputs needed for predictions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleProfile {
    /// Start date of the most recent logged cycle, if any.
    pub last_cycle_start: Option<NaiveDate>,
    pub cycle_length: i32,
    pub period_length: i32,
}

impl CycleProfile {
    /// Build a profile, clamping lengths into the supported physiological range.
    pub fn new(last_cycle_start: Option<NaiveDate>, cycle_length: i32, period_length: i32) -> Self {
        Self {
            last_cycle_start,
            cycle_length: cycle_length.clamp(MIN_CYCLE_LENGTH, MAX_CYCLE_LENGTH),
            period_length: period_length.clamp(MIN_PERIOD_LENGTH, MAX_PERIOD_LENGTH),
        }
    }

    /// Predictions for the current cycle; `None` when no cycle was ever logged.
    pub fn predictions(&self) -> Option<CyclePredictions> {
        let last_start = self.last_cycle_start?;
        let next_period = last_start + Duration::days(i64::from(self.cycle_length));
        let ovulation = next_period - Duration::days(LUTEAL_PHASE_DAYS);
        let fertile_window = DateWindow {
            start: ovulation - Duration::days(FERTILE_DAYS_BEFORE_OVULATION),
            end: ovulation + Duration::days(FERTILE_DAYS_AFTER_OVULATION),
        };
        Some(CyclePredictions {
            last_start,
            next_period,
            ovulation,
            fertile_window,
            rhythm_window: fertile_window.widen(RHYTHM_MARGIN_DAYS),
            period_length: self.period_length,
        })
    }
}

impl Default for CycleProfile {
    fn default() -> Self {
        Self::new(None, DEFAULT_CYCLE_LENGTH, DEFAULT_PERIOD_LENGTH)
    }
}

// ---------------------------------------------------------------------------
// CyclePredictions
// ---------------------------------------------------------------------------

/// Named phase of the menstrual cycle on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Menstrual,
    Follicular,
    Fertile,
    Ovulation,
    Luteal,
}

impl CyclePhase {
    pub fn name(self) -> &'static str {
        match self {
            Self::Menstrual => "menstrual",
            Self::Follicular => "follicular",
            Self::Fertile => "fertile",
            Self::Ovulation => "ovulation",
            Self::Luteal => "luteal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CyclePredictions {
    pub last_start: NaiveDate,
    pub next_period: NaiveDate,
    pub ovulation: NaiveDate,
    pub fertile_window: DateWindow,
    pub rhythm_window: DateWindow,
    pub period_length: i32,
}

impl CyclePredictions {
    /// 1-based day of the current cycle.
    pub fn cycle_day(&self, today: NaiveDate) -> i64 {
        (today - self.last_start).num_days() + 1
    }

    /// Days until the predicted next period (negative once it is late).
    pub fn days_until_next_period(&self, today: NaiveDate) -> i64 {
        (self.next_period - today).num_days()
    }

    /// First day the predicted period counts as late beyond the grace.
    pub fn overdue_from(&self) -> NaiveDate {
        self.next_period + Duration::days(PERIOD_CONFIRMATION_GRACE_DAYS + 1)
    }

    /// Whether the predicted period is late beyond the confirmation grace.
    pub fn is_period_overdue(&self, today: NaiveDate) -> bool {
        today >= self.overdue_from()
    }

    pub fn phase(&self, today: NaiveDate) -> CyclePhase {
        if today == self.ovulation {
            CyclePhase::Ovulation
        } else if self.cycle_day(today) <= i64::from(self.period_length) {
            CyclePhase::Menstrual
        } else if self.fertile_window.contains(today) {
            CyclePhase::Fertile
        } else if today < self.fertile_window.start {
            CyclePhase::Follicular
        } else {
            CyclePhase::Luteal
        }
    }
}

// ---------------------------------------------------------------------------
// Pregnancy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pregnancy {
    pub conception_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
}

impl Pregnancy {
    /// Current gestation week.
    ///
    /// Days before conception count as week 1. Returns `None` once the raw
    /// week passes [`MAX_GESTATION_WEEK`]: the pregnancy is past term and no
    /// prenatal rule fires.
    pub fn gestation_week(&self, today: NaiveDate) -> Option<u32> {
        let days = (today - self.conception_date).num_days();
        let raw = days.div_euclid(7) + 1;
        if raw > i64::from(MAX_GESTATION_WEEK) {
            return None;
        }
        Some(raw.max(1) as u32)
    }

    /// The recorded due date, or one estimated from the conception date.
    pub fn expected_due_date(&self) -> NaiveDate {
        self.due_date
            .unwrap_or_else(|| self.conception_date + Duration::days(CONCEPTION_TO_DUE_DAYS))
    }
}

// ---------------------------------------------------------------------------
// CycleState
// ---------------------------------------------------------------------------

/// Everything the evaluator needs to know about one subscriber.
#[derive(Debug, Clone, Default)]
pub struct CycleState {
    pub cycle: CycleProfile,
    pub pregnancy: Option<Pregnancy>,
    pub preferences: NotificationPreferences,
    /// Symptom codes logged in the last 24 hours.
    pub recent_symptoms: Vec<String>,
    pub last_gyn_checkup: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn no_cycle_log_means_no_predictions() {
        assert!(CycleProfile::default().predictions().is_none());
    }

    #[test]
    fn standard_cycle_predictions() {
        let p = CycleProfile::new(Some(date(2026, 1, 15)), 28, 5)
            .predictions()
            .unwrap();
        assert_eq!(p.next_period, date(2026, 2, 12));
        assert_eq!(p.ovulation, date(2026, 1, 29));
        assert_eq!(p.fertile_window.start, date(2026, 1, 24));
        assert_eq!(p.fertile_window.end, date(2026, 1, 30));
        assert_eq!(p.rhythm_window.start, date(2026, 1, 22));
        assert_eq!(p.rhythm_window.end, date(2026, 2, 1));
    }

    #[test]
    fn shortest_cycle_still_has_fertile_window() {
        let p = CycleProfile::new(Some(date(2026, 3, 1)), 21, 2)
            .predictions()
            .unwrap();
        assert_eq!(p.ovulation, date(2026, 3, 8));
        assert_eq!(p.fertile_window.len_days(), 7);
        assert!(p.fertile_window.start > p.last_start);
    }

    #[test]
    fn lengths_are_clamped() {
        let profile = CycleProfile::new(None, 10, 0);
        assert_eq!(profile.cycle_length, MIN_CYCLE_LENGTH);
        assert_eq!(profile.period_length, MIN_PERIOD_LENGTH);
        let profile = CycleProfile::new(None, 90, 30);
        assert_eq!(profile.cycle_length, MAX_CYCLE_LENGTH);
        assert_eq!(profile.period_length, MAX_PERIOD_LENGTH);
    }

    #[test]
    fn phases_follow_the_cycle() {
        let p = CycleProfile::new(Some(date(2026, 1, 15)), 28, 5)
            .predictions()
            .unwrap();
        assert_eq!(p.phase(date(2026, 1, 15)), CyclePhase::Menstrual);
        assert_eq!(p.phase(date(2026, 1, 19)), CyclePhase::Menstrual);
        assert_eq!(p.phase(date(2026, 1, 20)), CyclePhase::Follicular);
        assert_eq!(p.phase(date(2026, 1, 25)), CyclePhase::Fertile);
        assert_eq!(p.phase(date(2026, 1, 29)), CyclePhase::Ovulation);
        assert_eq!(p.phase(date(2026, 2, 5)), CyclePhase::Luteal);
        assert_eq!(p.cycle_day(date(2026, 1, 15)), 1);
    }

    #[test]
    fn period_overdue_only_after_grace() {
        let p = CycleProfile::new(Some(date(2026, 1, 15)), 28, 5)
            .predictions()
            .unwrap();
        assert!(!p.is_period_overdue(date(2026, 2, 15)));
        assert!(p.is_period_overdue(date(2026, 2, 16)));
        assert_eq!(p.overdue_from(), date(2026, 2, 16));
    }

    #[test]
    fn gestation_week_matches_scenario() {
        let pregnancy = Pregnancy {
            conception_date: date(2025, 12, 1),
            due_date: None,
        };
        assert_eq!(pregnancy.gestation_week(date(2026, 2, 16)), Some(12));
        assert_eq!(pregnancy.gestation_week(date(2025, 12, 1)), Some(1));
        assert_eq!(pregnancy.gestation_week(date(2025, 11, 20)), Some(1));
    }

    #[test]
    fn gestation_week_42_evaluates_but_43_does_not() {
        let conception = date(2025, 1, 1);
        let pregnancy = Pregnancy {
            conception_date: conception,
            due_date: None,
        };
        assert_eq!(pregnancy.gestation_week(conception + Duration::days(41 * 7)), Some(42));
        assert_eq!(pregnancy.gestation_week(conception + Duration::days(42 * 7)), None);
    }

    #[test]
    fn due_date_falls_back_to_estimate() {
        let pregnancy = Pregnancy {
            conception_date: date(2025, 12, 1),
            due_date: None,
        };
        assert_eq!(pregnancy.expected_due_date(), date(2026, 8, 24));
        let recorded = Pregnancy {
            due_date: Some(date(2026, 9, 1)),
            ..pregnancy
        };
        assert_eq!(recorded.expected_due_date(), date(2026, 9, 1));
    }
}
