//! Built-in rule catalogue seeded when a tenant enables the cycle predictor.
//!
//! `upsert_default_rules` inserts one rule per entry and refreshes entries the
//! tenant has not edited. Every template here must pass
//! [`validate_template`](crate::template::validate_template).

use chrono::Weekday;

use crate::channels::ChannelPreference;
use crate::rules::{NotificationType, TriggerCondition};

/// Gestation weeks that get a one-off milestone message.
pub const MILESTONE_WEEKS: [u32; 5] = [12, 20, 28, 36, 40];

/// Default interval between gynecological check-ups.
pub const CHECKUP_INTERVAL_DAYS: u32 = 365;

/// Symptom codes that trigger the default symptom alert.
pub const ALERT_SYMPTOM_CODES: [&str; 2] = ["severe_pain", "heavy_bleeding"];

/// A rule the engine ships with.
#[derive(Debug, Clone)]
pub struct DefaultRule {
    pub name: String,
    pub notification_type: NotificationType,
    pub trigger: TriggerCondition,
    pub channel: ChannelPreference,
    pub template: String,
}

impl DefaultRule {
    fn new(
        name: &str,
        trigger: TriggerCondition,
        channel: ChannelPreference,
        template: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            notification_type: trigger.notification_type(),
            trigger,
            channel,
            template: template.to_string(),
        }
    }
}

/// The full default catalogue, in seeding order.
pub fn default_rules() -> Vec<DefaultRule> {
    use ChannelPreference::{Dual, Email, Push};

    let mut rules = vec![
        DefaultRule::new(
            "Your period is coming soon",
            TriggerCondition::DaysBeforePeriod(2),
            Dual,
            "Hi {patient_name}, your next period is expected in {days_until} days. \
             Keep your supplies handy.",
        ),
        DefaultRule::new(
            "Ovulation day",
            TriggerCondition::OnOvulation,
            Push,
            "Hi {patient_name}, today ({date}) is your predicted ovulation day.",
        ),
        DefaultRule::new(
            "Fertile window",
            TriggerCondition::InFertileWindow,
            Push,
            "{patient_name}, you are in your fertile window (cycle day {cycle_day}).",
        ),
        DefaultRule::new(
            "Rhythm method: abstinence day",
            TriggerCondition::RhythmAbstinence,
            Push,
            "{patient_name}, today is inside your rhythm-method abstinence window.",
        ),
        DefaultRule::new(
            "Did your period start?",
            TriggerCondition::PeriodConfirmation,
            Dual,
            "Hi {patient_name}, your period seems to be late (cycle day {cycle_day}). \
             Please confirm in the app whether it has started.",
        ),
        DefaultRule::new(
            "Contraceptive reminder",
            TriggerCondition::ContraceptiveReminder,
            Push,
            "{patient_name}, it is time to take your contraceptive.",
        ),
        DefaultRule::new(
            "Time for your check-up",
            TriggerCondition::CheckupReminder {
                days: CHECKUP_INTERVAL_DAYS,
            },
            Email,
            "Hi {patient_name}, it has been a year since your last gynecological check-up. \
             Book an appointment with {tenant_name}.",
        ),
        DefaultRule::new(
            "Your pregnancy this week",
            TriggerCondition::Weekday(Weekday::Mon),
            Dual,
            "Hi {patient_name}, you are in week {week_number} of your pregnancy. \
             Expected due date: {due_date}.",
        ),
        DefaultRule::new(
            "Symptom alert",
            TriggerCondition::SymptomCodes(
                ALERT_SYMPTOM_CODES.iter().map(|c| c.to_string()).collect(),
            ),
            Email,
            "{patient_name}, you reported a symptom that needs attention. \
             Please contact {tenant_name}.",
        ),
    ];

    rules.extend(MILESTONE_WEEKS.iter().map(|&week| {
        DefaultRule::new(
            &format!("Week {week} milestone"),
            TriggerCondition::GestationWeek(week),
            Dual,
            "Congratulations {patient_name}! You have reached week {week_number}.",
        )
    }));

    rules
}
