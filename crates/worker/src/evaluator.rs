//! Rule evaluation passes.
//!
//! The daily pass walks every active rule of every active tenant against
//! every active subscriber and enqueues what is due today. The fine pass
//! only handles the contraceptive reminder, whose due time has minute
//! resolution. Both passes take a per-(pass, tenant) advisory lock so
//! overlapping runs, in this process or another, skip the tenant instead of
//! racing on it.
//!
//! Nothing here sends anything: due notifications are rendered and written to
//! `pending_notifications`, which the [`Dispatcher`](crate::dispatcher::Dispatcher)
//! drains.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use clinica_core::channels::ChannelPreference;
use clinica_core::cycle::CycleState;
use clinica_core::error::CoreError;
use clinica_core::evaluation::{check_daily, template_context, Cursor, DueCheck};
use clinica_core::preferences::{ContraceptiveFrequency, WEEKLY_REMINDER_DAYS};
use clinica_core::rules::TriggerCondition;
use clinica_core::template::{render, validate_template};
use clinica_core::types::DbId;
use clinica_db::models::pending::NewPendingNotification;
use clinica_db::models::rule::NotificationRule;
use clinica_db::models::subscriber::PatientSubscriber;
use clinica_db::models::tenant::Tenant;
use clinica_db::repositories::{
    AdvisoryLock, CycleRepo, PendingNotificationRepo, RuleRepo, SubscriberRepo, TenantRepo,
};
use serde_json::Value;
use sqlx::PgPool;

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Custom triggers
// ---------------------------------------------------------------------------

/// Decides whether a `custom` rule fires for one subscriber.
///
/// Handlers are looked up by the `handler` key of the rule's trigger. A rule
/// naming an unregistered handler is skipped and flagged on the rule.
pub trait CustomTrigger: Send + Sync {
    fn is_due(&self, params: &Value, today: NaiveDate, state: &CycleState) -> bool;
}

impl<F> CustomTrigger for F
where
    F: Fn(&Value, NaiveDate, &CycleState) -> bool + Send + Sync,
{
    fn is_due(&self, params: &Value, today: NaiveDate, state: &CycleState) -> bool {
        self(params, today, state)
    }
}

/// Registered [`CustomTrigger`] handlers by name.
#[derive(Clone, Default)]
pub struct CustomTriggers {
    handlers: HashMap<String, Arc<dyn CustomTrigger>>,
}

impl CustomTriggers {
    pub fn register(&mut self, name: impl Into<String>, handler: impl CustomTrigger + 'static) {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CustomTrigger>> {
        self.handlers.get(name).cloned()
    }
}

impl fmt::Debug for CustomTriggers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

// ---------------------------------------------------------------------------
// Pass bookkeeping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Daily,
    Fine,
}

impl PassKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Fine => "fine",
        }
    }
}

/// Advisory lock key serializing one pass kind for one tenant.
pub fn lock_key(kind: PassKind, tenant_id: DbId) -> String {
    format!("evaluator:{}:{tenant_id}", kind.as_str())
}

/// What one pass did across all tenants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub tenants_evaluated: usize,
    /// Another pass held the tenant's lock.
    pub tenants_skipped: usize,
    /// Aborted by an infrastructure error.
    pub tenants_failed: usize,
    pub enqueued: u64,
}

/// Value the cursor must be strictly older than for the reminder to go out.
pub fn cursor_guard(cursor: Cursor, today: NaiveDate, state: &CycleState) -> NaiveDate {
    match cursor {
        Cursor::PeriodReminder => state
            .cycle
            .predictions()
            .map_or(today, |p| p.overdue_from()),
        Cursor::CheckupReminder => state.last_gyn_checkup.unwrap_or(today),
        Cursor::Contraceptive => match state.preferences.contraceptive_frequency {
            ContraceptiveFrequency::Daily => today,
            ContraceptiveFrequency::Weekly => today - Duration::days(WEEKLY_REMINDER_DAYS - 1),
        },
    }
}

/// A stored rule whose trigger, channel and templates all check out.
struct PreparedRule<'a> {
    row: &'a NotificationRule,
    trigger: TriggerCondition,
    channel: ChannelPreference,
}

impl<'a> PreparedRule<'a> {
    fn new(row: &'a NotificationRule) -> Result<Self, CoreError> {
        let trigger = row.trigger()?;
        let channel = row.channel_preference()?;
        validate_template(&row.message_template)?;
        validate_template(&row.name)?;
        Ok(Self {
            row,
            trigger,
            channel,
        })
    }

    fn render(
        &self,
        tenant: &Tenant,
        subscriber: &PatientSubscriber,
        state: &CycleState,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> NewPendingNotification {
        let ctx = template_context(today, &subscriber.display_name, &tenant.name, state);
        NewPendingNotification {
            notification_rule_id: self.row.id,
            recipient_id: subscriber.id,
            subject: render(&self.row.name, &ctx),
            body: render(&self.row.message_template, &ctx),
            scheduled_for: now,
            scheduled_date: today,
            channel: self.channel.as_str().to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Runs evaluation passes against the database.
pub struct Evaluator {
    pool: PgPool,
    timezone: Tz,
    custom: CustomTriggers,
}

impl Evaluator {
    pub fn new(pool: PgPool, timezone: Tz) -> Self {
        Self {
            pool,
            timezone,
            custom: CustomTriggers::default(),
        }
    }

    pub fn with_custom_triggers(mut self, custom: CustomTriggers) -> Self {
        self.custom = custom;
        self
    }

    /// Deployment-local calendar date of `now`.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }

    /// First instant of `date` in the deployment zone. Zones that skip
    /// midnight on a DST change start the day an hour later.
    pub fn start_of_local_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let midnight = date.and_time(NaiveTime::MIN);
        self.timezone
            .from_local_datetime(&midnight)
            .earliest()
            .or_else(|| {
                self.timezone
                    .from_local_datetime(&(midnight + Duration::hours(1)))
                    .earliest()
            })
            .map_or_else(|| midnight.and_utc(), |dt| dt.with_timezone(&Utc))
    }

    pub async fn run_daily_pass(&self, now: DateTime<Utc>) -> Result<PassSummary, EngineError> {
        self.run_pass(PassKind::Daily, now).await
    }

    pub async fn run_fine_pass(&self, now: DateTime<Utc>) -> Result<PassSummary, EngineError> {
        self.run_pass(PassKind::Fine, now).await
    }

    async fn run_pass(&self, kind: PassKind, now: DateTime<Utc>) -> Result<PassSummary, EngineError> {
        let tenants = TenantRepo::list_active(&self.pool).await?;
        let mut summary = PassSummary::default();

        for tenant in &tenants {
            let key = lock_key(kind, tenant.id);
            let Some(lock) = AdvisoryLock::try_acquire(&self.pool, &key).await? else {
                tracing::debug!(tenant_id = tenant.id, pass = kind.as_str(), "Tenant locked, skipping");
                summary.tenants_skipped += 1;
                continue;
            };

            let result = match kind {
                PassKind::Daily => self.daily_for_tenant(tenant, now).await,
                PassKind::Fine => self.fine_for_tenant(tenant, now).await,
            };

            if let Err(e) = lock.release().await {
                tracing::warn!(key = %key, error = %e, "Failed to release evaluator lock");
            }

            match result {
                Ok(enqueued) => {
                    summary.tenants_evaluated += 1;
                    summary.enqueued += enqueued;
                }
                Err(e) => {
                    summary.tenants_failed += 1;
                    tracing::error!(
                        tenant_id = tenant.id,
                        pass = kind.as_str(),
                        error = %e,
                        "Evaluator pass aborted for tenant",
                    );
                }
            }
        }

        tracing::info!(
            pass = kind.as_str(),
            evaluated = summary.tenants_evaluated,
            skipped = summary.tenants_skipped,
            failed = summary.tenants_failed,
            enqueued = summary.enqueued,
            "Evaluator pass finished",
        );
        Ok(summary)
    }

    /// Daily pass for one tenant. Returns the number of rows enqueued.
    pub async fn daily_for_tenant(
        &self,
        tenant: &Tenant,
        now: DateTime<Utc>,
    ) -> Result<u64, EngineError> {
        let today = self.local_date(now);
        let rules = RuleRepo::list_active_rules(&self.pool, tenant.id).await?;
        if rules.is_empty() {
            return Ok(0);
        }

        let subscribers = SubscriberRepo::list_active_subscribers(&self.pool, tenant.id).await?;
        let mut states = Vec::with_capacity(subscribers.len());
        for subscriber in subscribers {
            let state = CycleRepo::get_cycle_state(&self.pool, subscriber.id, now).await?;
            states.push((subscriber, state));
        }

        let mut total = 0u64;
        for row in &rules {
            let rule = match PreparedRule::new(row) {
                Ok(rule) => rule,
                Err(e) => {
                    self.flag_rule(row, &e.to_string()).await?;
                    continue;
                }
            };
            if rule.trigger.is_fine_pass() {
                continue;
            }

            let custom = match &rule.trigger {
                TriggerCondition::Custom { handler, .. } => match self.custom.get(handler) {
                    Some(h) => Some(h),
                    None => {
                        let msg = format!("No handler registered for custom trigger '{handler}'");
                        self.flag_rule(row, &msg).await?;
                        continue;
                    }
                },
                _ => None,
            };

            let mut sent = 0i32;
            for (subscriber, state) in &states {
                let check = match check_daily(&rule.trigger, today, state) {
                    DueCheck::DelegateCustom => match (&custom, &rule.trigger) {
                        (Some(handler), TriggerCondition::Custom { params, .. })
                            if handler.is_due(params, today, state) =>
                        {
                            DueCheck::Due
                        }
                        _ => DueCheck::NotDue,
                    },
                    other => other,
                };
                if check.is_not_due() {
                    continue;
                }

                let notification = rule.render(tenant, subscriber, state, today, now);
                if self.enqueue_checked(check, &notification, state, today).await? {
                    sent += 1;
                }
            }

            RuleRepo::record_evaluation(&self.pool, row.id, sent).await?;
            if sent > 0 {
                tracing::info!(tenant_id = tenant.id, rule_id = row.id, sent, "Rule enqueued notifications");
            }
            total += sent as u64;
        }

        Ok(total)
    }

    /// Fine pass for one tenant: contraceptive reminders due at this minute.
    pub async fn fine_for_tenant(
        &self,
        tenant: &Tenant,
        now: DateTime<Utc>,
    ) -> Result<u64, EngineError> {
        let local_now = now.with_timezone(&self.timezone).naive_local();
        let today = local_now.date();

        let rules = RuleRepo::list_active_rules(&self.pool, tenant.id).await?;
        let Some(row) = rules
            .iter()
            .find(|r| matches!(r.trigger(), Ok(TriggerCondition::ContraceptiveReminder)))
        else {
            return Ok(0);
        };
        let rule = match PreparedRule::new(row) {
            Ok(rule) => rule,
            Err(e) => {
                self.flag_rule(row, &e.to_string()).await?;
                return Ok(0);
            }
        };

        let settings = CycleRepo::list_contraceptive_settings(&self.pool, tenant.id).await?;
        let mut sent = 0i32;
        for setting in &settings {
            let prefs = setting.to_preferences();
            if prefs.contraceptive_time.is_none() {
                tracing::warn!(
                    subscriber_id = setting.subscriber_id,
                    value = ?setting.contraceptive_time,
                    "Unparseable contraceptive time, skipping",
                );
                continue;
            }
            if !prefs.contraceptive_due(local_now) {
                continue;
            }
            let Some(subscriber) = SubscriberRepo::find_by_id(&self.pool, setting.subscriber_id).await?
            else {
                continue;
            };

            let state = CycleRepo::get_cycle_state(&self.pool, subscriber.id, now).await?;
            let notification = rule.render(tenant, &subscriber, &state, today, now);
            let guard = cursor_guard(Cursor::Contraceptive, today, &state);
            if self
                .enqueue_with_cursor(Cursor::Contraceptive, &notification, today, guard)
                .await?
            {
                sent += 1;
            }
        }

        // Most ticks send nothing; those leave the stats alone unless an old
        // error needs clearing.
        if sent > 0 || row.last_error.is_some() {
            RuleRepo::record_evaluation(&self.pool, row.id, sent).await?;
        }
        if sent > 0 {
            tracing::info!(tenant_id = tenant.id, rule_id = row.id, sent, "Contraceptive reminders enqueued");
        }
        Ok(sent as u64)
    }

    // -----------------------------------------------------------------------
    // Enqueue paths
    // -----------------------------------------------------------------------

    /// Enqueue `notification` under the guard `check` carries.
    async fn enqueue_checked(
        &self,
        check: DueCheck,
        notification: &NewPendingNotification,
        state: &CycleState,
        today: NaiveDate,
    ) -> Result<bool, EngineError> {
        match check {
            DueCheck::NotDue | DueCheck::DelegateCustom => Ok(false),
            DueCheck::Due => Ok(PendingNotificationRepo::enqueue(&self.pool, notification)
                .await?
                .is_some()),
            DueCheck::DueOnce { since } => {
                let already = PendingNotificationRepo::exists_since(
                    &self.pool,
                    notification.notification_rule_id,
                    notification.recipient_id,
                    self.start_of_local_day(since),
                )
                .await?;
                if already {
                    return Ok(false);
                }
                Ok(PendingNotificationRepo::enqueue(&self.pool, notification)
                    .await?
                    .is_some())
            }
            DueCheck::DueWithCursor(cursor) => {
                let guard = cursor_guard(cursor, today, state);
                self.enqueue_with_cursor(cursor, notification, today, guard)
                    .await
            }
        }
    }

    /// Advance `cursor` and enqueue in one transaction; neither happens
    /// unless both do.
    async fn enqueue_with_cursor(
        &self,
        cursor: Cursor,
        notification: &NewPendingNotification,
        today: NaiveDate,
        older_than: NaiveDate,
    ) -> Result<bool, EngineError> {
        let mut tx = self.pool.begin().await?;

        let advanced = CycleRepo::advance_cursor(
            &mut *tx,
            notification.recipient_id,
            cursor,
            today,
            older_than,
        )
        .await?;
        if !advanced {
            tx.rollback().await?;
            return Ok(false);
        }

        let id = PendingNotificationRepo::enqueue(&mut *tx, notification).await?;
        if id.is_none() {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn flag_rule(&self, row: &NotificationRule, error: &str) -> Result<(), EngineError> {
        tracing::warn!(rule_id = row.id, tenant_id = row.tenant_id, error, "Skipping rule");
        RuleRepo::record_failure(&self.pool, row.id, error).await?;
        Ok(())
    }
}
