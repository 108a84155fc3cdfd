//! Long-lived loops driving the engine.
//!
//! Three tasks run until the cancellation token fires:
//!
//! - the daily evaluator pass, once per day at `DAILY_EVALUATOR_HOUR` local
//! - the fine pass, on wall-clock multiples of `FINE_TICK_MINUTES`
//! - the delivery loop, which drains the queue while there is work and backs
//!   off exponentially while it is empty
//!
//! A pass that is still running when its next slot arrives is not stacked:
//! the fine ticker skips missed ticks and the daily loop computes its next
//! slot only after the pass returns. A worker started after today's daily
//! slot runs that day's pass immediately.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::EngineError;
use crate::evaluator::{Evaluator, PassSummary};

/// Shortest sleep of the delivery loop when the queue is empty.
const IDLE_BACKOFF_MIN: Duration = Duration::from_secs(1);

/// Longest sleep of the delivery loop when the queue is empty.
const IDLE_BACKOFF_MAX: Duration = Duration::from_secs(30);

/// How often abandoned `sending` claims are swept back to `pending`.
const STALE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Time arithmetic
// ---------------------------------------------------------------------------

/// Instant of the daily slot on local `date`.
///
/// When a DST transition skips the hour the slot moves one hour later; when
/// the hour repeats the first one is used.
fn daily_slot_on(date: NaiveDate, tz: Tz, hour: u32) -> Option<DateTime<Utc>> {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let local = date.and_time(at);
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(local + chrono::Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Next instant strictly after `now` at which the daily pass should run.
///
/// `hour` is local to `tz`.
pub fn next_daily_run(now: DateTime<Utc>, tz: Tz, hour: u32) -> DateTime<Utc> {
    let mut date = now.with_timezone(&tz).date_naive();

    for _ in 0..3 {
        if let Some(candidate) = daily_slot_on(date, tz, hour) {
            if candidate > now {
                return candidate;
            }
        }
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }

    now + chrono::Duration::days(1)
}

/// Whether today's daily slot in `tz` is already behind `now`.
pub fn daily_slot_passed(now: DateTime<Utc>, tz: Tz, hour: u32) -> bool {
    let today = now.with_timezone(&tz).date_naive();
    daily_slot_on(today, tz, hour).is_some_and(|slot| slot <= now)
}

/// Next instant strictly after `now` that is a whole multiple of `period`
/// since the Unix epoch.
pub fn next_aligned_tick(now: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    let period_secs = period.as_secs().max(1) as i64;
    let next = (now.timestamp().div_euclid(period_secs) + 1) * period_secs;
    DateTime::from_timestamp(next, 0).unwrap_or(now + chrono::Duration::seconds(period_secs))
}

/// Tokio instant corresponding to a wall-clock instant (now if it has passed).
fn instant_at(at: DateTime<Utc>) -> Instant {
    let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    Instant::now() + delay
}

// ---------------------------------------------------------------------------
// Loops
// ---------------------------------------------------------------------------

/// Run today's daily pass when the worker starts after today's slot.
///
/// Returns `None` when the slot is still ahead. The pass is idempotent, so
/// repeating a pass that already ran today enqueues nothing.
pub async fn catch_up_daily(
    evaluator: &Evaluator,
    tz: Tz,
    hour: u32,
    now: DateTime<Utc>,
) -> Result<Option<PassSummary>, EngineError> {
    if !daily_slot_passed(now, tz, hour) {
        return Ok(None);
    }
    tracing::info!(timezone = %tz, hour, "Daily slot already passed, catching up");
    evaluator.run_daily_pass(now).await.map(Some)
}

/// Run the daily evaluator pass once per local day until `cancel` fires.
pub async fn run_daily(evaluator: Arc<Evaluator>, tz: Tz, hour: u32, cancel: CancellationToken) {
    tracing::info!(timezone = %tz, hour, "Daily evaluator started");

    tokio::select! {
        _ = cancel.cancelled() => {
            tracing::info!("Daily evaluator stopping");
            return;
        }
        result = catch_up_daily(&evaluator, tz, hour, Utc::now()) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Daily catch-up pass failed");
            }
        }
    }

    loop {
        let next = next_daily_run(Utc::now(), tz, hour);
        tracing::debug!(next_run = %next, "Daily evaluator sleeping");

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Daily evaluator stopping");
                break;
            }
            _ = tokio::time::sleep_until(instant_at(next)) => {
                if let Err(e) = evaluator.run_daily_pass(Utc::now()).await {
                    tracing::error!(error = %e, "Daily evaluator pass failed");
                }
            }
        }
    }
}

/// Run the fine pass on every aligned `period` boundary until `cancel` fires.
pub async fn run_fine(evaluator: Arc<Evaluator>, period: Duration, cancel: CancellationToken) {
    let first = next_aligned_tick(Utc::now(), period);
    let mut ticker = tokio::time::interval_at(instant_at(first), period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        period_secs = period.as_secs(),
        first_tick = %first,
        "Fine evaluator started",
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Fine evaluator stopping");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = evaluator.run_fine_pass(Utc::now()).await {
                    tracing::error!(error = %e, "Fine evaluator pass failed");
                }
            }
        }
    }
}

/// Drain the pending queue until `cancel` fires.
///
/// A row already claimed is always finished before the loop exits, so
/// shutdown never leaves a row in `sending`.
pub async fn run_delivery(
    dispatcher: Arc<Dispatcher>,
    stale_claim_secs: i64,
    cancel: CancellationToken,
) {
    tracing::info!(stale_claim_secs, "Delivery worker started");

    if let Err(e) = dispatcher.release_stale(stale_claim_secs).await {
        tracing::error!(error = %e, "Initial stale claim sweep failed");
    }
    let mut last_sweep = Instant::now();
    let mut idle = IDLE_BACKOFF_MIN;

    while !cancel.is_cancelled() {
        if last_sweep.elapsed() >= STALE_SWEEP_INTERVAL {
            if let Err(e) = dispatcher.release_stale(stale_claim_secs).await {
                tracing::error!(error = %e, "Stale claim sweep failed");
            }
            last_sweep = Instant::now();
        }

        let wait = match dispatcher.dispatch_next().await {
            Ok(DispatchOutcome::Idle) => {
                let wait = idle;
                idle = (idle * 2).min(IDLE_BACKOFF_MAX);
                wait
            }
            Ok(_) => {
                idle = IDLE_BACKOFF_MIN;
                continue;
            }
            Err(e) => {
                tracing::error!(error = %e, "Dispatch cycle failed");
                IDLE_BACKOFF_MAX
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    tracing::info!("Delivery worker stopping");
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Owns the engine components and spawns the loops.
pub struct Scheduler {
    evaluator: Arc<Evaluator>,
    dispatcher: Arc<Dispatcher>,
    config: WorkerConfig,
}

impl Scheduler {
    pub fn new(evaluator: Evaluator, dispatcher: Dispatcher, config: WorkerConfig) -> Self {
        Self {
            evaluator: Arc::new(evaluator),
            dispatcher: Arc::new(dispatcher),
            config,
        }
    }

    /// Spawn the daily, fine and delivery loops.
    pub fn spawn(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(run_daily(
                Arc::clone(&self.evaluator),
                self.config.timezone,
                self.config.daily_hour,
                cancel.clone(),
            )),
            tokio::spawn(run_fine(
                Arc::clone(&self.evaluator),
                self.config.fine_tick,
                cancel.clone(),
            )),
            tokio::spawn(run_delivery(
                Arc::clone(&self.dispatcher),
                self.config.stale_claim_secs,
                cancel.clone(),
            )),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn daily_run_later_today() {
        let caracas: Tz = "America/Caracas".parse().unwrap();
        // 07:00 in Caracas (UTC-4).
        let next = next_daily_run(utc(2026, 2, 15, 11, 0), caracas, 8);
        assert_eq!(next, utc(2026, 2, 15, 12, 0));
    }

    #[test]
    fn daily_run_tomorrow_once_hour_has_passed() {
        let caracas: Tz = "America/Caracas".parse().unwrap();
        let next = next_daily_run(utc(2026, 2, 15, 12, 31), caracas, 8);
        assert_eq!(next, utc(2026, 2, 16, 12, 0));
    }

    #[test]
    fn daily_run_is_strictly_after_now() {
        let next = next_daily_run(utc(2026, 2, 15, 8, 0), Tz::UTC, 8);
        assert_eq!(next, utc(2026, 2, 16, 8, 0));
    }

    #[test]
    fn daily_run_shifts_past_spring_forward_gap() {
        let ny: Tz = "America/New_York".parse().unwrap();
        // 2026-03-08 02:00 local does not exist; 03:00 EDT is 07:00 UTC.
        let next = next_daily_run(utc(2026, 3, 8, 5, 0), ny, 2);
        assert_eq!(next, utc(2026, 3, 8, 7, 0));
    }

    #[test]
    fn daily_run_uses_first_of_repeated_hour() {
        let ny: Tz = "America/New_York".parse().unwrap();
        // 2026-11-01 01:00 happens twice; the EDT one is 05:00 UTC.
        let next = next_daily_run(utc(2026, 11, 1, 0, 0), ny, 1);
        assert_eq!(next, utc(2026, 11, 1, 5, 0));
    }

    #[test]
    fn slot_passed_after_local_hour() {
        let caracas: Tz = "America/Caracas".parse().unwrap();
        // 07:59 and 08:00 in Caracas.
        assert!(!daily_slot_passed(utc(2026, 2, 15, 11, 59), caracas, 8));
        assert!(daily_slot_passed(utc(2026, 2, 15, 12, 0), caracas, 8));
        assert!(daily_slot_passed(utc(2026, 2, 15, 13, 0), caracas, 8));
    }

    #[test]
    fn slot_passed_uses_local_date() {
        let caracas: Tz = "America/Caracas".parse().unwrap();
        // 02:00 UTC on the 16th is 22:00 on the 15th in Caracas.
        assert!(daily_slot_passed(utc(2026, 2, 16, 2, 0), caracas, 8));
        // 05:00 UTC on the 16th is 01:00 local, before the new day's slot.
        assert!(!daily_slot_passed(utc(2026, 2, 16, 5, 0), caracas, 8));
    }

    #[test]
    fn aligned_tick_rounds_up() {
        let now = utc(2026, 2, 15, 12, 31) + chrono::Duration::seconds(10);
        let next = next_aligned_tick(now, Duration::from_secs(300));
        assert_eq!(next, utc(2026, 2, 15, 12, 35));
    }

    #[test]
    fn aligned_tick_on_boundary_moves_to_next() {
        let next = next_aligned_tick(utc(2026, 2, 15, 12, 35), Duration::from_secs(300));
        assert_eq!(next, utc(2026, 2, 15, 12, 40));
    }

    #[test]
    fn aligned_tick_crosses_midnight() {
        let next = next_aligned_tick(utc(2026, 2, 15, 23, 58), Duration::from_secs(300));
        assert_eq!(next, utc(2026, 2, 16, 0, 0));
    }
}
