//! Retry policy for transient delivery failures.
//!
//! Delays grow exponentially from [`BASE_DELAY_SECS`] (60 s, 120 s, 240 s, ...)
//! with ±[`JITTER_RATIO`] random jitter, and never exceed [`MAX_DELAY_SECS`].
//! A row that has failed [`MAX_RETRIES`] times is dead-lettered.

use std::time::Duration;

use rand::Rng;

/// Failed attempts after which a pending notification becomes `dead`.
pub const MAX_RETRIES: i32 = 5;

/// Delay before the first retry.
pub const BASE_DELAY_SECS: u64 = 60;

/// Upper bound for any single retry delay (1 hour).
pub const MAX_DELAY_SECS: u64 = 3_600;

/// Fraction of the delay that is randomised in either direction.
pub const JITTER_RATIO: f64 = 0.2;

/// Whether a row with `retry_count` failures must stop retrying.
pub fn is_exhausted(retry_count: i32) -> bool {
    retry_count >= MAX_RETRIES
}

/// Un-jittered delay after the `retry_count`-th failure (1-based).
pub fn base_delay(retry_count: i32) -> Duration {
    let exponent = retry_count.saturating_sub(1).clamp(0, 16) as u32;
    let secs = BASE_DELAY_SECS
        .saturating_mul(2u64.saturating_pow(exponent))
        .min(MAX_DELAY_SECS);
    Duration::from_secs(secs)
}

/// Jittered delay using the supplied random source. Always capped at
/// [`MAX_DELAY_SECS`].
pub fn backoff_with<R: Rng + ?Sized>(retry_count: i32, rng: &mut R) -> Duration {
    let base = base_delay(retry_count).as_secs_f64();
    let factor = 1.0 + rng.random_range(-JITTER_RATIO..=JITTER_RATIO);
    let secs = (base * factor).clamp(1.0, MAX_DELAY_SECS as f64);
    Duration::from_secs_f64(secs)
}

/// Jittered delay using the thread-local random source.
pub fn backoff(retry_count: i32) -> Duration {
    backoff_with(retry_count, &mut rand::rng())
}
