//! Worker configuration loaded from environment variables.

use std::time::Duration;

use chrono_tz::Tz;

/// Default hour (local) of the daily evaluator pass.
const DEFAULT_DAILY_HOUR: u32 = 8;

/// Default fine-pass period in minutes.
const DEFAULT_FINE_TICK_MINUTES: u64 = 5;

/// Rows in `sending` longer than this are returned to `pending`.
const DEFAULT_STALE_CLAIM_SECS: i64 = 600;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Scheduler and dispatcher settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Deployment timezone; every calendar comparison happens in it.
    pub timezone: Tz,
    /// Local hour (0-23) of the daily pass.
    pub daily_hour: u32,
    /// Period of the fine (contraceptive) pass.
    pub fine_tick: Duration,
    /// `url` field of every push payload.
    pub push_click_url: String,
    pub stale_claim_secs: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            daily_hour: DEFAULT_DAILY_HOUR,
            fine_tick: Duration::from_secs(DEFAULT_FINE_TICK_MINUTES * 60),
            push_click_url: "/".to_string(),
            stale_claim_secs: DEFAULT_STALE_CLAIM_SECS,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default |
    /// |------------------------|---------|
    /// | `SCHEDULER_TIMEZONE`   | `UTC`   |
    /// | `DAILY_EVALUATOR_HOUR` | `8`     |
    /// | `FINE_TICK_MINUTES`    | `5`     |
    /// | `PUSH_CLICK_URL`       | `/`     |
    /// | `STALE_CLAIM_SECS`     | `600`   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup("SCHEDULER_TIMEZONE") {
            config.timezone = value.trim().parse().map_err(|e| ConfigError::Invalid {
                var: "SCHEDULER_TIMEZONE",
                value: value.clone(),
                reason: format!("{e}"),
            })?;
        }

        if let Some(value) = lookup("DAILY_EVALUATOR_HOUR") {
            config.daily_hour = match value.trim().parse::<u32>() {
                Ok(hour) if hour < 24 => hour,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "DAILY_EVALUATOR_HOUR",
                        value,
                        reason: "expected an hour between 0 and 23".to_string(),
                    })
                }
            };
        }

        if let Some(value) = lookup("FINE_TICK_MINUTES") {
            let minutes = match value.trim().parse::<u64>() {
                Ok(m) if (1..=60).contains(&m) => m,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "FINE_TICK_MINUTES",
                        value,
                        reason: "expected minutes between 1 and 60".to_string(),
                    })
                }
            };
            config.fine_tick = Duration::from_secs(minutes * 60);
        }

        if let Some(value) = lookup("PUSH_CLICK_URL").filter(|v| !v.trim().is_empty()) {
            config.push_click_url = value;
        }

        if let Some(value) = lookup("STALE_CLAIM_SECS") {
            config.stale_claim_secs = match value.trim().parse::<i64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "STALE_CLAIM_SECS",
                        value,
                        reason: "expected a positive number of seconds".to_string(),
                    })
                }
            };
        }

        Ok(config)
    }
}
