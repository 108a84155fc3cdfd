//! Delivery channel names and the per-rule channel preference.
//!
//! The string constants must match the values stored in
//! `notification_rules.channel`, `pending_notifications.channel` and
//! `notification_logs.channel_used`.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Web push delivered to every registered browser endpoint of a subscriber.
pub const CHANNEL_PUSH: &str = "push";

/// Email delivered via SMTP.
pub const CHANNEL_EMAIL: &str = "email";

/// Push first, falling back to email within the same delivery attempt.
pub const CHANNEL_DUAL: &str = "dual";

/// Which channel(s) a rule wants its notifications delivered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelPreference {
    Email,
    Push,
    Dual,
}

impl ChannelPreference {
    /// The database / wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => CHANNEL_EMAIL,
            Self::Push => CHANNEL_PUSH,
            Self::Dual => CHANNEL_DUAL,
        }
    }

    /// Parse a stored channel value.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            CHANNEL_EMAIL => Ok(Self::Email),
            CHANNEL_PUSH => Ok(Self::Push),
            CHANNEL_DUAL => Ok(Self::Dual),
            other => Err(CoreError::Validation(format!(
                "Unknown channel '{other}' (expected email, push or dual)"
            ))),
        }
    }

    /// Whether push should be attempted at all.
    pub fn includes_push(self) -> bool {
        matches!(self, Self::Push | Self::Dual)
    }

    /// Whether email may be used, either directly or as a fallback.
    pub fn includes_email(self) -> bool {
        matches!(self, Self::Email | Self::Dual)
    }
}

impl std::fmt::Display for ChannelPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
