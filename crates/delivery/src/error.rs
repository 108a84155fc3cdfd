//! Channel-agnostic delivery failure.

use crate::email::EmailError;
use crate::push::PushError;

/// Why a delivery attempt did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("push: {0}")]
    Push(#[from] PushError),

    #[error("email: {0}")]
    Email(#[from] EmailError),

    /// Push-only rule and the recipient has no registered endpoints.
    #[error("no push endpoints registered")]
    NoPushEndpoints,

    /// Push channel requested but no VAPID identity is configured.
    #[error("push delivery is not configured")]
    PushNotConfigured,

    /// Email channel requested but no SMTP transport is configured.
    #[error("email delivery is not configured")]
    EmailNotConfigured,
}

impl DeliveryError {
    /// Whether retrying cannot change the outcome.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Push(e) => e.is_permanent(),
            Self::Email(e) => e.is_permanent(),
            Self::NoPushEndpoints => true,
            Self::PushNotConfigured | Self::EmailNotConfigured => false,
        }
    }
}
