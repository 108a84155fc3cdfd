//! Channel traits and message types.

use async_trait::async_trait;
use serde::Serialize;

use crate::email::EmailError;
use crate::push::PushError;

/// One browser push subscription.
#[derive(Debug, Clone)]
pub struct PushTarget {
    pub endpoint: String,
    /// Base64url-encoded uncompressed P-256 public key of the browser.
    pub p256dh: String,
    /// Base64url-encoded 16-byte authentication secret.
    pub auth: String,
}

/// JSON payload delivered to the service worker.
#[derive(Debug, Clone, Serialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub url: String,
}

/// A rendered email.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    /// Plain-text body; the HTML alternative is derived from it.
    pub body: String,
}

/// Sends one push message to one endpoint.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, target: &PushTarget, message: &PushMessage) -> Result<(), PushError>;
}

/// Sends one email.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError>;
}
