//! Web Push delivery.
//!
//! [`WebPushSender`] encrypts a JSON [`PushMessage`] for one subscription,
//! signs the request with the deployment's VAPID key and POSTs it to the
//! push service. The response status decides the outcome (see
//! [`classify_status`]).

pub mod encryption;
pub mod vapid;

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;

use crate::channel::{PushMessage, PushSender, PushTarget};

pub use vapid::{VapidConfig, VapidKeys};

/// HTTP request timeout for a single push.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the push service should hold an undelivered message.
pub const DEFAULT_TTL_SECS: u32 = 86_400;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for push delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The endpoint no longer exists (404/410); the subscription must be
    /// dropped.
    #[error("Push endpoint gone (HTTP {0})")]
    Gone(u16),

    /// The push service refused the request with a 4xx status.
    #[error("Push service rejected request (HTTP {0})")]
    Rejected(u16),

    /// 429 or 5xx from the push service.
    #[error("Push service unavailable (HTTP {0})")]
    Unavailable(u16),

    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Stored subscription keys or endpoint are unusable.
    #[error("Invalid push subscription: {0}")]
    InvalidSubscription(String),

    #[error("Payload encryption failed: {0}")]
    Encryption(String),

    /// VAPID key material is missing or malformed.
    #[error("VAPID error: {0}")]
    Vapid(String),
}

impl PushError {
    /// Whether the subscription should be deleted.
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::Gone(_))
    }

    /// Whether retrying the same request cannot succeed.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Gone(_)
            | Self::Rejected(_)
            | Self::InvalidSubscription(_)
            | Self::Encryption(_) => true,
            Self::Request(e) => e.is_builder(),
            Self::Unavailable(_) | Self::Vapid(_) => false,
        }
    }
}

/// Map a push service response status to an outcome.
pub fn classify_status(status: StatusCode) -> Result<(), PushError> {
    if status.is_success() {
        return Ok(());
    }
    let code = status.as_u16();
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => Err(PushError::Gone(code)),
        StatusCode::TOO_MANY_REQUESTS => Err(PushError::Unavailable(code)),
        s if s.is_server_error() => Err(PushError::Unavailable(code)),
        _ => Err(PushError::Rejected(code)),
    }
}

// ---------------------------------------------------------------------------
// Base64
// ---------------------------------------------------------------------------

/// Decode base64url, tolerating padding and the standard alphabet.
pub fn decode_base64url(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let normalised: String = input
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    URL_SAFE_NO_PAD.decode(normalised)
}

/// Encode as unpadded base64url.
pub fn encode_base64url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

// ---------------------------------------------------------------------------
// WebPushSender
// ---------------------------------------------------------------------------

/// Sends encrypted Web Push messages signed with VAPID.
pub struct WebPushSender {
    client: reqwest::Client,
    vapid: VapidConfig,
    ttl_secs: u32,
}

impl WebPushSender {
    /// Create a sender with a pre-configured HTTP client.
    pub fn new(vapid: VapidConfig) -> Result<Self, PushError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            vapid,
            ttl_secs: DEFAULT_TTL_SECS,
        })
    }

    /// Public VAPID key browsers subscribe with.
    pub fn public_key(&self) -> &str {
        self.vapid.keys.public_key()
    }
}

#[async_trait]
impl PushSender for WebPushSender {
    async fn send(&self, target: &PushTarget, message: &PushMessage) -> Result<(), PushError> {
        let payload =
            serde_json::to_vec(message).map_err(|e| PushError::Encryption(e.to_string()))?;
        let body = encryption::encrypt(&target.p256dh, &target.auth, &payload)?;
        let authorization =
            self.vapid
                .keys
                .authorization(&target.endpoint, &self.vapid.subject, Utc::now())?;

        let response = self
            .client
            .post(&target.endpoint)
            .header(AUTHORIZATION, authorization)
            .header("TTL", self.ttl_secs.to_string())
            .header(CONTENT_ENCODING, "aes128gcm")
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        classify_status(status)?;
        tracing::debug!(endpoint = %target.endpoint, status = status.as_u16(), "Push delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn success_statuses() {
        assert!(classify_status(StatusCode::CREATED).is_ok());
        assert!(classify_status(StatusCode::OK).is_ok());
    }

    #[test]
    fn gone_statuses() {
        let err = classify_status(StatusCode::GONE).unwrap_err();
        assert!(err.is_gone());
        assert!(err.is_permanent());
        assert_matches!(classify_status(StatusCode::NOT_FOUND), Err(PushError::Gone(404)));
    }

    #[test]
    fn transient_statuses() {
        for status in [
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            let err = classify_status(status).unwrap_err();
            assert!(!err.is_permanent(), "{status} should be transient");
            assert!(!err.is_gone());
        }
    }

    #[test]
    fn other_client_errors_are_permanent() {
        let err = classify_status(StatusCode::BAD_REQUEST).unwrap_err();
        assert_matches!(err, PushError::Rejected(400));
        assert!(err.is_permanent());
        assert!(!err.is_gone());
    }

    #[test]
    fn base64_accepts_padding_and_standard_alphabet() {
        let bytes = vec![0xfb, 0xff, 0xfe];
        assert_eq!(decode_base64url("-__-").unwrap(), bytes);
        assert_eq!(decode_base64url("+//+").unwrap(), bytes);
        assert_eq!(decode_base64url("AQ==").unwrap(), vec![1]);
        assert_eq!(encode_base64url(&bytes), "-__-");
    }
}
