//! VAPID application-server identity (RFC 8292).
//!
//! The private key is a base64url-encoded raw P-256 scalar (the format
//! produced by the common `web-push generate-vapid-keys` tooling). The public
//! key is always derived from it.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::EncodePrivateKey;
use p256::SecretKey;
use serde::Serialize;

use super::encryption::random_secret_key;
use super::{decode_base64url, encode_base64url, PushError};

/// Lifetime of a signed VAPID token. RFC 8292 caps it at 24 hours.
pub const TOKEN_TTL_HOURS: i64 = 12;

/// Subject used when `VAPID_CLAIM_EMAIL` is not set.
const DEFAULT_SUBJECT: &str = "mailto:noreply@clinica.local";

#[derive(Debug, Serialize)]
struct Claims<'a> {
    aud: String,
    exp: i64,
    sub: &'a str,
}

/// The deployment's VAPID key pair.
#[derive(Clone)]
pub struct VapidKeys {
    secret: SecretKey,
    public_key: String,
}

impl std::fmt::Debug for VapidKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidKeys")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl VapidKeys {
    /// Parse a base64url private scalar.
    pub fn from_private_key(encoded: &str) -> Result<Self, PushError> {
        let bytes = decode_base64url(encoded)
            .map_err(|_| PushError::Vapid("VAPID_PRIVATE_KEY is not valid base64".into()))?;
        let secret = SecretKey::from_slice(&bytes)
            .map_err(|_| PushError::Vapid("VAPID_PRIVATE_KEY is not a P-256 scalar".into()))?;
        Ok(Self::from_secret(secret))
    }

    /// A fresh random key pair.
    pub fn generate() -> Self {
        Self::from_secret(random_secret_key())
    }

    fn from_secret(secret: SecretKey) -> Self {
        let public_key = encode_base64url(secret.public_key().to_encoded_point(false).as_bytes());
        Self { secret, public_key }
    }

    /// Base64url uncompressed public key, as handed to `pushManager.subscribe`.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Base64url private scalar.
    pub fn private_key(&self) -> String {
        encode_base64url(&self.secret.to_bytes())
    }

    /// `Authorization` header value for a request to `endpoint`.
    pub fn authorization(
        &self,
        endpoint: &str,
        subject: &str,
        now: DateTime<Utc>,
    ) -> Result<String, PushError> {
        let token = self.sign(endpoint, subject, now)?;
        Ok(format!("vapid t={token}, k={}", self.public_key))
    }

    /// ES256 JWT with the endpoint origin as audience.
    pub fn sign(
        &self,
        endpoint: &str,
        subject: &str,
        now: DateTime<Utc>,
    ) -> Result<String, PushError> {
        let url = reqwest::Url::parse(endpoint)
            .map_err(|_| PushError::InvalidSubscription(format!("invalid endpoint {endpoint}")))?;
        let claims = Claims {
            aud: url.origin().ascii_serialization(),
            exp: (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
            sub: subject,
        };
        let der = self
            .secret
            .to_pkcs8_der()
            .map_err(|e| PushError::Vapid(e.to_string()))?;
        let key = EncodingKey::from_ec_der(der.as_bytes());
        jsonwebtoken::encode(&Header::new(Algorithm::ES256), &claims, &key)
            .map_err(|e| PushError::Vapid(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// VapidConfig
// ---------------------------------------------------------------------------

/// Key pair plus the `sub` claim.
#[derive(Debug, Clone)]
pub struct VapidConfig {
    pub keys: VapidKeys,
    pub subject: String,
}

impl VapidConfig {
    /// Load from environment variables.
    ///
    /// Returns `Ok(None)` if `VAPID_PRIVATE_KEY` is not set (push delivery
    /// disabled). A `VAPID_PUBLIC_KEY` that does not match the private key is
    /// an error.
    ///
    /// | Variable            | Required | Default                        |
    /// |---------------------|----------|--------------------------------|
    /// | `VAPID_PRIVATE_KEY` | yes      |                                |
    /// | `VAPID_PUBLIC_KEY`  | no       | derived                        |
    /// | `VAPID_CLAIM_EMAIL` | no       | `mailto:noreply@clinica.local` |
    pub fn from_env() -> Result<Option<Self>, PushError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<Self>, PushError> {
        let Some(private) = lookup("VAPID_PRIVATE_KEY").filter(|k| !k.trim().is_empty()) else {
            return Ok(None);
        };
        let keys = VapidKeys::from_private_key(&private)?;

        if let Some(public) = lookup("VAPID_PUBLIC_KEY").filter(|k| !k.trim().is_empty()) {
            let configured = decode_base64url(&public)
                .map_err(|_| PushError::Vapid("VAPID_PUBLIC_KEY is not valid base64".into()))?;
            let derived = decode_base64url(keys.public_key())
                .map_err(|_| PushError::Vapid("derived public key is not base64".into()))?;
            if configured != derived {
                return Err(PushError::Vapid(
                    "VAPID_PUBLIC_KEY does not match VAPID_PRIVATE_KEY".into(),
                ));
            }
        }

        let subject = lookup("VAPID_CLAIM_EMAIL")
            .filter(|s| !s.trim().is_empty())
            .map(|s| subject_claim(s.trim()))
            .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());

        Ok(Some(Self { keys, subject }))
    }
}

/// Normalise a contact into a `mailto:` or `https:` subject.
fn subject_claim(contact: &str) -> String {
    if contact.starts_with("mailto:") || contact.starts_with("https:") {
        contact.to_string()
    } else {
        format!("mailto:{contact}")
    }
}
