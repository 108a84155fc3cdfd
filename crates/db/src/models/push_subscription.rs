//! Web Push endpoint entity.

use clinica_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `push_subscriptions` table.
///
/// `p256dh` and `auth` are the browser's base64url-encoded public key and
/// authentication secret from `PushSubscription.getKey()`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PushSubscription {
    pub id: DbId,
    pub subscriber_id: DbId,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Keys and URL reported by the browser when subscribing.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterPushSubscription {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}
