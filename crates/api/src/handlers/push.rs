//! Handlers for Web Push registration.
//!
//! The browser fetches the VAPID public key, calls
//! `PushManager.subscribe()` with it and posts the resulting endpoint and
//! keys back here.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use clinica_core::error::CoreError;
use clinica_core::types::DbId;
use clinica_db::models::push_subscription::RegisterPushSubscription;
use clinica_db::repositories::{PushSubscriptionRepo, SubscriberRepo};
use clinica_delivery::push::decode_base64url;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Length of an uncompressed P-256 public key (`0x04 || X || Y`).
const P256DH_KEY_LEN: usize = 65;

/// Length of the Web Push authentication secret.
const AUTH_SECRET_LEN: usize = 16;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct VapidPublicKey {
    pub public_key: String,
}

/// Body of `POST /subscribers/{id}/push-subscriptions`, shaped like the
/// browser's `PushSubscription.toJSON()`.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterPushRequest {
    #[validate(url)]
    pub endpoint: String,
    #[validate(nested)]
    pub keys: PushKeys,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PushKeys {
    #[validate(length(min = 1))]
    pub p256dh: String,
    #[validate(length(min = 1))]
    pub auth: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UnregisterPushRequest {
    #[validate(length(min = 1))]
    pub endpoint: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/push/vapid-public-key
///
/// Returns 503 when this deployment has no VAPID keys configured.
pub async fn vapid_public_key(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<VapidPublicKey>>> {
    let key = state
        .vapid_public_key
        .as_deref()
        .ok_or_else(|| AppError::Unavailable("Push notifications are not configured".into()))?;

    Ok(Json(DataResponse {
        data: VapidPublicKey {
            public_key: key.to_string(),
        },
    }))
}

/// POST /api/v1/subscribers/{id}/push-subscriptions
///
/// Register (or move) a browser endpoint for an active subscriber.
pub async fn register_subscription(
    State(state): State<AppState>,
    Path(subscriber_id): Path<DbId>,
    Json(input): Json<RegisterPushRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    validate_key(&input.keys.p256dh, "p256dh", P256DH_KEY_LEN)?;
    validate_key(&input.keys.auth, "auth", AUTH_SECRET_LEN)?;

    match SubscriberRepo::find_by_id(&state.pool, subscriber_id).await? {
        Some(subscriber) if subscriber.is_active => {}
        _ => {
            return Err(AppError::Core(CoreError::NotFound {
                entity: "Subscriber",
                id: subscriber_id,
            }))
        }
    }

    let registration = RegisterPushSubscription {
        endpoint: input.endpoint,
        p256dh: input.keys.p256dh,
        auth: input.keys.auth,
    };
    let subscription =
        PushSubscriptionRepo::register(&state.pool, subscriber_id, &registration).await?;

    tracing::info!(
        subscriber_id,
        push_subscription_id = subscription.id,
        "Push endpoint registered"
    );

    Ok((
        StatusCode::CREATED,
        Json(DataResponse { data: subscription }),
    ))
}

/// DELETE /api/v1/push-subscriptions
///
/// Remove an endpoint, e.g. after the browser unsubscribes. 404 if unknown.
pub async fn unregister_subscription(
    State(state): State<AppState>,
    Json(input): Json<UnregisterPushRequest>,
) -> AppResult<StatusCode> {
    input.validate()?;

    if !PushSubscriptionRepo::delete_by_endpoint(&state.pool, &input.endpoint).await? {
        return Err(AppError::NotFound(
            "Push endpoint is not registered".to_string(),
        ));
    }

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Check that a browser key is base64url of the expected length.
fn validate_key(value: &str, field: &str, expected_len: usize) -> Result<(), AppError> {
    let bytes = decode_base64url(value)
        .map_err(|_| AppError::BadRequest(format!("keys.{field} is not valid base64url")))?;

    if bytes.len() != expected_len {
        return Err(AppError::BadRequest(format!(
            "keys.{field} must decode to {expected_len} bytes, got {}",
            bytes.len()
        )));
    }
    if field == "p256dh" && bytes[0] != 0x04 {
        return Err(AppError::BadRequest(
            "keys.p256dh must be an uncompressed P-256 point".to_string(),
        ));
    }
    Ok(())
}
