//! Route definitions for Web Push registration.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::push;
use crate::state::AppState;

/// Push routes, mounted directly under `/api/v1`.
///
/// ```text
/// GET    /push/vapid-public-key                  -> vapid_public_key
/// POST   /subscribers/{id}/push-subscriptions    -> register_subscription
/// DELETE /push-subscriptions                     -> unregister_subscription
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/push/vapid-public-key", get(push::vapid_public_key))
        .route(
            "/subscribers/{id}/push-subscriptions",
            post(push::register_subscription),
        )
        .route("/push-subscriptions", delete(push::unregister_subscription))
}
