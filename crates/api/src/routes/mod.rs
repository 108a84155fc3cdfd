pub mod health;
pub mod push;
pub mod rules;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /push/vapid-public-key                           VAPID application server key (GET)
/// /subscribers/{id}/push-subscriptions             register browser endpoint (POST)
/// /push-subscriptions                              unregister browser endpoint (DELETE)
///
/// /tenants/{id}/notification-rules                 list, create (GET, POST)
/// /tenants/{id}/notification-rules/defaults        seed built-in rules (POST)
/// /notification-rules/{id}                         get, update (GET, PATCH)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(push::router()).merge(rules::router())
}
