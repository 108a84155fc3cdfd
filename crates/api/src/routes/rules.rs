//! Route definitions for notification rules.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::rules;
use crate::state::AppState;

/// Rule routes, mounted directly under `/api/v1`.
///
/// ```text
/// GET    /tenants/{id}/notification-rules            -> list_rules
/// POST   /tenants/{id}/notification-rules            -> create_rule
/// POST   /tenants/{id}/notification-rules/defaults   -> seed_default_rules
///
/// GET    /notification-rules/{id}                    -> get_rule
/// PATCH  /notification-rules/{id}                    -> update_rule
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/tenants/{id}/notification-rules",
            get(rules::list_rules).post(rules::create_rule),
        )
        .route(
            "/tenants/{id}/notification-rules/defaults",
            post(rules::seed_default_rules),
        )
        .route(
            "/notification-rules/{id}",
            get(rules::get_rule).patch(rules::update_rule),
        )
}
