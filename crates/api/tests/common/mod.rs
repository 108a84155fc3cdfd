#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use clinica_core::types::DbId;
use clinica_db::models::subscriber::CreateSubscriber;
use clinica_db::models::tenant::CreateTenant;
use clinica_db::repositories::{SubscriberRepo, TenantRepo};
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use clinica_api::config::ServerConfig;
use clinica_api::router::build_app_router;
use clinica_api::state::AppState;

/// Public key reported by test apps built with push enabled.
pub const TEST_VAPID_PUBLIC_KEY: &str =
    "BEl62iUYgUivxIkv69yViEuiBIa-Ib9-SkvMeAtA3LFgDzkrxZJjSgSnfckjBJuBkr3qBUYIHBQFLXYp5Nksh8U";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
    }
}

/// Build the full application router (same middleware stack as
/// production) without push configured.
pub fn build_test_app(pool: PgPool) -> Router {
    build_app(pool, None)
}

/// Build the application router with a VAPID public key configured.
pub fn build_test_app_with_push(pool: PgPool) -> Router {
    build_app(pool, Some(TEST_VAPID_PUBLIC_KEY))
}

fn build_app(pool: PgPool, vapid_public_key: Option<&str>) -> Router {
    let config = test_config();
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        vapid_public_key: vapid_public_key.map(Arc::from),
    };
    build_app_router(state, &config)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body)).await
}

pub async fn patch_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::PATCH, uri, Some(body)).await
}

pub async fn delete_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::DELETE, uri, Some(body)).await
}

async fn send(
    app: Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Assert a status code, printing the body on mismatch.
pub async fn expect_status(response: Response<Body>, status: StatusCode) -> serde_json::Value {
    let actual = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or_default();
    assert_eq!(actual, status, "unexpected status, body: {json}");
    json
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub async fn tenant(pool: &PgPool) -> DbId {
    TenantRepo::create(
        pool,
        &CreateTenant {
            name: "Clínica Luna".to_string(),
            cycle_predictor_enabled: Some(true),
        },
    )
    .await
    .unwrap()
    .id
}

pub async fn subscriber(pool: &PgPool, tenant_id: DbId) -> DbId {
    SubscriberRepo::create(
        pool,
        &CreateSubscriber {
            tenant_id,
            email: "lucia@example.com".to_string(),
            display_name: "Lucía".to_string(),
        },
    )
    .await
    .unwrap()
    .id
}
