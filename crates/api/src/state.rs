use std::sync::Arc;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: clinica_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Base64url VAPID public key handed to browsers, if push is configured.
    pub vapid_public_key: Option<Arc<str>>,
}
