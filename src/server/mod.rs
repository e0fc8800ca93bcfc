//! HTTP surface: verification, admin, sync triggers, catalog.

mod admin;
mod auth;
mod sync;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use subtle::ConstantTimeEq;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::PressroomError;
use crate::storage::Storage;
use crate::sync::SyncEngine;

/// Secrets and wiring for the HTTP surface
pub struct ServerConfig {
    /// Key required on `/api/internal` and catalog routes
    pub api_key: String,
    /// Shared secret validating webhook deliveries
    pub webhook_secret: String,
}

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SyncEngine>,
    pub storage: Storage,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(engine: Arc<SyncEngine>, storage: Storage, config: ServerConfig) -> Self {
        Self {
            engine,
            storage,
            config: Arc::new(config),
        }
    }
}

/// Build the router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Reader-facing verification
        .route("/auth/verify", post(auth::verify))
        .route("/auth/access/:type/:slug", get(auth::check_access))
        .route("/auth/content/:type/:slug", get(auth::protected_content))
        // Admin: access rules
        .route(
            "/api/internal/access-rules",
            post(admin::create_rule).get(admin::list_rules),
        )
        .route(
            "/api/internal/access-rules/:type/:slug",
            get(admin::get_rule)
                .put(admin::update_rule)
                .delete(admin::delete_rule),
        )
        .route(
            "/api/internal/access-rules/:type/:slug/emails",
            post(admin::add_email),
        )
        .route(
            "/api/internal/access-rules/:type/:slug/emails/:email",
            axum::routing::delete(admin::remove_email),
        )
        // Admin: observability
        .route("/api/internal/logs", get(admin::get_logs))
        .route("/api/internal/stats", get(admin::get_stats))
        // Admin: content management
        .route("/api/internal/content/types", get(admin::content_types))
        .route("/api/internal/content", post(admin::create_content_file))
        .route("/api/internal/content/:type", get(admin::list_content))
        .route(
            "/api/internal/content/:type/:slug",
            get(admin::get_content_file),
        )
        // Sync surface
        .route("/api/internal/sync", post(sync::manual_sync))
        .route("/api/internal/sync/webhook", post(sync::webhook))
        .route("/api/internal/sync/status", get(sync::sync_status))
        // Build-script catalog
        .route("/api/content-catalog", get(admin::catalog))
        .route("/api/content-catalog/:type", get(admin::catalog_by_type))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until shutdown
pub async fn serve(state: AppState, port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(state);

    tracing::info!("pressroom server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
    }))
}

/// Error envelope returned by every handler
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<PressroomError> for ApiError {
    fn from(err: PressroomError) -> Self {
        let status = match &err {
            PressroomError::NotFound(_) => StatusCode::NOT_FOUND,
            PressroomError::AlreadyExists(_) => StatusCode::CONFLICT,
            PressroomError::InvalidInput(_) | PressroomError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            PressroomError::Auth(_) | PressroomError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::from(PressroomError::from(err))
    }
}

/// Check the `X-API-Key` header on guarded routes
pub(crate) fn require_api_key(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let provided = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if provided.is_empty() {
        return Err(ApiError::unauthorized("Missing API key"));
    }
    let matches: bool = provided
        .as_bytes()
        .ct_eq(state.config.api_key.as_bytes())
        .into();
    if !matches {
        return Err(ApiError::unauthorized("Invalid API key"));
    }
    Ok(())
}
