//! API route definitions and router builder.

pub mod admin_devices;
pub mod admin_shutdown;
pub mod alerts;
pub mod device_commands;
pub mod device_controls;
pub mod device_policy;
pub mod health;
pub mod ingest;
pub mod pubsub_push;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderMap};
use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::config::AdminAuthMode;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = build_cors(&state.config.cors_origins);
    let body_limit = state.config.max_request_body_bytes;

    let api = Router::new()
        .route("/ingest", post(ingest::ingest_telemetry))
        .route("/device-policy", get(device_policy::get_device_policy))
        .route(
            "/device-commands/{id}/ack",
            post(device_commands::ack_command),
        )
        .route("/internal/pubsub/push", post(pubsub_push::push_batch))
        .route(
            "/admin/devices",
            post(admin_devices::create_device).get(admin_devices::list_devices),
        )
        .route("/admin/devices/{id}", patch(admin_devices::update_device))
        .route(
            "/devices/{id}/controls/operation",
            patch(device_controls::update_operation_controls),
        )
        .route(
            "/devices/{id}/controls/alerts",
            patch(device_controls::update_alert_controls),
        )
        .route(
            "/admin/devices/{id}/controls/shutdown",
            post(admin_shutdown::enqueue_shutdown),
        )
        .route("/alerts", get(alerts::list_alerts));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

fn build_cors(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// The core pipeline (ingest, alerts, commands) is Pg-required: its
/// invariants depend on partial unique indexes and transactional
/// supersede/insert sequences that the in-memory fallback doesn't
/// model. Any handler reaching into `db::*` calls this first.
pub(crate) fn pool_or_unavailable(state: &AppState) -> ApiResult<&sqlx::PgPool> {
    state
        .pool
        .as_ref()
        .ok_or_else(|| ApiError::Internal("database not configured".to_string()))
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> ApiResult<&str> {
    auth::parse_bearer(headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()))
}

/// Single-tier authz: the admin key gates every admin/operator
/// mutation. The original system's separate viewer/operator/admin
/// RBAC roles collapse to one shared key here since `ServerConfig`
/// only carries `admin_api_key`.
pub(crate) fn require_admin(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    if !state.config.authz_enabled || state.config.admin_auth_mode == AdminAuthMode::None {
        return Ok(());
    }
    let provided = headers.get("x-admin-key").and_then(|v| v.to_str().ok());
    auth::require_admin_key(provided, state.config.admin_api_key.as_deref())
}
