//! `POST /internal/pubsub/push` — the asynchronous batch worker
//! endpoint, grounded on `original_source/api/app/routes/pubsub_worker.py`.
//! Our own ingest path already simulates the broker round-trip via an
//! in-process `tokio::spawn`, but this endpoint exists so an external
//! pubsub subscription could deliver the same message shape.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;

use crate::auth;
use crate::config::IngestPipelineMode;
use crate::error::{ApiError, ApiResult};
use crate::ingest::pubsub::{self, PubsubMessage};
use crate::routes::pool_or_unavailable;
use crate::state::AppState;

pub async fn push_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(message): Json<PubsubMessage>,
) -> ApiResult<StatusCode> {
    if state.config.ingest_pipeline_mode != IngestPipelineMode::Pubsub {
        return Err(ApiError::NotFound("pubsub ingest mode disabled".to_string()));
    }

    let provided = headers
        .get("x-edgewatch-push-token")
        .and_then(|v| v.to_str().ok());
    auth::require_pubsub_token(provided, state.config.pubsub_push_shared_token.as_deref())?;

    let pool = pool_or_unavailable(&state)?;
    pubsub::replay(pool, &state.telemetry_contract, message, Utc::now()).await?;
    Ok(StatusCode::NO_CONTENT)
}
