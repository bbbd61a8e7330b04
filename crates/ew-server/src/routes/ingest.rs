//! `POST /ingest` — device-authenticated telemetry submission.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use ew_protocol::telemetry::{IngestRequest, IngestResponse};

use crate::auth;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::ingest;
use crate::routes::{bearer_token, pool_or_unavailable};
use crate::state::AppState;

pub async fn ingest_telemetry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<IngestRequest>,
) -> ApiResult<Json<IngestResponse>> {
    let pool = pool_or_unavailable(&state)?;
    let token = bearer_token(&headers)?;
    let fingerprint = auth::token_fingerprint(token);
    let device = db::devices::get_by_token_fingerprint(pool, &fingerprint).await?;
    let device = auth::authenticate_device(device, token)?;

    let now = Utc::now();
    if state.config.rate_limit_enabled {
        let cost = request.points.len() as u32;
        if let Err(retry_after_s) = state.rate_limiters.try_consume(&device.device_id, cost, now) {
            return Err(ApiError::RateLimited { retry_after_s });
        }
    }

    let response = ingest::ingest(
        pool,
        &state.config,
        &state.telemetry_contract,
        &state.contract_sha256,
        &state.edge_policy,
        &device.device_id,
        request,
        now,
    )
    .await?;

    Ok(Json(response))
}
