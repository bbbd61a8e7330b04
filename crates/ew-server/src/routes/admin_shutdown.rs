//! `POST /admin/devices/{id}/controls/shutdown`.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use ew_protocol::commands::ControlCommandPayload;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::commands::queue;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::routes::{pool_or_unavailable, require_admin};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ShutdownRequest {
    #[serde(default = "default_grace_s")]
    pub grace_s: u32,
}

fn default_grace_s() -> u32 {
    30
}

#[derive(Debug, Serialize)]
pub struct ShutdownResponse {
    pub command_id: Uuid,
}

pub async fn enqueue_shutdown(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ShutdownRequest>,
) -> ApiResult<Json<ShutdownResponse>> {
    require_admin(&state, &headers)?;
    let pool = pool_or_unavailable(&state)?;

    db::devices::get_by_device_id(pool, &device_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("device {device_id}")))?;

    let grace_s = request.grace_s.clamp(1, 3600);
    let command_id = queue::enqueue(
        pool,
        &device_id,
        ControlCommandPayload::Shutdown { grace_s },
        state.edge_policy.operation_defaults.control_command_ttl_s,
        Utc::now(),
    )
    .await?;

    Ok(Json(ShutdownResponse { command_id }))
}
