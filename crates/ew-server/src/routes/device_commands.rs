//! `POST /device-commands/{id}/ack` — idempotent command ack.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use ew_protocol::commands::CommandAckRequest;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth;
use crate::commands::queue;
use crate::db;
use crate::error::ApiResult;
use crate::routes::{bearer_token, pool_or_unavailable};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AckBody {
    pub applied: bool,
    #[serde(default)]
    pub error: Option<String>,
}

pub async fn ack_command(
    State(state): State<AppState>,
    Path(command_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<AckBody>,
) -> ApiResult<()> {
    let pool = pool_or_unavailable(&state)?;
    let token = bearer_token(&headers)?;
    let fingerprint = auth::token_fingerprint(token);
    let device = db::devices::get_by_token_fingerprint(pool, &fingerprint).await?;
    let device = auth::authenticate_device(device, token)?;

    queue::acknowledge(
        pool,
        &device.device_id,
        CommandAckRequest {
            command_id,
            applied: body.applied,
            error: body.error,
        },
        Utc::now(),
    )
    .await
}
