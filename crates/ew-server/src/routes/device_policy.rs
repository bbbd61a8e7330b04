//! `GET /device-policy` — ETag-conditional policy + pending-command
//! delivery (spec.md §4.4).

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use ew_protocol::device::OperationMode;

use crate::auth;
use crate::commands::etag;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::routes::{bearer_token, pool_or_unavailable};
use crate::state::AppState;

pub async fn get_device_policy(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let pool = pool_or_unavailable(&state)?;
    let token = bearer_token(&headers)?;
    let fingerprint = auth::token_fingerprint(token);
    let device = db::devices::get_by_token_fingerprint(pool, &fingerprint).await?;
    let device = auth::authenticate_device(device, token)?;

    let pending = db::commands::find_pending_for_device(pool, &device.device_id).await?;
    let computed_etag = etag::compute(&state.edge_policy, &state.policy_sha256, &device, pending.as_ref());

    if let Some(candidate) = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok()) {
        if candidate == computed_etag {
            let mut response = StatusCode::NOT_MODIFIED.into_response();
            insert_etag(&mut response, &computed_etag)?;
            return Ok(response);
        }
    }

    let mut body =
        serde_json::to_value(&*state.edge_policy).map_err(|e| ApiError::Internal(e.to_string()))?;
    let operation_mode: OperationMode =
        serde_json::from_value(serde_json::Value::String(device.operation_mode.clone()))
            .unwrap_or_default();

    if let serde_json::Value::Object(map) = &mut body {
        map.insert(
            "device_operation_mode".to_string(),
            serde_json::to_value(operation_mode).unwrap_or(serde_json::Value::Null),
        );
        map.insert(
            "device_sleep_poll_interval_s".to_string(),
            serde_json::Value::from(device.sleep_poll_interval_s),
        );
        map.insert(
            "pending_control_command".to_string(),
            match pending_command_payload(pending.as_ref()) {
                Some(c) => serde_json::to_value(&c).unwrap_or(serde_json::Value::Null),
                None => serde_json::Value::Null,
            },
        );
    }

    let mut response = (StatusCode::OK, axum::Json(body)).into_response();
    insert_etag(&mut response, &computed_etag)?;
    let cache_control = format!("max-age={}", state.edge_policy.cache_max_age_s);
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_str(&cache_control).map_err(|e| ApiError::Internal(e.to_string()))?,
    );
    Ok(response)
}

/// Deserializes the stored JSON payload back into the wire
/// `ControlCommandPayload` so the edge agent receives a fully typed
/// command, not just the identity fragment folded into the ETag.
fn pending_command_payload(
    row: Option<&db::commands::CommandRow>,
) -> Option<ew_protocol::commands::PendingControlCommand> {
    let row = row?;
    let payload = serde_json::from_value(row.payload.clone()).ok()?;
    let status = serde_json::from_value(serde_json::Value::String(row.status.clone())).ok()?;
    Some(ew_protocol::commands::PendingControlCommand {
        id: row.id,
        payload,
        status,
        expires_at: row.expires_at,
    })
}

fn insert_etag(response: &mut Response, etag: &str) -> ApiResult<()> {
    let value = HeaderValue::from_str(etag).map_err(|e| ApiError::Internal(e.to_string()))?;
    response.headers_mut().insert(header::ETAG, value);
    Ok(())
}
