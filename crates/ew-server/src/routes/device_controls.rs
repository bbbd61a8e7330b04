//! `/devices/{id}/controls/operation` and `/controls/alerts` — operator
//! mutations that update device state and enqueue a retry-safe
//! control command, grounded on
//! `original_source/api/app/routes/device_controls.py`.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use ew_protocol::commands::ControlCommandPayload;
use ew_protocol::device::OperationMode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::commands::queue;
use crate::db;
use crate::db::devices::DeviceRow;
use crate::error::{ApiError, ApiResult};
use crate::routes::{pool_or_unavailable, require_admin};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OperationControlRequest {
    pub operation_mode: OperationMode,
    #[serde(default)]
    pub sleep_poll_interval_s: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct AlertsControlRequest {
    pub alerts_muted_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub alerts_muted_reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeviceControlsOut {
    pub device_id: String,
    pub operation_mode: OperationMode,
    pub sleep_poll_interval_s: u32,
    pub alerts_muted_until: Option<DateTime<Utc>>,
    pub alerts_muted_reason: Option<String>,
    pub pending_command_id: Uuid,
}

fn operation_mode_code(mode: OperationMode) -> &'static str {
    match mode {
        OperationMode::Active => "active",
        OperationMode::Sleep => "sleep",
        OperationMode::Disabled => "disabled",
    }
}

fn operation_mode_of(device: &DeviceRow) -> OperationMode {
    serde_json::from_value(serde_json::Value::String(device.operation_mode.clone()))
        .unwrap_or_default()
}

async fn load_device(pool: &sqlx::PgPool, device_id: &str) -> ApiResult<DeviceRow> {
    db::devices::get_by_device_id(pool, device_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("device {device_id}")))
}

pub async fn update_operation_controls(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<OperationControlRequest>,
) -> ApiResult<Json<DeviceControlsOut>> {
    require_admin(&state, &headers)?;
    let pool = pool_or_unavailable(&state)?;
    let device = load_device(pool, &device_id).await?;

    let sleep_poll_interval_s = request
        .sleep_poll_interval_s
        .unwrap_or(device.sleep_poll_interval_s as u32);

    db::devices::update_controls(
        pool,
        &device_id,
        operation_mode_code(request.operation_mode),
        sleep_poll_interval_s as i32,
        device.alerts_muted_until,
        device.alerts_muted_reason.as_deref(),
    )
    .await?;

    let now = Utc::now();
    let pending_command_id = queue::enqueue(
        pool,
        &device_id,
        ControlCommandPayload::SetOperationMode {
            operation_mode: request.operation_mode,
            sleep_poll_interval_s: Some(sleep_poll_interval_s),
        },
        state.edge_policy.operation_defaults.control_command_ttl_s,
        now,
    )
    .await?;

    Ok(Json(DeviceControlsOut {
        device_id,
        operation_mode: request.operation_mode,
        sleep_poll_interval_s,
        alerts_muted_until: device.alerts_muted_until,
        alerts_muted_reason: device.alerts_muted_reason,
        pending_command_id,
    }))
}

/// Alert muting is a server-side routing decision (`router::decide`
/// reads `alerts_muted_until` directly), so the edge has nothing to
/// apply — the control command re-delivered here just wakes the
/// device onto its current operation mode, matching the original's
/// practice of re-enqueuing a device-state snapshot after any
/// controls mutation.
pub async fn update_alert_controls(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<AlertsControlRequest>,
) -> ApiResult<Json<DeviceControlsOut>> {
    require_admin(&state, &headers)?;
    let pool = pool_or_unavailable(&state)?;
    let device = load_device(pool, &device_id).await?;

    let reason = request
        .alerts_muted_until
        .and(request.alerts_muted_reason)
        .filter(|r| !r.trim().is_empty());

    db::devices::update_controls(
        pool,
        &device_id,
        &device.operation_mode,
        device.sleep_poll_interval_s,
        request.alerts_muted_until,
        reason.as_deref(),
    )
    .await?;

    let operation_mode = operation_mode_of(&device);
    let now = Utc::now();
    let pending_command_id = queue::enqueue(
        pool,
        &device_id,
        ControlCommandPayload::SetOperationMode {
            operation_mode,
            sleep_poll_interval_s: Some(device.sleep_poll_interval_s as u32),
        },
        state.edge_policy.operation_defaults.control_command_ttl_s,
        now,
    )
    .await?;

    Ok(Json(DeviceControlsOut {
        device_id,
        operation_mode,
        sleep_poll_interval_s: device.sleep_poll_interval_s as u32,
        alerts_muted_until: request.alerts_muted_until,
        alerts_muted_reason: reason,
        pending_command_id,
    }))
}
