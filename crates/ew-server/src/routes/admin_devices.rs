//! `/admin/devices` create/update/list — grounded on
//! `original_source/api/app/routes/admin.py`.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use ew_protocol::device::Device;
use serde::{Deserialize, Serialize};

use crate::auth;
use crate::db;
use crate::db::devices::DeviceRow;
use crate::error::{ApiError, ApiResult};
use crate::routes::{pool_or_unavailable, require_admin};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateDeviceRequest {
    pub device_id: String,
    pub display_name: String,
    pub token: String,
    pub heartbeat_interval_s: u32,
    pub offline_after_s: u32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDeviceRequest {
    pub display_name: Option<String>,
    pub heartbeat_interval_s: Option<u32>,
    pub offline_after_s: Option<u32>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct DeviceOut {
    pub device_id: String,
    pub display_name: String,
    pub heartbeat_interval_s: i32,
    pub offline_after_s: i32,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub enabled: bool,
    pub status: &'static str,
    pub seconds_since_last_seen: Option<i64>,
}

/// Mirrors `monitor.py`'s `compute_status`.
fn compute_status(device: &DeviceRow, now: DateTime<Utc>) -> (&'static str, Option<i64>) {
    let operation_mode = device.operation_mode.as_str();

    let Some(last_seen_at) = device.last_seen_at else {
        if !device.enabled || operation_mode == "disabled" {
            return ("disabled", None);
        }
        if operation_mode == "sleep" {
            return ("sleep", None);
        }
        return ("unknown", None);
    };

    let seconds = (now - last_seen_at).num_seconds();
    if !device.enabled || operation_mode == "disabled" {
        return ("disabled", Some(seconds));
    }
    if operation_mode == "sleep" {
        return ("sleep", Some(seconds));
    }
    if seconds > device.offline_after_s as i64 {
        return ("offline", Some(seconds));
    }
    ("online", Some(seconds))
}

fn to_device_out(device: DeviceRow, now: DateTime<Utc>) -> DeviceOut {
    let (status, seconds_since_last_seen) = compute_status(&device, now);
    DeviceOut {
        device_id: device.device_id,
        display_name: device.display_name,
        heartbeat_interval_s: device.heartbeat_interval_s,
        offline_after_s: device.offline_after_s,
        last_seen_at: device.last_seen_at,
        enabled: device.enabled,
        status,
        seconds_since_last_seen,
    }
}

pub async fn create_device(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateDeviceRequest>,
) -> ApiResult<Json<DeviceOut>> {
    require_admin(&state, &headers)?;
    let pool = pool_or_unavailable(&state)?;

    Device::check_cadence_invariant(request.heartbeat_interval_s, request.offline_after_s)
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    if db::devices::get_by_device_id(pool, &request.device_id).await?.is_some() {
        return Err(ApiError::Conflict("device already exists".to_string()));
    }

    let now = Utc::now();
    let row = DeviceRow {
        device_id: request.device_id,
        display_name: request.display_name,
        token_fingerprint: auth::token_fingerprint(&request.token),
        token_hash: auth::hash_token(&request.token),
        heartbeat_interval_s: request.heartbeat_interval_s as i32,
        offline_after_s: request.offline_after_s as i32,
        enabled: true,
        operation_mode: "active".to_string(),
        sleep_poll_interval_s: state.edge_policy.operation_defaults.default_sleep_poll_interval_s as i32,
        alerts_muted_until: None,
        alerts_muted_reason: None,
        last_seen_at: None,
        created_at: now,
    };
    db::devices::insert(pool, &row).await?;
    Ok(Json(to_device_out(row, now)))
}

pub async fn update_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<UpdateDeviceRequest>,
) -> ApiResult<Json<DeviceOut>> {
    require_admin(&state, &headers)?;
    let pool = pool_or_unavailable(&state)?;

    let mut device = db::devices::get_by_device_id(pool, &device_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("device {device_id}")))?;

    if let Some(v) = request.display_name {
        device.display_name = v;
    }
    if let Some(v) = request.heartbeat_interval_s {
        device.heartbeat_interval_s = v as i32;
    }
    if let Some(v) = request.offline_after_s {
        device.offline_after_s = v as i32;
    }
    if let Some(v) = request.enabled {
        device.enabled = v;
    }

    Device::check_cadence_invariant(device.heartbeat_interval_s as u32, device.offline_after_s as u32)
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    db::devices::update_admin_fields(
        pool,
        &device_id,
        &device.display_name,
        device.heartbeat_interval_s,
        device.offline_after_s,
        device.enabled,
    )
    .await?;

    Ok(Json(to_device_out(device, Utc::now())))
}

pub async fn list_devices(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<DeviceOut>>> {
    require_admin(&state, &headers)?;
    let pool = pool_or_unavailable(&state)?;
    let now = Utc::now();
    let devices = db::devices::list_all(pool).await?;
    Ok(Json(devices.into_iter().map(|d| to_device_out(d, now)).collect()))
}
