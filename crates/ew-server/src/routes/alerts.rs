//! `GET /alerts` — list with filters (spec.md §6).

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db;
use crate::db::alerts::AlertRow;
use crate::error::ApiResult;
use crate::routes::{pool_or_unavailable, require_admin};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    pub device_id: Option<String>,
    #[serde(default)]
    pub open_only: bool,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AlertOut {
    pub id: Uuid,
    pub device_id: String,
    pub alert_type: String,
    pub severity: String,
    pub status: String,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub last_value: Option<f64>,
}

impl From<AlertRow> for AlertOut {
    fn from(row: AlertRow) -> Self {
        Self {
            id: row.id,
            device_id: row.device_id,
            alert_type: row.alert_type,
            severity: row.severity,
            status: row.status,
            opened_at: row.opened_at,
            resolved_at: row.resolved_at,
            last_value: row.last_value,
        }
    }
}

pub async fn list_alerts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AlertsQuery>,
) -> ApiResult<Json<Vec<AlertOut>>> {
    require_admin(&state, &headers)?;
    let pool = pool_or_unavailable(&state)?;
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let rows = db::alerts::list(pool, query.device_id.as_deref(), query.open_only, limit).await?;
    Ok(Json(rows.into_iter().map(AlertOut::from).collect()))
}
