//! Device registry queries.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Device row as stored in Postgres, including auth fields never
/// serialized back to clients.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeviceRow {
    pub device_id: String,
    pub display_name: String,
    pub token_fingerprint: String,
    pub token_hash: String,
    pub heartbeat_interval_s: i32,
    pub offline_after_s: i32,
    pub enabled: bool,
    pub operation_mode: String,
    pub sleep_poll_interval_s: i32,
    pub alerts_muted_until: Option<DateTime<Utc>>,
    pub alerts_muted_reason: Option<String>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub async fn list_all(pool: &PgPool) -> Result<Vec<DeviceRow>, sqlx::Error> {
    sqlx::query_as::<_, DeviceRow>("SELECT * FROM devices ORDER BY device_id")
        .fetch_all(pool)
        .await
}

pub async fn get_by_device_id(
    pool: &PgPool,
    device_id: &str,
) -> Result<Option<DeviceRow>, sqlx::Error> {
    sqlx::query_as::<_, DeviceRow>("SELECT * FROM devices WHERE device_id = $1")
        .bind(device_id)
        .fetch_optional(pool)
        .await
}

pub async fn get_by_token_fingerprint(
    pool: &PgPool,
    token_fingerprint: &str,
) -> Result<Option<DeviceRow>, sqlx::Error> {
    sqlx::query_as::<_, DeviceRow>("SELECT * FROM devices WHERE token_fingerprint = $1")
        .bind(token_fingerprint)
        .fetch_optional(pool)
        .await
}

#[allow(clippy::too_many_arguments)]
pub async fn insert(pool: &PgPool, row: &DeviceRow) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO devices
         (device_id, display_name, token_fingerprint, token_hash, heartbeat_interval_s,
          offline_after_s, enabled, operation_mode, sleep_poll_interval_s,
          alerts_muted_until, alerts_muted_reason, last_seen_at, created_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)",
    )
    .bind(&row.device_id)
    .bind(&row.display_name)
    .bind(&row.token_fingerprint)
    .bind(&row.token_hash)
    .bind(row.heartbeat_interval_s)
    .bind(row.offline_after_s)
    .bind(row.enabled)
    .bind(&row.operation_mode)
    .bind(row.sleep_poll_interval_s)
    .bind(row.alerts_muted_until)
    .bind(&row.alerts_muted_reason)
    .bind(row.last_seen_at)
    .bind(row.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn update_controls(
    pool: &PgPool,
    device_id: &str,
    operation_mode: &str,
    sleep_poll_interval_s: i32,
    alerts_muted_until: Option<DateTime<Utc>>,
    alerts_muted_reason: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE devices SET operation_mode = $1, sleep_poll_interval_s = $2,
         alerts_muted_until = $3, alerts_muted_reason = $4 WHERE device_id = $5",
    )
    .bind(operation_mode)
    .bind(sleep_poll_interval_s)
    .bind(alerts_muted_until)
    .bind(alerts_muted_reason)
    .bind(device_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Takes any executor (pool, connection, or transaction) so callers
/// that need it alongside other writes in the same transaction — the
/// ingest lineage path chief among them — can pass `&mut *tx`.
pub async fn touch_last_seen<'e, E>(
    executor: E,
    device_id: &str,
    latest_ts: DateTime<Utc>,
) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        "UPDATE devices SET last_seen_at = GREATEST(COALESCE(last_seen_at, $1), $1) WHERE device_id = $2",
    )
    .bind(latest_ts)
    .bind(device_id)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn set_enabled(pool: &PgPool, device_id: &str, enabled: bool) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE devices SET enabled = $1 WHERE device_id = $2")
        .bind(enabled)
        .bind(device_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// The admin-editable registry fields (distinct from `update_controls`,
/// which covers the operator-facing controls fields).
pub async fn update_admin_fields(
    pool: &PgPool,
    device_id: &str,
    display_name: &str,
    heartbeat_interval_s: i32,
    offline_after_s: i32,
    enabled: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE devices SET display_name = $1, heartbeat_interval_s = $2,
         offline_after_s = $3, enabled = $4 WHERE device_id = $5",
    )
    .bind(display_name)
    .bind(heartbeat_interval_s)
    .bind(offline_after_s)
    .bind(enabled)
    .bind(device_id)
    .execute(pool)
    .await?;
    Ok(())
}
