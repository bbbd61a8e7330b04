//! Notification destinations and delivery event bookkeeping.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DestinationRow {
    pub id: Uuid,
    pub name: String,
    pub kind: String,
    pub webhook_url: String,
    pub destination_fingerprint: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NotificationEventRow {
    pub id: Uuid,
    pub device_id: String,
    pub alert_type: String,
    pub destination_fingerprint: String,
    pub decision: String,
    pub delivered: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Inserts a single generic webhook destination from
/// `ALERT_WEBHOOK_URL` if the table is still empty, so a server started
/// with only that env var set has somewhere to route alerts without an
/// operator first calling the destinations admin API. A no-op once any
/// destination (env-seeded or operator-added) already exists.
pub async fn ensure_default_destination(pool: &PgPool, webhook_url: &str) -> Result<(), sqlx::Error> {
    let fingerprint = ew_notify::destination_fingerprint(webhook_url);
    sqlx::query(
        "INSERT INTO notification_destinations (id, name, kind, webhook_url, destination_fingerprint)
         VALUES ($1, 'default', 'generic', $2, $3)
         ON CONFLICT (destination_fingerprint) DO NOTHING",
    )
    .bind(Uuid::now_v7())
    .bind(webhook_url)
    .bind(fingerprint)
    .execute(pool)
    .await?;
    Ok(())
}

/// Enabled destinations, oldest-first, matching `notifications.py`'s
/// `_configured_destinations`.
pub async fn list_enabled(pool: &PgPool) -> Result<Vec<DestinationRow>, sqlx::Error> {
    sqlx::query_as::<_, DestinationRow>(
        "SELECT * FROM notification_destinations WHERE enabled = TRUE ORDER BY created_at ASC",
    )
    .fetch_all(pool)
    .await
}

#[allow(clippy::too_many_arguments)]
pub async fn record_event(
    pool: &PgPool,
    id: Uuid,
    device_id: &str,
    alert_type: &str,
    destination_fingerprint: &str,
    decision: &str,
    delivered: bool,
    error: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO notification_events
         (id, device_id, alert_type, destination_fingerprint, decision, delivered, error)
         VALUES ($1,$2,$3,$4,$5,$6,$7)",
    )
    .bind(id)
    .bind(device_id)
    .bind(alert_type)
    .bind(destination_fingerprint)
    .bind(decision)
    .bind(delivered)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(())
}

/// Any `delivered=true` event for `(device_id, alert_type)` within the
/// dedupe window.
pub async fn has_recent_delivered(
    pool: &PgPool,
    device_id: &str,
    alert_type: &str,
    since: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let exists: (bool,) = sqlx::query_as(
        "SELECT EXISTS(
            SELECT 1 FROM notification_events
            WHERE device_id = $1 AND alert_type = $2 AND delivered = TRUE AND created_at >= $3
         )",
    )
    .bind(device_id)
    .bind(alert_type)
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(exists.0)
}

/// Count of `delivered=true` events for a device within the throttle
/// window.
pub async fn count_recent_delivered(
    pool: &PgPool,
    device_id: &str,
    since: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM notification_events
         WHERE device_id = $1 AND delivered = TRUE AND created_at >= $2",
    )
    .bind(device_id)
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}
