use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommandRow {
    pub id: Uuid,
    pub device_id: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub superseded_at: Option<DateTime<Utc>>,
}

pub async fn find_pending_for_device(
    pool: &PgPool,
    device_id: &str,
) -> Result<Option<CommandRow>, sqlx::Error> {
    sqlx::query_as::<_, CommandRow>(
        "SELECT * FROM device_control_commands WHERE device_id = $1 AND status = 'pending'",
    )
    .bind(device_id)
    .fetch_optional(pool)
    .await
}

pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Option<CommandRow>, sqlx::Error> {
    sqlx::query_as::<_, CommandRow>("SELECT * FROM device_control_commands WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// A new command always supersedes whatever else is pending for the
/// device before it is inserted, so the partial unique index on
/// `(device_id) WHERE status = 'pending'` never trips.
pub async fn enqueue(
    pool: &PgPool,
    id: Uuid,
    device_id: &str,
    payload: &serde_json::Value,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        "UPDATE device_control_commands SET status = 'superseded', superseded_at = $2
         WHERE device_id = $1 AND status = 'pending'",
    )
    .bind(device_id)
    .bind(created_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO device_control_commands
         (id, device_id, payload, status, created_at, expires_at, acknowledged_at)
         VALUES ($1,$2,$3,'pending',$4,$5,NULL)",
    )
    .bind(id)
    .bind(device_id)
    .bind(payload)
    .bind(created_at)
    .bind(expires_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await
}

pub async fn ack(
    pool: &PgPool,
    id: Uuid,
    acknowledged_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE device_control_commands
         SET status = 'acknowledged', acknowledged_at = $1
         WHERE id = $2 AND status = 'pending'",
    )
    .bind(acknowledged_at)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Flip every pending command past its TTL to expired; returns the
/// affected device ids so callers can clear any cached ETag fragment.
pub async fn expire_due(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "UPDATE device_control_commands SET status = 'expired'
         WHERE status = 'pending' AND expires_at <= $1
         RETURNING device_id",
    )
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(device_id,)| device_id).collect())
}

pub async fn list_recent(
    pool: &PgPool,
    device_id: &str,
    limit: i64,
) -> Result<Vec<CommandRow>, sqlx::Error> {
    sqlx::query_as::<_, CommandRow>(
        "SELECT * FROM device_control_commands WHERE device_id = $1
         ORDER BY created_at DESC LIMIT $2",
    )
    .bind(device_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}
