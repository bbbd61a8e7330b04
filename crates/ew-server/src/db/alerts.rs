//! Alert persistence, backing the hysteresis evaluator.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AlertRow {
    pub id: Uuid,
    pub device_id: String,
    pub alert_type: String,
    pub severity: String,
    pub status: String,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub last_value: Option<f64>,
}

pub async fn find_open(
    pool: &PgPool,
    device_id: &str,
    alert_type: &str,
) -> Result<Option<AlertRow>, sqlx::Error> {
    sqlx::query_as::<_, AlertRow>(
        "SELECT * FROM alerts WHERE device_id = $1 AND alert_type = $2 AND status = 'open'",
    )
    .bind(device_id)
    .bind(alert_type)
    .fetch_optional(pool)
    .await
}

pub async fn open(
    pool: &PgPool,
    id: Uuid,
    device_id: &str,
    alert_type: &str,
    severity: &str,
    opened_at: DateTime<Utc>,
    last_value: Option<f64>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO alerts (id, device_id, alert_type, severity, status, opened_at, last_value)
         VALUES ($1,$2,$3,$4,'open',$5,$6)",
    )
    .bind(id)
    .bind(device_id)
    .bind(alert_type)
    .bind(severity)
    .bind(opened_at)
    .bind(last_value)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn resolve(pool: &PgPool, id: Uuid, resolved_at: DateTime<Utc>) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE alerts SET status = 'resolved', resolved_at = $1 WHERE id = $2")
        .bind(resolved_at)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn list(
    pool: &PgPool,
    device_id: Option<&str>,
    open_only: bool,
    limit: i64,
) -> Result<Vec<AlertRow>, sqlx::Error> {
    match (device_id, open_only) {
        (Some(device_id), true) => {
            sqlx::query_as::<_, AlertRow>(
                "SELECT * FROM alerts WHERE device_id = $1 AND status = 'open'
                 ORDER BY opened_at DESC LIMIT $2",
            )
            .bind(device_id)
            .bind(limit)
            .fetch_all(pool)
            .await
        }
        (Some(device_id), false) => {
            sqlx::query_as::<_, AlertRow>(
                "SELECT * FROM alerts WHERE device_id = $1 ORDER BY opened_at DESC LIMIT $2",
            )
            .bind(device_id)
            .bind(limit)
            .fetch_all(pool)
            .await
        }
        (None, true) => {
            sqlx::query_as::<_, AlertRow>(
                "SELECT * FROM alerts WHERE status = 'open' ORDER BY opened_at DESC LIMIT $1",
            )
            .bind(limit)
            .fetch_all(pool)
            .await
        }
        (None, false) => {
            sqlx::query_as::<_, AlertRow>("SELECT * FROM alerts ORDER BY opened_at DESC LIMIT $1")
                .bind(limit)
                .fetch_all(pool)
                .await
        }
    }
}
