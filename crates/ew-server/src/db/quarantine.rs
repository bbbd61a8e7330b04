//! Quarantined telemetry points that failed contract validation.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QuarantinedPointRow {
    pub id: Uuid,
    pub device_id: String,
    pub message_id: String,
    pub ts: DateTime<Utc>,
    pub metrics: serde_json::Value,
    pub errors: serde_json::Value,
    pub batch_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Takes any executor so the ingest lineage path can insert quarantined
/// points in the same transaction as the batch and telemetry rows.
pub async fn insert<'e, E>(executor: E, row: &QuarantinedPointRow) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        "INSERT INTO quarantined_points
         (id, device_id, message_id, ts, metrics, errors, batch_id, created_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8)",
    )
    .bind(row.id)
    .bind(&row.device_id)
    .bind(&row.message_id)
    .bind(row.ts)
    .bind(&row.metrics)
    .bind(&row.errors)
    .bind(row.batch_id)
    .bind(row.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Batched delete mirroring `db::telemetry::delete_older_than`.
pub async fn delete_older_than(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
    batch_size: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "WITH doomed AS (
            SELECT id FROM quarantined_points WHERE ts < $1 ORDER BY ts ASC LIMIT $2
         )
         DELETE FROM quarantined_points
         USING doomed
         WHERE quarantined_points.id = doomed.id",
    )
    .bind(cutoff)
    .bind(batch_size)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn list_for_device(
    pool: &PgPool,
    device_id: &str,
    limit: i64,
) -> Result<Vec<QuarantinedPointRow>, sqlx::Error> {
    sqlx::query_as::<_, QuarantinedPointRow>(
        "SELECT * FROM quarantined_points WHERE device_id = $1 ORDER BY created_at DESC LIMIT $2",
    )
    .bind(device_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}
