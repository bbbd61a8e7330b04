//! Telemetry point storage and the idempotent insert the ingest
//! pipeline depends on.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TelemetryPointRow {
    pub device_id: String,
    pub message_id: String,
    pub ts: DateTime<Utc>,
    pub metrics: serde_json::Value,
    pub batch_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// `INSERT ... ON CONFLICT DO NOTHING RETURNING message_id` — the
/// accepted set.2(b). Runs against a caller-supplied connection (a
/// transaction's, in practice) rather than opening its own, so the
/// ingest lineage path can insert the batch row, these rows, and the
/// quarantine rows as one atomic unit instead of three.
pub async fn insert_batch_idempotent(
    conn: &mut sqlx::PgConnection,
    rows: &[TelemetryPointRow],
) -> Result<Vec<String>, sqlx::Error> {
    let mut accepted = Vec::with_capacity(rows.len());
    for row in rows {
        let result: Option<(String,)> = sqlx::query_as(
            "INSERT INTO telemetry_points (device_id, message_id, ts, metrics, batch_id, created_at)
             VALUES ($1,$2,$3,$4,$5,$6)
             ON CONFLICT (device_id, message_id) DO NOTHING
             RETURNING message_id",
        )
        .bind(&row.device_id)
        .bind(&row.message_id)
        .bind(row.ts)
        .bind(&row.metrics)
        .bind(row.batch_id)
        .bind(row.created_at)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some((message_id,)) = result {
            accepted.push(message_id);
        }
    }
    Ok(accepted)
}

/// Deletes up to `batch_size` rows older than `cutoff`, oldest first.
/// Batched per `retention.py`'s `_delete_cte_batched` so a single
/// sweep never holds a lock over the whole table.
pub async fn delete_older_than(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
    batch_size: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "WITH doomed AS (
            SELECT device_id, message_id FROM telemetry_points
            WHERE ts < $1 ORDER BY ts ASC LIMIT $2
         )
         DELETE FROM telemetry_points
         USING doomed
         WHERE telemetry_points.device_id = doomed.device_id
           AND telemetry_points.message_id = doomed.message_id",
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
) -> Result<Vec<TelemetryPointRow>, sqlx::Error> {
    sqlx::query_as::<_, TelemetryPointRow>(
        "SELECT * FROM telemetry_points WHERE device_id = $1 ORDER BY ts DESC LIMIT $2",
    )
    .bind(device_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}
