//! `IngestionBatch` lineage bookkeeping.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IngestionBatchRow {
    pub id: Uuid,
    pub device_id: String,
    pub submitted: i32,
    pub accepted: i32,
    pub duplicates: i32,
    pub quarantined: i32,
    pub unknown_metric_keys: serde_json::Value,
    pub contract_sha256: String,
    pub ingest_source: String,
    pub pipeline_mode: String,
    pub processing_status: String,
    pub created_at: DateTime<Utc>,
}

/// Create-or-update the lineage row by `id`. The direct pipeline
/// creates it once per batch; the pubsub pipeline creates it `queued`
/// at request time and the push-worker replay updates the same row in
/// place once processing completes — `ON CONFLICT` makes the second
/// call idempotent instead of racing the row's own primary key.
/// Takes any executor so the direct-mode caller can run it inside the
/// same transaction as the telemetry/quarantine inserts it precedes.
#[allow(clippy::too_many_arguments)]
pub async fn upsert<'e, E>(executor: E, row: &IngestionBatchRow) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        "INSERT INTO ingestion_batches
         (id, device_id, submitted, accepted, duplicates, quarantined, unknown_metric_keys,
          contract_sha256, ingest_source, pipeline_mode, processing_status, created_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
         ON CONFLICT (id) DO UPDATE SET
            submitted = EXCLUDED.submitted,
            accepted = EXCLUDED.accepted,
            duplicates = EXCLUDED.duplicates,
            quarantined = EXCLUDED.quarantined,
            unknown_metric_keys = EXCLUDED.unknown_metric_keys,
            contract_sha256 = EXCLUDED.contract_sha256,
            ingest_source = EXCLUDED.ingest_source,
            pipeline_mode = EXCLUDED.pipeline_mode,
            processing_status = EXCLUDED.processing_status",
    )
    .bind(row.id)
    .bind(&row.device_id)
    .bind(row.submitted)
    .bind(row.accepted)
    .bind(row.duplicates)
    .bind(row.quarantined)
    .bind(&row.unknown_metric_keys)
    .bind(&row.contract_sha256)
    .bind(&row.ingest_source)
    .bind(&row.pipeline_mode)
    .bind(&row.processing_status)
    .bind(row.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn set_accepted_count<'e, E>(
    executor: E,
    id: Uuid,
    accepted: i32,
) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query("UPDATE ingestion_batches SET accepted = $1 WHERE id = $2")
        .bind(accepted)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn set_processing_status(
    pool: &PgPool,
    id: Uuid,
    status: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE ingestion_batches SET processing_status = $1 WHERE id = $2")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Option<IngestionBatchRow>, sqlx::Error> {
    sqlx::query_as::<_, IngestionBatchRow>("SELECT * FROM ingestion_batches WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}
