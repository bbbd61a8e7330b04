//! Stage (c): persist the accepted/quarantined points, the
//! `IngestionBatch` lineage row, and advance `Device.last_seen_at`.

use chrono::{DateTime, Utc};
use ew_protocol::telemetry::{IngestSource, PipelineMode, ProcessingStatus, TelemetryPointInput};
use sqlx::PgPool;
use uuid::Uuid;

use super::validate::QuarantinedInput;
use crate::db;

pub struct PersistOutcome {
    pub accepted_message_ids: Vec<String>,
    pub quarantined_count: usize,
}

#[allow(clippy::too_many_arguments)]
pub async fn persist(
    pool: &PgPool,
    batch_id: Uuid,
    device_id: &str,
    submitted: usize,
    accepted: Vec<TelemetryPointInput>,
    quarantined: Vec<QuarantinedInput>,
    duplicates: usize,
    unknown_metric_keys: &[String],
    contract_sha256: &str,
    source: IngestSource,
    mode: PipelineMode,
    status: ProcessingStatus,
    now: DateTime<Utc>,
) -> Result<PersistOutcome, sqlx::Error> {
    let mut latest_ts: Option<DateTime<Utc>> = None;
    let rows: Vec<db::telemetry::TelemetryPointRow> = accepted
        .iter()
        .map(|p| {
            latest_ts = Some(latest_ts.map_or(p.ts, |t| t.max(p.ts)));
            db::telemetry::TelemetryPointRow {
                device_id: device_id.to_string(),
                message_id: p.message_id.clone(),
                ts: p.ts,
                metrics: serde_json::to_value(&p.metrics).unwrap_or(serde_json::Value::Null),
                batch_id,
                created_at: now,
            }
        })
        .collect();

    // The batch row is the FK target of every telemetry/quarantine row
    // below, so it has to exist first — insert (or, on pubsub replay,
    // update) it before anything that references `batch_id`, all in one
    // transaction so a mid-batch failure leaves neither half committed.
    let mut tx = pool.begin().await?;

    db::batches::upsert(
        &mut *tx,
        &db::batches::IngestionBatchRow {
            id: batch_id,
            device_id: device_id.to_string(),
            submitted: submitted as i32,
            accepted: rows.len() as i32,
            duplicates: duplicates as i32,
            quarantined: quarantined.len() as i32,
            unknown_metric_keys: serde_json::to_value(unknown_metric_keys)
                .unwrap_or(serde_json::Value::Null),
            contract_sha256: contract_sha256.to_string(),
            ingest_source: source_code(source).to_string(),
            pipeline_mode: mode_code(mode).to_string(),
            processing_status: status_code(status).to_string(),
            created_at: now,
        },
    )
    .await?;

    let accepted_message_ids = db::telemetry::insert_batch_idempotent(&mut tx, &rows).await?;

    for q in &quarantined {
        db::quarantine::insert(
            &mut *tx,
            &db::quarantine::QuarantinedPointRow {
                id: Uuid::now_v7(),
                device_id: device_id.to_string(),
                message_id: q.point.message_id.clone(),
                ts: q.point.ts,
                metrics: serde_json::to_value(&q.point.metrics).unwrap_or(serde_json::Value::Null),
                errors: serde_json::to_value(&q.errors).unwrap_or(serde_json::Value::Null),
                batch_id,
                created_at: now,
            },
        )
        .await?;
    }

    if let Some(ts) = latest_ts {
        db::devices::touch_last_seen(&mut *tx, device_id, ts).await?;
    }

    // The batch row above was written with `rows.len()`, before the
    // DB-level idempotent insert ran; correct it to the count that
    // insert actually accepted (it can differ under a request racing
    // this one for the same message_id — the app-level dedupe check in
    // `ingest/mod.rs` isn't atomic with the insert, `ON CONFLICT` is).
    db::batches::set_accepted_count(&mut *tx, batch_id, accepted_message_ids.len() as i32).await?;

    tx.commit().await?;

    Ok(PersistOutcome {
        quarantined_count: quarantined.len(),
        accepted_message_ids,
    })
}

pub fn source_code(source: IngestSource) -> &'static str {
    match source {
        IngestSource::Device => "device",
        IngestSource::Replay => "replay",
        IngestSource::Pubsub => "pubsub",
        IngestSource::Backfill => "backfill",
    }
}

pub fn mode_code(mode: PipelineMode) -> &'static str {
    match mode {
        PipelineMode::Direct => "direct",
        PipelineMode::Pubsub => "pubsub",
        PipelineMode::Simulation => "simulation",
    }
}

pub fn status_code(status: ProcessingStatus) -> &'static str {
    match status {
        ProcessingStatus::Pending => "pending",
        ProcessingStatus::Queued => "queued",
        ProcessingStatus::Completed => "completed",
        ProcessingStatus::Rejected => "rejected",
        ProcessingStatus::PublishFailed => "publish_failed",
    }
}
