//! The ingest pipeline: validation, idempotency, lineage, pipeline-mode
//! dispatch, and the alert-evaluation side effect (spec.md §4.2).

pub mod idempotency;
pub mod lineage;
pub mod pubsub;
pub mod validate;

use chrono::{DateTime, Utc};
use ew_protocol::contract::TelemetryContract;
use ew_protocol::policy::EdgePolicy;
use ew_protocol::telemetry::{
    IngestRequest, IngestResponse, IngestSource, PipelineMode, ProcessingStatus,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::alerts;
use crate::config::{IngestPipelineMode, ServerConfig};
use crate::db;
use crate::error::{ApiError, ApiResult};

const MAX_REJECT_ERRORS_SHOWN: usize = 10;

pub async fn ingest(
    pool: &PgPool,
    config: &ServerConfig,
    contract: &TelemetryContract,
    contract_sha256: &str,
    policy: &EdgePolicy,
    device_id: &str,
    request: IngestRequest,
    now: DateTime<Utc>,
) -> ApiResult<IngestResponse> {
    let submitted = request.points.len();
    if submitted > config.max_points_per_request {
        return Err(ApiError::Validation(format!(
            "batch carries {submitted} points, exceeds max_points_per_request ({})",
            config.max_points_per_request
        )));
    }

    let batch_id = Uuid::now_v7();
    let message_ids: Vec<String> = request.points.iter().map(|p| p.message_id.clone()).collect();
    let already_seen = db::idempotency::already_seen(pool, device_id, &message_ids).await?;

    let (accepted, quarantined, unknown_keys) = match validate::validate(contract, request.points) {
        validate::Validated::Rejected { errors, total_errors } => {
            db::batches::upsert(
                pool,
                &db::batches::IngestionBatchRow {
                    id: batch_id,
                    device_id: device_id.to_string(),
                    submitted: submitted as i32,
                    accepted: 0,
                    duplicates: 0,
                    quarantined: 0,
                    unknown_metric_keys: serde_json::Value::Array(vec![]),
                    contract_sha256: contract_sha256.to_string(),
                    ingest_source: lineage::source_code(IngestSource::Device).to_string(),
                    pipeline_mode: lineage::mode_code(pipeline_mode(config)).to_string(),
                    processing_status: lineage::status_code(ProcessingStatus::Rejected).to_string(),
                    created_at: now,
                },
            )
            .await?;

            let shown = errors.len().min(MAX_REJECT_ERRORS_SHOWN);
            return Err(ApiError::ContractRejection(format!(
                "{total_errors} validation error(s), showing {shown}: {}",
                errors.join("; ")
            )));
        }
        validate::Validated::Processed { accepted, quarantined, unknown_metric_keys } => {
            (accepted, quarantined, unknown_metric_keys)
        }
    };

    let unknown_keys: Vec<String> = unknown_keys.into_iter().collect();
    let deduped = idempotency::partition(accepted, quarantined, &already_seen);
    let duplicates = deduped.duplicates;
    let quarantined_count = deduped.quarantined.len();

    match pipeline_mode(config) {
        IngestPipelineMode::Direct => {
            let accepted_points = deduped.accepted.clone();
            let outcome = lineage::persist(
                pool,
                batch_id,
                device_id,
                submitted,
                deduped.accepted,
                deduped.quarantined,
                duplicates,
                &unknown_keys,
                contract_sha256,
                IngestSource::Device,
                PipelineMode::Direct,
                ProcessingStatus::Completed,
                now,
            )
            .await?;

            evaluate_and_route(pool, config, device_id, &accepted_points, policy, now).await?;

            Ok(IngestResponse {
                batch_id,
                submitted,
                accepted: outcome.accepted_message_ids.len(),
                duplicates,
                quarantined: quarantined_count,
                unknown_metric_keys: unknown_keys,
                processing_status: ProcessingStatus::Completed,
            })
        }
        IngestPipelineMode::Pubsub => {
            let accepted_count = deduped.accepted.len();

            // The lineage row has to exist before anything FK-referencing
            // `batch_id` — the quarantine rows below, and later the
            // push-worker replay's telemetry inserts — so it's written
            // first, `queued`. `upsert` lets the replay update this same
            // row by `id` once it completes instead of re-inserting it.
            db::batches::upsert(
                pool,
                &db::batches::IngestionBatchRow {
                    id: batch_id,
                    device_id: device_id.to_string(),
                    submitted: submitted as i32,
                    accepted: accepted_count as i32,
                    duplicates: duplicates as i32,
                    quarantined: quarantined_count as i32,
                    unknown_metric_keys: serde_json::to_value(&unknown_keys)
                        .unwrap_or(serde_json::Value::Null),
                    contract_sha256: contract_sha256.to_string(),
                    ingest_source: lineage::source_code(IngestSource::Device).to_string(),
                    pipeline_mode: lineage::mode_code(PipelineMode::Pubsub).to_string(),
                    processing_status: lineage::status_code(ProcessingStatus::Queued).to_string(),
                    created_at: now,
                },
            )
            .await?;

            // Quarantined points persist synchronously — only the
            // accepted points' telemetry insert is deferred.
            for q in &deduped.quarantined {
                db::quarantine::insert(
                    pool,
                    &db::quarantine::QuarantinedPointRow {
                        id: Uuid::now_v7(),
                        device_id: device_id.to_string(),
                        message_id: q.point.message_id.clone(),
                        ts: q.point.ts,
                        metrics: serde_json::to_value(&q.point.metrics)
                            .unwrap_or(serde_json::Value::Null),
                        errors: serde_json::to_value(&q.errors).unwrap_or(serde_json::Value::Null),
                        batch_id,
                        created_at: now,
                    },
                )
                .await?;
            }

            let message = pubsub::PubsubMessage {
                batch_id,
                device_id: device_id.to_string(),
                contract_sha256: contract_sha256.to_string(),
                points: deduped.accepted,
            };

            let published = pubsub::publish(config.ingest_pubsub_topic.as_deref(), message);

            match published {
                Ok(message) => {
                    let pool = pool.clone();
                    let contract = contract.clone();
                    tokio::spawn(async move {
                        if let Err(err) = pubsub::replay(&pool, &contract, message, now).await {
                            tracing::error!(error = %err, "pubsub push-worker replay failed");
                        }
                    });

                    Ok(IngestResponse {
                        batch_id,
                        submitted,
                        accepted: accepted_count,
                        duplicates,
                        quarantined: quarantined_count,
                        unknown_metric_keys: unknown_keys,
                        processing_status: ProcessingStatus::Queued,
                    })
                }
                Err(_) => {
                    db::batches::set_processing_status(pool, batch_id, "publish_failed").await?;
                    Err(ApiError::PublishFailed)
                }
            }
        }
    }
}

async fn evaluate_and_route(
    pool: &PgPool,
    config: &ServerConfig,
    device_id: &str,
    points: &[ew_protocol::telemetry::TelemetryPointInput],
    policy: &EdgePolicy,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    let mut transitions = Vec::new();
    for point in points {
        transitions.extend(alerts::evaluate_point(pool, device_id, point, policy, now).await?);
    }
    alerts::route_transitions(pool, config, &transitions, now).await
}

fn pipeline_mode(config: &ServerConfig) -> IngestPipelineMode {
    config.ingest_pipeline_mode
}
