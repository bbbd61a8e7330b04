//! Stage (d): the `pubsub` pipeline mode. There is no external broker
//! in this deployment — "publish" hands the already-validated batch to
//! an in-process worker task that replays stages (b)+(c) exactly as
//! the push-worker HTTP endpoint would, so the two paths share one
//! idempotent implementation.

use chrono::{DateTime, Utc};
use ew_protocol::telemetry::{IngestSource, PipelineMode, ProcessingStatus, TelemetryPointInput};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::validate::{self, Validated};
use crate::db;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubsubMessage {
    pub batch_id: Uuid,
    pub device_id: String,
    pub contract_sha256: String,
    pub points: Vec<TelemetryPointInput>,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("pubsub topic not configured")]
    NotConfigured,
}

/// Orders the message's points by `ts`. Fails only when the topic is
/// unset, the one deterministic "broker down" condition this
/// deployment can model without a real queue.
pub fn publish(topic: Option<&str>, mut message: PubsubMessage) -> Result<PubsubMessage, PublishError> {
    let topic = topic.filter(|t| !t.is_empty()).ok_or(PublishError::NotConfigured)?;
    tracing::debug!(topic, batch_id = %message.batch_id, "publishing batch to pubsub topic");
    message.points.sort_by_key(|p| p.ts);
    Ok(message)
}

/// Push-worker replay: validates, dedupes and persists a message
/// exactly like the direct path. Idempotent — a redelivered message_id
/// is simply absent from the accepted set the second time.
pub async fn replay(
    pool: &PgPool,
    contract: &ew_protocol::contract::TelemetryContract,
    message: PubsubMessage,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    let submitted = message.points.len();
    let message_ids: Vec<String> = message.points.iter().map(|p| p.message_id.clone()).collect();
    let already_seen = db::idempotency::already_seen(pool, &message.device_id, &message_ids).await?;

    let (accepted, quarantined, unknown_keys) = match validate::validate(contract, message.points) {
        Validated::Rejected { .. } => {
            db::batches::set_processing_status(pool, message.batch_id, "rejected").await?;
            return Ok(());
        }
        Validated::Processed { accepted, quarantined, unknown_metric_keys } => {
            (accepted, quarantined, unknown_metric_keys)
        }
    };

    let deduped = super::idempotency::partition(accepted, quarantined, &already_seen);
    let unknown_keys: Vec<String> = unknown_keys.into_iter().collect();

    super::lineage::persist(
        pool,
        message.batch_id,
        &message.device_id,
        submitted,
        deduped.accepted,
        deduped.quarantined,
        deduped.duplicates,
        &unknown_keys,
        &message.contract_sha256,
        IngestSource::Pubsub,
        PipelineMode::Pubsub,
        ProcessingStatus::Completed,
        now,
    )
    .await?;

    db::batches::set_processing_status(pool, message.batch_id, "completed").await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn message(points: Vec<TelemetryPointInput>) -> PubsubMessage {
        PubsubMessage {
            batch_id: Uuid::now_v7(),
            device_id: "dev-1".into(),
            contract_sha256: "abc".into(),
            points,
        }
    }

    #[test]
    fn publish_without_topic_fails() {
        let points = vec![TelemetryPointInput {
            message_id: "m1".into(),
            ts: Utc::now(),
            metrics: BTreeMap::new(),
        }];
        assert!(matches!(publish(None, message(points)), Err(PublishError::NotConfigured)));
    }

    #[test]
    fn publish_orders_points_by_ts() {
        let now = Utc::now();
        let points = vec![
            TelemetryPointInput { message_id: "later".into(), ts: now + chrono::Duration::seconds(5), metrics: BTreeMap::new() },
            TelemetryPointInput { message_id: "earlier".into(), ts: now, metrics: BTreeMap::new() },
        ];
        let result = publish(Some("topic"), message(points)).unwrap();
        assert_eq!(result.points[0].message_id, "earlier");
        assert_eq!(result.points[1].message_id, "later");
    }
}
