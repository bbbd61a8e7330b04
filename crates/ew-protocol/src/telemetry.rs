use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single metric reading. Untagged so the wire form is a plain
/// dynamic metric map: `{"water_pressure_psi": 40.0, "pump_on": true}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Bool(bool),
    Text(String),
    Null,
}

impl MetricValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            MetricValue::Number(_) => "number",
            MetricValue::Bool(_) => "boolean",
            MetricValue::Text(_) => "string",
            MetricValue::Null => "null",
        }
    }

    /// The runtime type token as it appears in a contract validation
    /// error's "but got '...'" clause, matching `original_source`
    /// `contracts.py`'s `type(v).__name__` (`str`, `bool`, `float`).
    pub fn python_type_name(&self) -> &'static str {
        match self {
            MetricValue::Number(_) => "float",
            MetricValue::Bool(_) => "bool",
            MetricValue::Text(_) => "str",
            MetricValue::Null => "NoneType",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// One sample from an edge device, not yet assigned a server id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryPointInput {
    pub message_id: String,
    pub ts: DateTime<Utc>,
    pub metrics: std::collections::BTreeMap<String, MetricValue>,
}

/// A persisted telemetry point. Immutable
/// after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryPoint {
    pub device_id: String,
    pub message_id: String,
    pub ts: DateTime<Utc>,
    pub metrics: std::collections::BTreeMap<String, MetricValue>,
    pub batch_id: uuid::Uuid,
    pub created_at: DateTime<Utc>,
}

/// Request body for `POST /ingest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub points: Vec<TelemetryPointInput>,
}

/// Response body for `POST /ingest` (direct mode carries real counts;
/// queued mode returns the optimistic accepted count before async
/// processing runs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub batch_id: uuid::Uuid,
    pub submitted: usize,
    pub accepted: usize,
    pub duplicates: usize,
    pub quarantined: usize,
    pub unknown_metric_keys: Vec<String>,
    pub processing_status: ProcessingStatus,
}

/// Which lane accepted the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    Direct,
    Pubsub,
    Simulation,
}

/// Where a batch originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestSource {
    Device,
    Replay,
    Pubsub,
    Backfill,
}

/// Terminal/non-terminal lifecycle of an `IngestionBatch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Queued,
    Completed,
    Rejected,
    PublishFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_value_number_roundtrip() {
        let v = MetricValue::Number(40.5);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "40.5");
        let back: MetricValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn metric_value_bool_is_not_number() {
        let v: MetricValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, MetricValue::Bool(true));
        assert_eq!(v.type_name(), "boolean");
    }

    #[test]
    fn metric_value_null_accepted() {
        let v: MetricValue = serde_json::from_str("null").unwrap();
        assert_eq!(v, MetricValue::Null);
    }

    #[test]
    fn ingest_request_deserializes_dynamic_metrics() {
        let body = r#"{"points":[{"message_id":"m-1","ts":"2026-01-01T00:00:00Z","metrics":{"water_pressure_psi":40.0,"pump_on":true,"device_state":"idle"}}]}"#;
        let req: IngestRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.points.len(), 1);
        let metrics = &req.points[0].metrics;
        assert_eq!(metrics["water_pressure_psi"], MetricValue::Number(40.0));
        assert_eq!(metrics["pump_on"], MetricValue::Bool(true));
        assert_eq!(
            metrics["device_state"],
            MetricValue::Text("idle".to_string())
        );
    }

    #[test]
    fn processing_status_serialization() {
        assert_eq!(
            serde_json::to_string(&ProcessingStatus::PublishFailed).unwrap(),
            r#""publish_failed""#
        );
    }
}
