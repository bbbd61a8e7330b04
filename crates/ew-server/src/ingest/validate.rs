//! Contract validation, stage (a) of the ingest pipeline.

use ew_protocol::contract::{TelemetryContract, TypeMismatchPolicy, UnknownKeyPolicy};
use ew_protocol::telemetry::TelemetryPointInput;
use std::collections::BTreeSet;

/// A point that failed a known-key type check under `quarantine` policy.
pub struct QuarantinedInput {
    pub point: TelemetryPointInput,
    pub errors: Vec<String>,
}

/// Outcome of validating an entire batch against the contract.
pub enum Validated {
    /// `type_mismatch_policy = reject` and at least one point failed;
    /// nothing in the batch is persisted.
    Rejected { errors: Vec<String>, total_errors: usize },
    Processed {
        accepted: Vec<TelemetryPointInput>,
        quarantined: Vec<QuarantinedInput>,
        unknown_metric_keys: BTreeSet<String>,
    },
}

const MAX_REJECT_ERRORS: usize = 10;

pub fn validate(contract: &TelemetryContract, points: Vec<TelemetryPointInput>) -> Validated {
    let mut reject_errors = Vec::new();
    let mut unknown_metric_keys = BTreeSet::new();

    for point in &points {
        for (key, value) in &point.metrics {
            match contract.metrics.get(key) {
                Some(spec) => {
                    if !spec.ty.matches(value) {
                        reject_errors.push(format!(
                            "metric '{}' expected type '{}' but got '{}'",
                            key,
                            spec.ty.as_str(),
                            value.python_type_name()
                        ));
                    }
                }
                None => {
                    unknown_metric_keys.insert(key.clone());
                }
            }
        }
    }

    if contract.type_mismatch_policy == TypeMismatchPolicy::Reject && !reject_errors.is_empty() {
        let total_errors = reject_errors.len();
        reject_errors.truncate(MAX_REJECT_ERRORS);
        return Validated::Rejected { errors: reject_errors, total_errors };
    }

    if contract.unknown_key_policy == UnknownKeyPolicy::Flag {
        for key in &unknown_metric_keys {
            tracing::warn!(metric_key = %key, "unknown metric key flagged by contract drift policy");
        }
    }

    let mut accepted = Vec::with_capacity(points.len());
    let mut quarantined = Vec::new();

    for point in points {
        let mut errors = Vec::new();
        for (key, value) in &point.metrics {
            if let Some(spec) = contract.metrics.get(key) {
                if !spec.ty.matches(value) {
                    errors.push(format!(
                        "metric '{}' expected type '{}' but got '{}'",
                        key,
                        spec.ty.as_str(),
                        value.python_type_name()
                    ));
                }
            }
        }
        if errors.is_empty() {
            accepted.push(point);
        } else {
            quarantined.push(QuarantinedInput { point, errors });
        }
    }

    Validated::Processed { accepted, quarantined, unknown_metric_keys }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ew_protocol::telemetry::MetricValue;
    use std::collections::BTreeMap;

    fn contract() -> TelemetryContract {
        TelemetryContract::from_yaml(
            r#"
version: v1
unknown_key_policy: allow
type_mismatch_policy: quarantine
metrics:
  water_pressure_psi: {type: number}
  pump_on: {type: boolean}
"#,
        )
        .unwrap()
    }

    fn point(message_id: &str, metrics: &[(&str, MetricValue)]) -> TelemetryPointInput {
        TelemetryPointInput {
            message_id: message_id.to_string(),
            ts: Utc::now(),
            metrics: metrics.iter().cloned().map(|(k, v)| (k.to_string(), v)).collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn accepts_matching_types() {
        let c = contract();
        let points = vec![point("m1", &[("water_pressure_psi", MetricValue::Number(40.0))])];
        match validate(&c, points) {
            Validated::Processed { accepted, quarantined, .. } => {
                assert_eq!(accepted.len(), 1);
                assert!(quarantined.is_empty());
            }
            _ => panic!("expected Processed"),
        }
    }

    #[test]
    fn quarantines_type_mismatch_under_quarantine_policy() {
        let c = contract();
        let points = vec![point("m1", &[("water_pressure_psi", MetricValue::Bool(true))])];
        match validate(&c, points) {
            Validated::Processed { accepted, quarantined, .. } => {
                assert!(accepted.is_empty());
                assert_eq!(quarantined.len(), 1);
            }
            _ => panic!("expected Processed"),
        }
    }

    #[test]
    fn quarantine_error_message_matches_contract_literal_format() {
        let c = contract();
        let points = vec![point("m1", &[("water_pressure_psi", MetricValue::Text("42".to_string()))])];
        match validate(&c, points) {
            Validated::Processed { quarantined, .. } => {
                assert_eq!(
                    quarantined[0].errors,
                    vec!["metric 'water_pressure_psi' expected type 'number' but got 'str'"]
                );
            }
            _ => panic!("expected Processed"),
        }
    }

    #[test]
    fn rejects_whole_batch_under_reject_policy() {
        let c = TelemetryContract::from_yaml(
            r#"
version: v1
type_mismatch_policy: reject
metrics:
  water_pressure_psi: {type: number}
"#,
        )
        .unwrap();
        let points = vec![point("m1", &[("water_pressure_psi", MetricValue::Bool(true))])];
        match validate(&c, points) {
            Validated::Rejected { errors, total_errors } => {
                assert_eq!(total_errors, 1);
                assert_eq!(errors.len(), 1);
            }
            _ => panic!("expected Rejected"),
        }
    }

    #[test]
    fn null_always_accepted() {
        let c = contract();
        let points = vec![point("m1", &[("water_pressure_psi", MetricValue::Null)])];
        match validate(&c, points) {
            Validated::Processed { accepted, .. } => assert_eq!(accepted.len(), 1),
            _ => panic!("expected Processed"),
        }
    }

    #[test]
    fn unknown_key_recorded_and_allowed() {
        let c = contract();
        let points = vec![point("m1", &[("mystery_field", MetricValue::Number(1.0))])];
        match validate(&c, points) {
            Validated::Processed { accepted, unknown_metric_keys, .. } => {
                assert_eq!(accepted.len(), 1);
                assert!(unknown_metric_keys.contains("mystery_field"));
            }
            _ => panic!("expected Processed"),
        }
    }
}
