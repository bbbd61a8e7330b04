use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::telemetry::MetricValue;

/// Declared scalar type for a metric key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Number,
    Boolean,
    String,
}

impl MetricType {
    /// Whether `value` matches this declared type. `Null` always
    /// matches regardless of declared type.
    pub fn matches(&self, value: &MetricValue) -> bool {
        match (self, value) {
            (_, MetricValue::Null) => true,
            (MetricType::Number, MetricValue::Number(_)) => true,
            (MetricType::Boolean, MetricValue::Bool(_)) => true,
            (MetricType::String, MetricValue::Text(_)) => true,
            _ => false,
        }
    }

    /// The declared-type token as it appears in contract validation
    /// error messages (matches the YAML spelling: `number`/`boolean`/`string`).
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Number => "number",
            MetricType::Boolean => "boolean",
            MetricType::String => "string",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSpec {
    #[serde(rename = "type")]
    pub ty: MetricType,
    #[serde(default)]
    pub unit: Option<String>,
}

/// How to handle a metric key the contract has never seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnknownKeyPolicy {
    #[default]
    Allow,
    Flag,
}

/// How to handle a known key whose value doesn't match its declared
/// type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TypeMismatchPolicy {
    Reject,
    #[default]
    Quarantine,
}

/// The versioned telemetry contract. Loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryContract {
    pub version: String,
    pub metrics: BTreeMap<String, MetricSpec>,
    #[serde(default)]
    pub unknown_key_policy: UnknownKeyPolicy,
    #[serde(default)]
    pub type_mismatch_policy: TypeMismatchPolicy,
}

impl TelemetryContract {
    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    /// SHA-256 of the canonical document bytes, surfaced on every
    /// ingest lineage row.
    pub fn sha256(&self, raw_bytes: &[u8]) -> String {
        let digest = Sha256::digest(raw_bytes);
        hex_encode(&digest)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_contract() -> TelemetryContract {
        let yaml = r#"
version: v1
unknown_key_policy: flag
type_mismatch_policy: quarantine
metrics:
  water_pressure_psi: {type: number, unit: psi}
  pump_on: {type: boolean}
  device_state: {type: string}
"#;
        TelemetryContract::from_yaml(yaml).unwrap()
    }

    #[test]
    fn parses_metric_specs() {
        let contract = sample_contract();
        assert_eq!(contract.version, "v1");
        assert_eq!(contract.metrics.len(), 3);
        assert_eq!(
            contract.metrics["water_pressure_psi"].unit.as_deref(),
            Some("psi")
        );
    }

    #[test]
    fn type_matching_rules() {
        assert!(MetricType::Number.matches(&MetricValue::Number(1.0)));
        assert!(!MetricType::Number.matches(&MetricValue::Bool(true)));
        assert!(!MetricType::Number.matches(&MetricValue::Text("1".into())));
        assert!(MetricType::Number.matches(&MetricValue::Null));
        assert!(MetricType::Boolean.matches(&MetricValue::Bool(false)));
        assert!(!MetricType::Boolean.matches(&MetricValue::Number(0.0)));
    }

    #[test]
    fn sha256_is_deterministic() {
        let contract = sample_contract();
        let bytes = b"some canonical bytes";
        assert_eq!(contract.sha256(bytes), contract.sha256(bytes));
        assert_eq!(contract.sha256(bytes).len(), 64);
    }

    #[test]
    fn defaults_when_policies_omitted() {
        let yaml = r#"
version: v1
metrics:
  x: {type: number}
"#;
        let contract = TelemetryContract::from_yaml(yaml).unwrap();
        assert_eq!(contract.unknown_key_policy, UnknownKeyPolicy::Allow);
        assert_eq!(contract.type_mismatch_policy, TypeMismatchPolicy::Quarantine);
    }
}
