//! Loads the versioned telemetry contract document.

use ew_protocol::contract::TelemetryContract;

use crate::error::ApiError;

/// Default contract, embedded so the server boots without a mounted
/// config file.
pub const DEFAULT_CONTRACT_YAML: &str = r#"
version: v1
unknown_key_policy: flag
type_mismatch_policy: quarantine
metrics:
  water_pressure_psi: {type: number, unit: psi}
  oil_pressure_psi: {type: number, unit: psi}
  oil_level_pct: {type: number, unit: pct}
  oil_life_pct: {type: number, unit: pct}
  battery_v: {type: number, unit: v}
  signal_rssi_dbm: {type: number, unit: dbm}
  microphone_db: {type: number, unit: db}
  pump_on: {type: boolean}
  device_state: {type: string}
  power_input_v: {type: number, unit: v}
  power_input_watts: {type: number, unit: w}
"#;

pub fn load(path: Option<&str>) -> Result<(TelemetryContract, Vec<u8>), ApiError> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| ApiError::Internal(format!("failed to read telemetry contract: {e}")))?,
        None => DEFAULT_CONTRACT_YAML.to_string(),
    };
    let contract = TelemetryContract::from_yaml(&raw)
        .map_err(|e| ApiError::Internal(format!("invalid telemetry contract: {e}")))?;
    Ok((contract, raw.into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_contract_loads() {
        let (contract, bytes) = load(None).unwrap();
        assert_eq!(contract.version, "v1");
        assert!(contract.metrics.contains_key("water_pressure_psi"));
        assert!(!bytes.is_empty());
    }
}
