//! Loads the versioned edge policy document served via `/device-policy`.

use ew_protocol::policy::EdgePolicy;

use crate::error::ApiError;

pub const DEFAULT_POLICY_YAML: &str = r#"
version: v1
cache_max_age_s: 300
reporting:
  sample_interval_s: 300
  alert_sample_interval_s: 60
  heartbeat_interval_s: 300
  saver_sample_interval_s: 900
  saver_heartbeat_interval_s: 900
  max_points_per_batch: 200
  buffer_max_points: 50000
  buffer_max_age_s: 604800
  backoff_initial_s: 5.0
  backoff_max_s: 300.0
delta_thresholds: {}
alert_thresholds:
  water_pressure: {low: 30.0, recover: 32.0}
  oil_pressure: {low: 20.0, recover: 25.0}
  oil_level_pct: {low: 15.0, recover: 20.0}
  oil_life_pct: {low: 10.0, recover: 15.0}
  battery_v: {low: 11.5, recover: 12.0}
  signal_rssi_dbm: {low: -110.0, recover: -100.0}
  microphone_offline_db: -60.0
  microphone_offline_open_consecutive_samples: 3
  microphone_offline_resolve_consecutive_samples: 3
cost_caps:
  max_bytes_per_day: 5000000
  max_snapshots_per_day: 50
  max_media_uploads_per_day: 10
power_management:
  enabled: true
  input_warn_min_v: 11.0
  input_critical_min_v: 10.0
  max_input_watts: 15.0
  sustained_window_s: 1800
operation_defaults:
  control_command_ttl_s: 86400
  default_sleep_poll_interval_s: 604800
  disable_requires_manual_restart: false
  shutdown_gated: true
  default_shutdown_grace_s: 30
"#;

pub fn load(path: Option<&str>) -> Result<(EdgePolicy, Vec<u8>, String), ApiError> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| ApiError::Internal(format!("failed to read edge policy: {e}")))?,
        None => DEFAULT_POLICY_YAML.to_string(),
    };
    let policy = EdgePolicy::from_yaml(&raw)
        .map_err(|e| ApiError::Internal(format!("invalid edge policy: {e}")))?;
    policy
        .validate()
        .map_err(|e| ApiError::Internal(format!("invalid edge policy: {e}")))?;
    let sha256 = policy.sha256(raw.as_bytes());
    Ok((policy, raw.into_bytes(), sha256))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_loads_and_validates() {
        let (policy, bytes, sha) = load(None).unwrap();
        assert_eq!(policy.version, "v1");
        assert!(!bytes.is_empty());
        assert_eq!(sha.len(), 64);
    }
}
