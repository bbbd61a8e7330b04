use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A low/recover pair enforcing `recover > low`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HysteresisPair {
    pub low: f64,
    pub recover: f64,
}

#[derive(Debug, thiserror::Error)]
#[error("hysteresis pair invalid: recover ({recover}) must be > low ({low})")]
pub struct HysteresisError {
    pub low: f64,
    pub recover: f64,
}

impl HysteresisPair {
    pub fn new(low: f64, recover: f64) -> Result<Self, HysteresisError> {
        if recover <= low {
            return Err(HysteresisError { low, recover });
        }
        Ok(Self { low, recover })
    }

    pub fn validate(&self) -> Result<(), HysteresisError> {
        if self.recover <= self.low {
            return Err(HysteresisError {
                low: self.low,
                recover: self.recover,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingCadences {
    pub sample_interval_s: u32,
    pub alert_sample_interval_s: u32,
    pub heartbeat_interval_s: u32,
    pub saver_sample_interval_s: u32,
    pub saver_heartbeat_interval_s: u32,
    pub max_points_per_batch: u32,
    pub buffer_max_points: u64,
    pub buffer_max_age_s: u64,
    pub backoff_initial_s: f64,
    pub backoff_max_s: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub water_pressure: HysteresisPair,
    pub oil_pressure: HysteresisPair,
    pub oil_level_pct: HysteresisPair,
    pub oil_life_pct: HysteresisPair,
    pub battery_v: HysteresisPair,
    /// RSSI: "higher is better" but the pair orientation is unchanged —
    /// `low` is the worse (more negative) bound, `recover` the better
    /// (less negative) bound.
    pub signal_rssi_dbm: HysteresisPair,
    pub microphone_offline_db: f64,
    pub microphone_offline_open_consecutive_samples: u32,
    pub microphone_offline_resolve_consecutive_samples: u32,
}

impl AlertThresholds {
    pub fn validate(&self) -> Result<(), HysteresisError> {
        self.water_pressure.validate()?;
        self.oil_pressure.validate()?;
        self.oil_level_pct.validate()?;
        self.oil_life_pct.validate()?;
        self.battery_v.validate()?;
        self.signal_rssi_dbm.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostCaps {
    pub max_bytes_per_day: u64,
    pub max_snapshots_per_day: u32,
    pub max_media_uploads_per_day: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerManagement {
    pub enabled: bool,
    pub input_warn_min_v: f64,
    pub input_critical_min_v: f64,
    pub max_input_watts: f64,
    /// Seconds the input must stay out of range before entering
    /// power-saver mode.
    pub sustained_window_s: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationDefaults {
    pub control_command_ttl_s: u64,
    pub default_sleep_poll_interval_s: u32,
    pub disable_requires_manual_restart: bool,
    pub shutdown_gated: bool,
    pub default_shutdown_grace_s: u32,
}

/// A pending command fragment, present on `/device-policy` responses
/// only when the device has one outstanding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingControlCommandFragment {
    pub id: uuid::Uuid,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub status: String,
}

impl PendingControlCommandFragment {
    /// `"{id}:{expires_at}:{status}"`, the string folded into the
    /// policy ETag so a pending command change invalidates it.
    pub fn etag_fragment(this: Option<&Self>) -> String {
        match this {
            None => "none".to_string(),
            Some(f) => format!("{}:{}:{}", f.id, f.expires_at.to_rfc3339(), f.status),
        }
    }
}

/// The versioned edge policy document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgePolicy {
    pub version: String,
    pub cache_max_age_s: u32,
    pub reporting: ReportingCadences,
    pub delta_thresholds: std::collections::BTreeMap<String, f64>,
    pub alert_thresholds: AlertThresholds,
    pub cost_caps: CostCaps,
    pub power_management: PowerManagement,
    pub operation_defaults: OperationDefaults,
}

impl EdgePolicy {
    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), HysteresisError> {
        self.alert_thresholds.validate()
    }

    pub fn sha256(&self, raw_bytes: &[u8]) -> String {
        let digest = Sha256::digest(raw_bytes);
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Strong ETag over every field the client's cache depends on
    ///. `device_*` overrides because the ETag must change
    /// the moment per-device controls or the pending command change,
    /// even if the policy document itself hasn't.
    #[allow(clippy::too_many_arguments)]
    pub fn etag(
        policy_sha256: &str,
        heartbeat_interval_s: u32,
        offline_after_s: u32,
        operation_mode: crate::device::OperationMode,
        sleep_poll_interval_s: u32,
        pending_command: Option<&PendingControlCommandFragment>,
    ) -> String {
        let operation_mode_str = serde_json::to_value(operation_mode)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "active".to_string());
        let joined = format!(
            "{}:{}:{}:{}:{}:{}",
            policy_sha256,
            heartbeat_interval_s,
            offline_after_s,
            operation_mode_str,
            sleep_poll_interval_s,
            PendingControlCommandFragment::etag_fragment(pending_command)
        );
        let digest = Sha256::digest(joined.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        format!("\"{hex}\"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::OperationMode;

    fn sample_policy() -> EdgePolicy {
        EdgePolicy {
            version: "v1".into(),
            cache_max_age_s: 300,
            reporting: ReportingCadences {
                sample_interval_s: 300,
                alert_sample_interval_s: 60,
                heartbeat_interval_s: 300,
                saver_sample_interval_s: 900,
                saver_heartbeat_interval_s: 900,
                max_points_per_batch: 200,
                buffer_max_points: 50_000,
                buffer_max_age_s: 7 * 86_400,
                backoff_initial_s: 5.0,
                backoff_max_s: 300.0,
            },
            delta_thresholds: Default::default(),
            alert_thresholds: AlertThresholds {
                water_pressure: HysteresisPair::new(30.0, 32.0).unwrap(),
                oil_pressure: HysteresisPair::new(20.0, 25.0).unwrap(),
                oil_level_pct: HysteresisPair::new(15.0, 20.0).unwrap(),
                oil_life_pct: HysteresisPair::new(10.0, 15.0).unwrap(),
                battery_v: HysteresisPair::new(11.5, 12.0).unwrap(),
                signal_rssi_dbm: HysteresisPair::new(-110.0, -100.0).unwrap(),
                microphone_offline_db: -60.0,
                microphone_offline_open_consecutive_samples: 3,
                microphone_offline_resolve_consecutive_samples: 3,
            },
            cost_caps: CostCaps {
                max_bytes_per_day: 5_000_000,
                max_snapshots_per_day: 50,
                max_media_uploads_per_day: 10,
            },
            power_management: PowerManagement {
                enabled: true,
                input_warn_min_v: 11.0,
                input_critical_min_v: 10.0,
                max_input_watts: 15.0,
                sustained_window_s: 1800,
            },
            operation_defaults: OperationDefaults {
                control_command_ttl_s: 86_400,
                default_sleep_poll_interval_s: 7 * 86_400,
                disable_requires_manual_restart: false,
                shutdown_gated: true,
                default_shutdown_grace_s: 30,
            },
        }
    }

    #[test]
    fn hysteresis_rejects_recover_not_greater_than_low() {
        assert!(HysteresisPair::new(30.0, 30.0).is_err());
        assert!(HysteresisPair::new(30.0, 29.0).is_err());
        assert!(HysteresisPair::new(30.0, 31.0).is_ok());
    }

    #[test]
    fn rssi_pair_is_still_low_less_than_recover() {
        // "Higher number = better signal" still means recover > low
        // numerically, since RSSI values are negative.
        let rssi = HysteresisPair::new(-110.0, -100.0).unwrap();
        assert!(rssi.recover > rssi.low);
    }

    #[test]
    fn policy_validates_all_pairs() {
        assert!(sample_policy().validate().is_ok());
    }

    #[test]
    fn etag_changes_with_pending_command() {
        let policy = sample_policy();
        let sha = policy.sha256(b"bytes");
        let no_cmd = EdgePolicy::etag(&sha, 300, 900, OperationMode::Active, 604_800, None);
        let frag = PendingControlCommandFragment {
            id: uuid::Uuid::nil(),
            expires_at: chrono::Utc::now(),
            status: "pending".into(),
        };
        let with_cmd =
            EdgePolicy::etag(&sha, 300, 900, OperationMode::Active, 604_800, Some(&frag));
        assert_ne!(no_cmd, with_cmd);
    }

    #[test]
    fn etag_is_stable_given_same_inputs() {
        let policy = sample_policy();
        let sha = policy.sha256(b"bytes");
        let a = EdgePolicy::etag(&sha, 300, 900, OperationMode::Active, 604_800, None);
        let b = EdgePolicy::etag(&sha, 300, 900, OperationMode::Active, 604_800, None);
        assert_eq!(a, b);
    }

    #[test]
    fn pending_command_fragment_none() {
        assert_eq!(
            PendingControlCommandFragment::etag_fragment(None),
            "none"
        );
    }
}
