use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle/connectivity status derived from `last_seen_at` and the
/// offline detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Online,
    Offline,
}

/// Operation mode, set by the operator via a control command and
/// delivered through `/device-policy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OperationMode {
    #[default]
    Active,
    Sleep,
    Disabled,
}

/// A registered field device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    pub display_name: String,
    /// Never serialized back to clients; present only for server-side
    /// round-tripping in tests and in-memory fallback mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_fingerprint: Option<String>,
    pub heartbeat_interval_s: u32,
    pub offline_after_s: u32,
    pub enabled: bool,
    pub operation_mode: OperationMode,
    pub sleep_poll_interval_s: u32,
    pub alerts_muted_until: Option<DateTime<Utc>>,
    pub alerts_muted_reason: Option<String>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Error returned when a `Device`'s cadence fields violate the
/// `offline_after_s >= 3 * heartbeat_interval_s` invariant.
#[derive(Debug, thiserror::Error)]
#[error(
    "offline_after_s ({offline_after_s}) must be at least 3x heartbeat_interval_s ({heartbeat_interval_s})"
)]
pub struct CadenceInvariantError {
    pub heartbeat_interval_s: u32,
    pub offline_after_s: u32,
}

impl Device {
    /// Checks that `offline_after_s` leaves enough room for missed
    /// heartbeats before a device is declared offline. Callers (admin
    /// device create/update routes) must run this before persisting.
    pub fn check_cadence_invariant(
        heartbeat_interval_s: u32,
        offline_after_s: u32,
    ) -> Result<(), CadenceInvariantError> {
        if offline_after_s < 3 * heartbeat_interval_s {
            return Err(CadenceInvariantError {
                heartbeat_interval_s,
                offline_after_s,
            });
        }
        Ok(())
    }

    pub fn is_muted(&self, now: DateTime<Utc>) -> bool {
        self.alerts_muted_until.is_some_and(|until| now < until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cadence_invariant_accepts_exact_multiple() {
        assert!(Device::check_cadence_invariant(60, 180).is_ok());
    }

    #[test]
    fn cadence_invariant_rejects_too_short_offline_window() {
        let err = Device::check_cadence_invariant(60, 179).unwrap_err();
        assert_eq!(err.heartbeat_interval_s, 60);
    }

    #[test]
    fn operation_mode_defaults_to_active() {
        assert_eq!(OperationMode::default(), OperationMode::Active);
    }

    #[test]
    fn operation_mode_serialization() {
        assert_eq!(
            serde_json::to_string(&OperationMode::Sleep).unwrap(),
            r#""sleep""#
        );
    }

    #[test]
    fn device_muted_window() {
        let now = Utc::now();
        let mut device = sample_device(now);
        device.alerts_muted_until = Some(now + chrono::Duration::minutes(5));
        assert!(device.is_muted(now));
        assert!(!device.is_muted(now + chrono::Duration::minutes(10)));
    }

    fn sample_device(now: DateTime<Utc>) -> Device {
        Device {
            device_id: "dev-1".into(),
            display_name: "Pad 12 Pump".into(),
            token_fingerprint: Some("fp".into()),
            heartbeat_interval_s: 60,
            offline_after_s: 300,
            enabled: true,
            operation_mode: OperationMode::Active,
            sleep_poll_interval_s: 3600,
            alerts_muted_until: None,
            alerts_muted_reason: None,
            last_seen_at: Some(now),
            created_at: now,
        }
    }
}
