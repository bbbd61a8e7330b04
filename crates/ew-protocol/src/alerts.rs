use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity assigned at alert-open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// Open/resolved state of an `Alert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Open,
    Resolved,
}

/// A hysteresis-backed alert condition tracked per device. `alert_type` follows `monitor.py`'s `{metric}_low` /
/// `{metric}_ok` naming, plus the two connectivity pseudo-metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub device_id: String,
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    pub opened_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub last_value: Option<f64>,
}

/// Canonical alert-type identifiers, mirroring `monitor.py`'s
/// `ensure_*_alerts` family.
pub mod alert_type {
    pub const WATER_PRESSURE_LOW: &str = "water_pressure_low";
    pub const OIL_PRESSURE_LOW: &str = "oil_pressure_low";
    pub const OIL_LEVEL_LOW: &str = "oil_level_low";
    pub const OIL_LIFE_LOW: &str = "oil_life_low";
    pub const BATTERY_LOW: &str = "battery_low";
    pub const SIGNAL_WEAK: &str = "signal_weak";
    pub const MICROPHONE_OFFLINE: &str = "microphone_offline";
    pub const POWER_INPUT_OUT_OF_RANGE: &str = "power_input_out_of_range";
    pub const POWER_UNSUSTAINABLE: &str = "power_unsustainable";
    pub const DEVICE_OFFLINE: &str = "device_offline";
    pub const DEVICE_ONLINE: &str = "device_online";
}

impl Alert {
    pub fn open(
        id: Uuid,
        device_id: impl Into<String>,
        alert_type: impl Into<String>,
        severity: AlertSeverity,
        now: DateTime<Utc>,
        last_value: Option<f64>,
    ) -> Self {
        Self {
            id,
            device_id: device_id.into(),
            alert_type: alert_type.into(),
            severity,
            status: AlertStatus::Open,
            opened_at: now,
            resolved_at: None,
            last_value,
        }
    }

    pub fn resolve(&mut self, now: DateTime<Utc>) {
        self.status = AlertStatus::Resolved;
        self.resolved_at = Some(now);
    }

    pub fn is_open(&self) -> bool {
        self.status == AlertStatus::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_opens_then_resolves() {
        let now = Utc::now();
        let mut alert = Alert::open(
            Uuid::nil(),
            "dev-1",
            alert_type::WATER_PRESSURE_LOW,
            AlertSeverity::Warning,
            now,
            Some(28.0),
        );
        assert!(alert.is_open());
        alert.resolve(now + chrono::Duration::minutes(5));
        assert!(!alert.is_open());
        assert_eq!(alert.status, AlertStatus::Resolved);
        assert!(alert.resolved_at.is_some());
    }

    #[test]
    fn alert_type_constants_match_naming_convention() {
        assert!(alert_type::WATER_PRESSURE_LOW.ends_with("_low"));
        assert!(alert_type::OIL_LIFE_LOW.ends_with("_low"));
        assert_eq!(alert_type::DEVICE_OFFLINE, "device_offline");
        assert_eq!(alert_type::DEVICE_ONLINE, "device_online");
    }
}
