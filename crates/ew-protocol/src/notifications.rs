use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of `AlertRouter::should_notify`'s six-step decision chain
/// (disabled -> muted -> quiet hours -> dedupe -> throttle -> deliver),
/// grounded on `routing.py`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingDecision {
    Deliver,
    SuppressedDisabled,
    SuppressedMuted,
    SuppressedQuietHours,
    SuppressedDedupe,
    SuppressedThrottled,
    SuppressedNoAdapter,
}

impl RoutingDecision {
    pub fn is_deliver(&self) -> bool {
        matches!(self, RoutingDecision::Deliver)
    }
}

/// Per-fleet routing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingPolicy {
    pub enabled: bool,
    pub quiet_hours_start_hour: Option<u8>,
    pub quiet_hours_end_hour: Option<u8>,
    pub quiet_hours_timezone: Option<String>,
    pub dedupe_window_s: u64,
    pub throttle_max_per_hour: u32,
}

/// A candidate alert event awaiting a routing decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertCandidate {
    pub device_id: String,
    pub alert_type: String,
    pub severity: crate::alerts::AlertSeverity,
    pub occurred_at: DateTime<Utc>,
}

/// A persisted delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: Uuid,
    pub device_id: String,
    pub alert_type: String,
    pub destination_fingerprint: String,
    pub decision: RoutingDecision,
    pub created_at: DateTime<Utc>,
    pub delivered: bool,
    pub error: Option<String>,
}

/// Destination adapter kind, matching the URL-scheme dispatch in
/// `notifications.py`'s `_configured_destinations`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    GenericWebhook,
    Slack,
    Discord,
    Telegram,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_decision_is_deliver_only_for_deliver_variant() {
        assert!(RoutingDecision::Deliver.is_deliver());
        assert!(!RoutingDecision::SuppressedThrottled.is_deliver());
        assert!(!RoutingDecision::SuppressedNoAdapter.is_deliver());
    }

    #[test]
    fn routing_decision_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&RoutingDecision::SuppressedQuietHours).unwrap(),
            r#""suppressed_quiet_hours""#
        );
    }
}
