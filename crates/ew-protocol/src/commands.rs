use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a `DeviceControlCommand`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Acknowledged,
    Superseded,
    Expired,
}

/// The action a control command carries out on the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlCommandPayload {
    SetOperationMode {
        operation_mode: crate::device::OperationMode,
        sleep_poll_interval_s: Option<u32>,
    },
    Shutdown {
        grace_s: u32,
    },
}

impl ControlCommandPayload {
    pub fn action_name(&self) -> &'static str {
        match self {
            ControlCommandPayload::SetOperationMode { .. } => "set_operation_mode",
            ControlCommandPayload::Shutdown { .. } => "shutdown",
        }
    }
}

/// A queued instruction for an edge agent to fetch and apply at most
/// once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceControlCommand {
    pub id: Uuid,
    pub device_id: String,
    pub payload: ControlCommandPayload,
    pub status: CommandStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl DeviceControlCommand {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == CommandStatus::Pending && now >= self.expires_at
    }

    pub fn new_pending(
        id: Uuid,
        device_id: impl Into<String>,
        payload: ControlCommandPayload,
        now: DateTime<Utc>,
        ttl_s: u64,
    ) -> Self {
        Self {
            id,
            device_id: device_id.into(),
            payload,
            status: CommandStatus::Pending,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(ttl_s as i64),
            acknowledged_at: None,
        }
    }
}

/// The full pending command as delivered over `GET /device-policy`.
/// Distinct from `PendingControlCommandFragment` (policy.rs), which is
/// only the identity/status triple folded into the ETag — the edge
/// agent needs the payload itself to apply the command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingControlCommand {
    pub id: Uuid,
    pub payload: ControlCommandPayload,
    pub status: CommandStatus,
    pub expires_at: DateTime<Utc>,
}

/// Body an edge agent POSTs to acknowledge the command it applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandAckRequest {
    pub command_id: Uuid,
    pub applied: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::OperationMode;

    #[test]
    fn command_action_name() {
        let payload = ControlCommandPayload::SetOperationMode {
            operation_mode: OperationMode::Sleep,
            sleep_poll_interval_s: Some(3600),
        };
        assert_eq!(payload.action_name(), "set_operation_mode");
        assert_eq!(
            ControlCommandPayload::Shutdown { grace_s: 30 }.action_name(),
            "shutdown"
        );
    }

    #[test]
    fn command_expires_only_while_pending() {
        let now = Utc::now();
        let mut cmd = DeviceControlCommand::new_pending(
            Uuid::nil(),
            "dev-1",
            ControlCommandPayload::Shutdown { grace_s: 30 },
            now,
            60,
        );
        assert!(!cmd.is_expired(now));
        assert!(cmd.is_expired(now + chrono::Duration::seconds(61)));

        cmd.status = CommandStatus::Acknowledged;
        assert!(!cmd.is_expired(now + chrono::Duration::seconds(61)));
    }

    #[test]
    fn payload_wire_shape_is_tagged_by_action() {
        let payload = ControlCommandPayload::Shutdown { grace_s: 15 };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["action"], "shutdown");
        assert_eq!(json["grace_s"], 15);
    }
}
