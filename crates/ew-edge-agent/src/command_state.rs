//! Device-side apply-once protocol for control commands (spec.md
//! §4.4 "Device-side apply-once protocol"). Persists
//! `(last_applied_command_id, pending_ack_command_id)` so a command is
//! never re-applied across a restart, and an unacknowledged apply
//! keeps retrying the ack on every tick until it lands.

use chrono::{DateTime, Utc};
use ew_protocol::commands::{ControlCommandPayload, PendingControlCommand};
use ew_protocol::device::OperationMode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SidecarError;
use crate::http_client::EdgeHttpClient;

/// The effect of applying a command locally: what the scheduler's
/// cadence resolution and sensor loop should now honor.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedOverrides {
    pub operation_mode: Option<OperationMode>,
    pub sleep_poll_interval_s: Option<u32>,
    pub shutdown_armed: bool,
    pub shutdown_grace_s: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandStateFile {
    pub last_applied_command_id: Option<Uuid>,
    pub pending_ack_command_id: Option<Uuid>,
    /// Wall-clock time the shutdown timer was armed, so the grace
    /// period survives a restart mid-countdown.
    pub shutdown_armed_at: Option<DateTime<Utc>>,
    pub shutdown_grace_s: Option<u32>,
}

pub struct CommandState {
    path: std::path::PathBuf,
    state: CommandStateFile,
}

impl CommandState {
    pub fn file_name(state_dir: &std::path::Path) -> std::path::PathBuf {
        state_dir.join("command_state.json")
    }

    pub fn load(state_dir: &std::path::Path) -> Self {
        let path = Self::file_name(state_dir);
        let state = crate::sidecar::read_or_default(&path).unwrap_or_default();
        Self { path, state }
    }

    fn persist(&self) -> Result<(), SidecarError> {
        crate::sidecar::write_atomic(&self.path, &self.state)
    }

    /// Step 2 of spec.md §4.4: if the incoming pending command is new
    /// (not already applied) and not expired, apply it exactly once
    /// and mark it for ack. Returns the overrides the caller should
    /// now honor, if anything changed.
    pub fn maybe_apply(
        &mut self,
        pending: Option<&PendingControlCommand>,
        shutdown_gated: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<AppliedOverrides>, SidecarError> {
        let Some(command) = pending else { return Ok(None) };
        if Some(command.id) == self.state.last_applied_command_id {
            return Ok(None);
        }
        if now >= command.expires_at {
            tracing::warn!(command_id = %command.id, "pending command already expired, not applying");
            return Ok(None);
        }

        let overrides = match &command.payload {
            ControlCommandPayload::SetOperationMode {
                operation_mode,
                sleep_poll_interval_s,
            } => AppliedOverrides {
                operation_mode: Some(*operation_mode),
                sleep_poll_interval_s: *sleep_poll_interval_s,
                shutdown_armed: false,
                shutdown_grace_s: 0,
            },
            ControlCommandPayload::Shutdown { grace_s } => {
                if shutdown_gated {
                    tracing::warn!(command_id = %command.id, "remote shutdown gated off by policy, clearing without executing");
                    AppliedOverrides {
                        operation_mode: None,
                        sleep_poll_interval_s: None,
                        shutdown_armed: false,
                        shutdown_grace_s: 0,
                    }
                } else {
                    self.state.shutdown_armed_at = Some(now);
                    self.state.shutdown_grace_s = Some(*grace_s);
                    AppliedOverrides {
                        operation_mode: None,
                        sleep_poll_interval_s: None,
                        shutdown_armed: true,
                        shutdown_grace_s: *grace_s,
                    }
                }
            }
        };

        self.state.last_applied_command_id = Some(command.id);
        self.state.pending_ack_command_id = Some(command.id);
        self.persist()?;
        Ok(Some(overrides))
    }

    /// Step 3: while an ack is outstanding, POST it; on 2xx clear it,
    /// on failure keep retrying next tick.
    pub async fn retry_pending_ack(&mut self, client: &EdgeHttpClient) -> Result<(), SidecarError> {
        let Some(command_id) = self.state.pending_ack_command_id else { return Ok(()) };
        if client.post_ack(command_id, true, None).await {
            self.state.pending_ack_command_id = None;
            self.persist()?;
        }
        Ok(())
    }

    /// Step 4: a shutdown executes only once the ack cleared AND the
    /// grace period elapsed. Gated-off shutdowns never reach here —
    /// `maybe_apply` never arms the timer for them.
    pub fn shutdown_ready(&self, now: DateTime<Utc>) -> bool {
        let (Some(armed_at), Some(grace_s)) =
            (self.state.shutdown_armed_at, self.state.shutdown_grace_s)
        else {
            return false;
        };
        self.state.pending_ack_command_id.is_none()
            && now >= armed_at + chrono::Duration::seconds(grace_s as i64)
    }

    pub fn clear_shutdown(&mut self) -> Result<(), SidecarError> {
        self.state.shutdown_armed_at = None;
        self.state.shutdown_grace_s = None;
        self.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ew_protocol::commands::CommandStatus;

    fn pending(id: Uuid, payload: ControlCommandPayload, expires_in_s: i64) -> PendingControlCommand {
        PendingControlCommand {
            id,
            payload,
            status: CommandStatus::Pending,
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in_s),
        }
    }

    #[test]
    fn applies_operation_mode_change_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = CommandState::load(dir.path());
        let cmd = pending(
            Uuid::now_v7(),
            ControlCommandPayload::SetOperationMode {
                operation_mode: OperationMode::Sleep,
                sleep_poll_interval_s: Some(3600),
            },
            3600,
        );
        let now = Utc::now();

        let applied = state.maybe_apply(Some(&cmd), true, now).unwrap().unwrap();
        assert_eq!(applied.operation_mode, Some(OperationMode::Sleep));

        // Second tick with the same pending command is a no-op.
        let reapplied = state.maybe_apply(Some(&cmd), true, now).unwrap();
        assert!(reapplied.is_none());
    }

    #[test]
    fn expired_command_is_not_applied() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = CommandState::load(dir.path());
        let cmd = pending(
            Uuid::now_v7(),
            ControlCommandPayload::SetOperationMode {
                operation_mode: OperationMode::Sleep,
                sleep_poll_interval_s: None,
            },
            -10,
        );
        let result = state.maybe_apply(Some(&cmd), true, Utc::now()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn gated_shutdown_clears_without_arming() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = CommandState::load(dir.path());
        let cmd = pending(Uuid::now_v7(), ControlCommandPayload::Shutdown { grace_s: 30 }, 3600);
        let applied = state.maybe_apply(Some(&cmd), true, Utc::now()).unwrap().unwrap();
        assert!(!applied.shutdown_armed);
        assert!(!state.shutdown_ready(Utc::now() + chrono::Duration::seconds(31)));
    }

    #[test]
    fn ungated_shutdown_waits_for_ack_and_grace() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = CommandState::load(dir.path());
        let cmd = pending(Uuid::now_v7(), ControlCommandPayload::Shutdown { grace_s: 30 }, 3600);
        let now = Utc::now();
        let applied = state.maybe_apply(Some(&cmd), false, now).unwrap().unwrap();
        assert!(applied.shutdown_armed);

        // Ack still outstanding: not ready even after grace elapses.
        assert!(!state.shutdown_ready(now + chrono::Duration::seconds(40)));

        state.state.pending_ack_command_id = None;
        assert!(!state.shutdown_ready(now + chrono::Duration::seconds(10)));
        assert!(state.shutdown_ready(now + chrono::Duration::seconds(31)));
    }

    #[test]
    fn persisted_state_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let id = Uuid::now_v7();
        {
            let mut state = CommandState::load(dir.path());
            let cmd = pending(
                id,
                ControlCommandPayload::SetOperationMode {
                    operation_mode: OperationMode::Active,
                    sleep_poll_interval_s: None,
                },
                3600,
            );
            state.maybe_apply(Some(&cmd), true, Utc::now()).unwrap();
        }
        let reloaded = CommandState::load(dir.path());
        assert_eq!(reloaded.state.last_applied_command_id, Some(id));
    }
}
