//! Strong ETag computation for `GET /device-policy`.

use ew_protocol::device::OperationMode;
use ew_protocol::policy::{EdgePolicy, PendingControlCommandFragment};

use crate::db::commands::CommandRow;
use crate::db::devices::DeviceRow;

pub fn pending_fragment(command: Option<&CommandRow>) -> Option<PendingControlCommandFragment> {
    command.map(|c| PendingControlCommandFragment {
        id: c.id,
        expires_at: c.expires_at,
        status: c.status.clone(),
    })
}

pub fn compute(policy: &EdgePolicy, policy_sha256: &str, device: &DeviceRow, command: Option<&CommandRow>) -> String {
    let operation_mode: OperationMode =
        serde_json::from_value(serde_json::Value::String(device.operation_mode.clone()))
            .unwrap_or(OperationMode::Active);
    let fragment = pending_fragment(command);

    EdgePolicy::etag(
        policy_sha256,
        device.heartbeat_interval_s as u32,
        device.offline_after_s as u32,
        operation_mode,
        device.sleep_poll_interval_s as u32,
        fragment.as_ref(),
    )
}
