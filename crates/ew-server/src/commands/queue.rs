//! Enqueue/ack/expire — the transactional side of the command queue.

use chrono::{DateTime, Utc};
use ew_protocol::commands::{CommandAckRequest, CommandStatus, ControlCommandPayload};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::error::{ApiError, ApiResult};

/// Supersedes any pending command, expires anything already past its
/// TTL, then inserts the new pending command. Matches the three-step
/// sequence in spec.md §4.4: supersede -> expire -> insert.
pub async fn enqueue(
    pool: &PgPool,
    device_id: &str,
    payload: ControlCommandPayload,
    ttl_s: u64,
    now: DateTime<Utc>,
) -> ApiResult<Uuid> {
    db::commands::expire_due(pool, now).await?;

    let id = Uuid::now_v7();
    let payload_json =
        serde_json::to_value(&payload).map_err(|e| ApiError::Internal(e.to_string()))?;
    let expires_at = now + chrono::Duration::seconds(ttl_s as i64);

    db::commands::enqueue(pool, id, device_id, &payload_json, now, expires_at).await?;
    Ok(id)
}

/// A device may only acknowledge its own currently-pending command;
/// anything else (already acknowledged, superseded, expired, or
/// belonging to another device) is a conflict, not an error — the
/// ack protocol is explicitly retry-safe.
pub async fn acknowledge(
    pool: &PgPool,
    device_id: &str,
    request: CommandAckRequest,
    now: DateTime<Utc>,
) -> ApiResult<()> {
    let command = db::commands::get_by_id(pool, request.command_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("command {}", request.command_id)))?;

    if command.device_id != device_id {
        return Err(ApiError::Forbidden("command belongs to a different device".to_string()));
    }

    if command.status != status_code(CommandStatus::Pending) {
        // Already resolved (ack retry, or superseded/expired meanwhile).
        // Idempotent no-op rather than an error.
        return Ok(());
    }

    if !request.applied {
        tracing::warn!(
            command_id = %request.command_id,
            device_id,
            error = request.error.as_deref().unwrap_or("none"),
            "device acknowledged command as not applied"
        );
    }

    db::commands::ack(pool, request.command_id, now).await?;
    Ok(())
}

fn status_code(status: CommandStatus) -> &'static str {
    match status {
        CommandStatus::Pending => "pending",
        CommandStatus::Acknowledged => "acknowledged",
        CommandStatus::Superseded => "superseded",
        CommandStatus::Expired => "expired",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_matches_db_representation() {
        assert_eq!(status_code(CommandStatus::Pending), "pending");
        assert_eq!(status_code(CommandStatus::Expired), "expired");
    }
}
