//! Periodic `DEVICE_OFFLINE`/`DEVICE_ONLINE` detector driven by
//! `last_seen_at`, run from a background job rather than on ingest.

use chrono::{DateTime, Utc};
use ew_protocol::alerts::{alert_type, Alert, AlertSeverity};
use sqlx::PgPool;
use uuid::Uuid;

use crate::alerts::evaluator::AlertTransition;
use crate::db;

/// Runs the offline/online check across every device and returns the
/// transitions produced, so the caller can route fresh `Opened`
/// alerts to notifications exactly like the threshold evaluator does.
pub async fn sweep(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<AlertTransition>, sqlx::Error> {
    let devices = db::devices::list_all(pool).await?;
    let mut transitions = Vec::new();

    for device in devices {
        if !device.enabled || device.operation_mode != "active" {
            if let Some(t) = resolve_if_open(pool, &device.device_id, now, false).await? {
                transitions.push(t);
            }
            continue;
        }

        let Some(last_seen_at) = device.last_seen_at else {
            continue;
        };
        let seconds = (now - last_seen_at).num_seconds().max(0);

        if seconds > device.offline_after_s as i64 {
            if let Some(t) = open_if_absent(pool, &device.device_id, now).await? {
                transitions.push(t);
            }
        } else if let Some(t) = resolve_if_open(pool, &device.device_id, now, true).await? {
            transitions.push(t);
        }
    }

    Ok(transitions)
}

async fn open_if_absent(
    pool: &PgPool,
    device_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<AlertTransition>, sqlx::Error> {
    if db::alerts::find_open(pool, device_id, alert_type::DEVICE_OFFLINE)
        .await?
        .is_some()
    {
        return Ok(None);
    }

    let alert = Alert::open(
        Uuid::now_v7(),
        device_id,
        alert_type::DEVICE_OFFLINE,
        AlertSeverity::Warning,
        now,
        None,
    );
    db::alerts::open(
        pool,
        alert.id,
        device_id,
        alert_type::DEVICE_OFFLINE,
        "warning",
        now,
        None,
    )
    .await?;
    Ok(Some(AlertTransition::Opened(alert)))
}

async fn resolve_if_open(
    pool: &PgPool,
    device_id: &str,
    now: DateTime<Utc>,
    emit_online_event: bool,
) -> Result<Option<AlertTransition>, sqlx::Error> {
    let Some(row) = db::alerts::find_open(pool, device_id, alert_type::DEVICE_OFFLINE).await? else {
        return Ok(None);
    };

    db::alerts::resolve(pool, row.id, now).await?;
    let mut closed = Alert::open(
        row.id,
        device_id,
        alert_type::DEVICE_OFFLINE,
        AlertSeverity::Warning,
        row.opened_at,
        None,
    );
    closed.resolve(now);

    if !emit_online_event {
        return Ok(Some(AlertTransition::Resolved {
            closed: closed.clone(),
            info: closed,
        }));
    }

    let info_id = Uuid::now_v7();
    db::alerts::open(
        pool,
        info_id,
        device_id,
        alert_type::DEVICE_ONLINE,
        "info",
        now,
        None,
    )
    .await?;
    db::alerts::resolve(pool, info_id, now).await?;
    let mut info = Alert::open(
        info_id,
        device_id,
        alert_type::DEVICE_ONLINE,
        AlertSeverity::Warning,
        now,
        None,
    );
    info.resolve(now);

    Ok(Some(AlertTransition::Resolved { closed, info }))
}
