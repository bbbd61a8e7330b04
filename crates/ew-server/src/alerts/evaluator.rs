//! Hysteresis threshold evaluation, one function per metric, mirroring
//! `monitor.py`'s `ensure_*_alerts` family.

use chrono::{DateTime, Utc};
use ew_protocol::alerts::{alert_type, Alert, AlertSeverity};
use ew_protocol::policy::{EdgePolicy, HysteresisPair};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;

/// A state change the evaluator produced for this sample. `Opened`
/// transitions are submitted to the notification router; `Resolved`
/// transitions only ever produce a one-shot info record and never
/// notify.
#[derive(Debug, Clone)]
pub enum AlertTransition {
    Opened(Alert),
    Resolved { closed: Alert, info: Alert },
}

async fn evaluate_hysteresis(
    pool: &PgPool,
    device_id: &str,
    alert_type: &str,
    ok_alert_type: String,
    pair: HysteresisPair,
    value: f64,
    now: DateTime<Utc>,
) -> Result<Option<AlertTransition>, sqlx::Error> {
    let open_row = db::alerts::find_open(pool, device_id, alert_type).await?;

    if value < pair.low {
        if open_row.is_none() {
            let alert = Alert::open(
                Uuid::now_v7(),
                device_id,
                alert_type,
                AlertSeverity::Warning,
                now,
                Some(value),
            );
            db::alerts::open(
                pool,
                alert.id,
                device_id,
                alert_type,
                "warning",
                now,
                Some(value),
            )
            .await?;
            return Ok(Some(AlertTransition::Opened(alert)));
        }
        return Ok(None);
    }

    if let Some(row) = open_row {
        if value >= pair.recover {
            db::alerts::resolve(pool, row.id, now).await?;
            let mut closed = Alert::open(
                row.id,
                device_id,
                alert_type,
                AlertSeverity::Warning,
                row.opened_at,
                row.last_value,
            );
            closed.resolve(now);

            let info_id = Uuid::now_v7();
            db::alerts::open(
                pool,
                info_id,
                device_id,
                &ok_alert_type,
                "info",
                now,
                Some(value),
            )
            .await?;
            db::alerts::resolve(pool, info_id, now).await?;
            let mut info = Alert::open(
                info_id,
                device_id,
                ok_alert_type,
                AlertSeverity::Warning,
                now,
                Some(value),
            );
            info.resolve(now);

            return Ok(Some(AlertTransition::Resolved { closed, info }));
        }
    }

    Ok(None)
}

macro_rules! threshold_metric {
    ($name:ident, $alert_type:expr, $pair:expr) => {
        pub async fn $name(
            pool: &PgPool,
            device_id: &str,
            value: f64,
            policy: &EdgePolicy,
            now: DateTime<Utc>,
        ) -> Result<Option<AlertTransition>, sqlx::Error> {
            let pair = $pair(policy);
            let ok_type = format!("{}_ok", $alert_type.trim_end_matches("_low"));
            evaluate_hysteresis(pool, device_id, $alert_type, ok_type, pair, value, now).await
        }
    };
}

threshold_metric!(
    water_pressure,
    alert_type::WATER_PRESSURE_LOW,
    |p: &EdgePolicy| p.alert_thresholds.water_pressure
);
threshold_metric!(
    oil_pressure,
    alert_type::OIL_PRESSURE_LOW,
    |p: &EdgePolicy| p.alert_thresholds.oil_pressure
);
threshold_metric!(oil_level, alert_type::OIL_LEVEL_LOW, |p: &EdgePolicy| p
    .alert_thresholds
    .oil_level_pct);
threshold_metric!(oil_life, alert_type::OIL_LIFE_LOW, |p: &EdgePolicy| p
    .alert_thresholds
    .oil_life_pct);
threshold_metric!(battery, alert_type::BATTERY_LOW, |p: &EdgePolicy| p
    .alert_thresholds
    .battery_v);

/// RSSI is negative dBm; "low" still means `< low`, "recover" `>= recover`,
/// the same comparison direction as the other metrics, just over negative
/// numbers.
pub async fn signal(
    pool: &PgPool,
    device_id: &str,
    value: f64,
    policy: &EdgePolicy,
    now: DateTime<Utc>,
) -> Result<Option<AlertTransition>, sqlx::Error> {
    evaluate_hysteresis(
        pool,
        device_id,
        alert_type::SIGNAL_WEAK,
        "signal_ok".to_string(),
        policy.alert_thresholds.signal_rssi_dbm,
        value,
        now,
    )
    .await
}

/// Requires `open_consecutive_samples` readings below threshold before
/// opening, and `resolve_consecutive_samples` at or above it before
/// closing — unlike the other metrics this one looks at history, not
/// just the latest sample.
pub async fn microphone_offline(
    pool: &PgPool,
    device_id: &str,
    policy: &EdgePolicy,
    now: DateTime<Utc>,
) -> Result<Option<AlertTransition>, sqlx::Error> {
    let thresholds = &policy.alert_thresholds;
    let open_samples = thresholds.microphone_offline_open_consecutive_samples.max(1) as i64;
    let resolve_samples = thresholds
        .microphone_offline_resolve_consecutive_samples
        .max(1) as i64;
    let limit = open_samples.max(resolve_samples);

    let levels = recent_microphone_levels(pool, device_id, limit).await?;
    let open_row = db::alerts::find_open(pool, device_id, alert_type::MICROPHONE_OFFLINE).await?;

    if let Some(row) = open_row {
        let window = levels.iter().take(resolve_samples as usize);
        if levels.len() as i64 >= resolve_samples
            && window.clone().all(|v| *v >= thresholds.microphone_offline_db)
        {
            db::alerts::resolve(pool, row.id, now).await?;
            let mut closed = Alert::open(
                row.id,
                device_id,
                alert_type::MICROPHONE_OFFLINE,
                AlertSeverity::Warning,
                row.opened_at,
                row.last_value,
            );
            closed.resolve(now);

            let info_id = Uuid::now_v7();
            db::alerts::open(pool, info_id, device_id, "microphone_online", "info", now, None)
                .await?;
            db::alerts::resolve(pool, info_id, now).await?;
            let mut info = Alert::open(
                info_id,
                device_id,
                "microphone_online",
                AlertSeverity::Warning,
                now,
                None,
            );
            info.resolve(now);
            return Ok(Some(AlertTransition::Resolved { closed, info }));
        }
        return Ok(None);
    }

    let window = levels.iter().take(open_samples as usize);
    if levels.len() as i64 >= open_samples
        && window.clone().all(|v| *v < thresholds.microphone_offline_db)
    {
        let alert = Alert::open(
            Uuid::now_v7(),
            device_id,
            alert_type::MICROPHONE_OFFLINE,
            AlertSeverity::Warning,
            now,
            levels.first().copied(),
        );
        db::alerts::open(
            pool,
            alert.id,
            device_id,
            alert_type::MICROPHONE_OFFLINE,
            "warning",
            now,
            levels.first().copied(),
        )
        .await?;
        return Ok(Some(AlertTransition::Opened(alert)));
    }

    Ok(None)
}

async fn recent_microphone_levels(
    pool: &PgPool,
    device_id: &str,
    limit: i64,
) -> Result<Vec<f64>, sqlx::Error> {
    let rows = db::telemetry::list_for_device(pool, device_id, limit.max(10) * 5).await?;
    let mut out = Vec::with_capacity(limit as usize);
    for row in rows {
        if let Some(value) = row.metrics.get("microphone_db").and_then(|v| v.as_f64()) {
            out.push(value);
            if out.len() as i64 >= limit {
                break;
            }
        }
    }
    Ok(out)
}

/// Boolean flag lifecycle shared by the two power alerts: open while
/// true, resolve and emit the `_ok` record the first time it flips to
/// false.
async fn evaluate_boolean_condition(
    pool: &PgPool,
    device_id: &str,
    alert_type: &str,
    ok_alert_type: &str,
    active: bool,
    message_value: Option<f64>,
    now: DateTime<Utc>,
) -> Result<Option<AlertTransition>, sqlx::Error> {
    let open_row = db::alerts::find_open(pool, device_id, alert_type).await?;

    if active {
        if open_row.is_none() {
            let alert = Alert::open(
                Uuid::now_v7(),
                device_id,
                alert_type,
                AlertSeverity::Warning,
                now,
                message_value,
            );
            db::alerts::open(
                pool,
                alert.id,
                device_id,
                alert_type,
                "warning",
                now,
                message_value,
            )
            .await?;
            return Ok(Some(AlertTransition::Opened(alert)));
        }
        return Ok(None);
    }

    if let Some(row) = open_row {
        db::alerts::resolve(pool, row.id, now).await?;
        let mut closed = Alert::open(
            row.id,
            device_id,
            alert_type,
            AlertSeverity::Warning,
            row.opened_at,
            row.last_value,
        );
        closed.resolve(now);

        let info_id = Uuid::now_v7();
        db::alerts::open(pool, info_id, device_id, ok_alert_type, "info", now, None).await?;
        db::alerts::resolve(pool, info_id, now).await?;
        let mut info = Alert::open(
            info_id,
            device_id,
            ok_alert_type,
            AlertSeverity::Warning,
            now,
            None,
        );
        info.resolve(now);
        return Ok(Some(AlertTransition::Resolved { closed, info }));
    }

    Ok(None)
}

pub async fn power_input_out_of_range(
    pool: &PgPool,
    device_id: &str,
    out_of_range: bool,
    now: DateTime<Utc>,
) -> Result<Option<AlertTransition>, sqlx::Error> {
    evaluate_boolean_condition(
        pool,
        device_id,
        alert_type::POWER_INPUT_OUT_OF_RANGE,
        "power_input_ok",
        out_of_range,
        None,
        now,
    )
    .await
}

pub async fn power_unsustainable(
    pool: &PgPool,
    device_id: &str,
    unsustainable: bool,
    now: DateTime<Utc>,
) -> Result<Option<AlertTransition>, sqlx::Error> {
    evaluate_boolean_condition(
        pool,
        device_id,
        alert_type::POWER_UNSUSTAINABLE,
        "power_sustainable",
        unsustainable,
        None,
        now,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_alert_type_strips_low_suffix() {
        let ok_type = format!("{}_ok", alert_type::WATER_PRESSURE_LOW.trim_end_matches("_low"));
        assert_eq!(ok_type, "water_pressure_ok");
    }
}
