//! Alert evaluation: hysteresis threshold crossing, offline detection,
//! and notification routing.

pub mod evaluator;
pub mod offline;
pub mod router;

use chrono::{DateTime, Utc};
use ew_protocol::alerts::Alert;
use ew_protocol::policy::EdgePolicy;
use ew_protocol::telemetry::TelemetryPointInput;
use sqlx::PgPool;

use crate::config::ServerConfig;
use evaluator::AlertTransition;

/// `"[SEVERITY] TYPE for DEVICE: value=..."`, matching `notifications.py`'s
/// message format.
pub fn format_alert_message(alert: &Alert) -> String {
    let severity = serde_json::to_value(alert.severity)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "warning".to_string())
        .to_uppercase();
    match alert.last_value {
        Some(v) => format!(
            "[{}] {} for {}: value={:.2}",
            severity, alert.alert_type, alert.device_id, v
        ),
        None => format!("[{}] {} for {}", severity, alert.alert_type, alert.device_id),
    }
}

/// Submits every `Opened` transition to the router (`Resolved`
/// transitions only ever produce a one-shot `_ok` record and never
/// notify, per spec.md §4.3).
pub async fn route_transitions(
    pool: &PgPool,
    config: &ServerConfig,
    transitions: &[AlertTransition],
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    for transition in transitions {
        if let AlertTransition::Opened(alert) = transition {
            let message = format_alert_message(alert);
            router::route(pool, config, alert, &message, now).await?;
        }
    }
    Ok(())
}

/// Runs every known-metric evaluator against one accepted point,
/// spec.md §4.2(e): "after persistence of a point, evaluate each
/// threshold metric it carries against the alert evaluator under the
/// same transaction."
pub async fn evaluate_point(
    pool: &PgPool,
    device_id: &str,
    point: &TelemetryPointInput,
    policy: &EdgePolicy,
    now: DateTime<Utc>,
) -> Result<Vec<AlertTransition>, sqlx::Error> {
    let mut transitions = Vec::new();

    macro_rules! number_metric {
        ($key:literal, $f:expr) => {
            if let Some(value) = point.metrics.get($key).and_then(|v| v.as_f64()) {
                if let Some(transition) = $f(pool, device_id, value, policy, now).await? {
                    transitions.push(transition);
                }
            }
        };
    }

    number_metric!("water_pressure_psi", evaluator::water_pressure);
    number_metric!("oil_pressure_psi", evaluator::oil_pressure);
    number_metric!("oil_level_pct", evaluator::oil_level);
    number_metric!("oil_life_pct", evaluator::oil_life);
    number_metric!("battery_v", evaluator::battery);
    number_metric!("signal_rssi_dbm", evaluator::signal);

    if point.metrics.contains_key("microphone_db") {
        if let Some(transition) = evaluator::microphone_offline(pool, device_id, policy, now).await? {
            transitions.push(transition);
        }
    }

    let power = &policy.power_management;
    if power.enabled {
        if let Some(v) = point.metrics.get("power_input_v").and_then(|v| v.as_f64()) {
            let out_of_range = v < power.input_warn_min_v;
            if let Some(transition) =
                evaluator::power_input_out_of_range(pool, device_id, out_of_range, now).await?
            {
                transitions.push(transition);
            }

            let watts = point.metrics.get("power_input_watts").and_then(|v| v.as_f64());
            let unsustainable =
                v < power.input_critical_min_v || watts.is_some_and(|w| w > power.max_input_watts);
            if let Some(transition) =
                evaluator::power_unsustainable(pool, device_id, unsustainable, now).await?
            {
                transitions.push(transition);
            }
        }
    }

    Ok(transitions)
}
