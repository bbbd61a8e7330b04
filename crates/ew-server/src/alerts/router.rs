//! Six-step notification routing decision, grounded on
//! `original_source/api/app/services/routing.py::AlertRouter.should_notify`
//! and `in_quiet_hours`.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use ew_notify::{Destination, WebhookDestination, WebhookKind};
use ew_protocol::alerts::Alert;
use ew_protocol::notifications::RoutingDecision;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::db;

const WEBHOOK_TIMEOUT_S: f64 = 5.0;

fn webhook_kind(kind: &str) -> WebhookKind {
    match kind {
        "slack" => WebhookKind::Slack,
        "discord" => WebhookKind::Discord,
        "telegram" => WebhookKind::Telegram,
        _ => WebhookKind::Generic,
    }
}

/// Whether `now` falls inside the `[start_hour, end_hour)` window in
/// `tz_name`, handling the cross-midnight case (e.g. 22:00 -> 06:00).
/// `start_hour == end_hour` disables the rule entirely.
pub fn in_quiet_hours(
    now: DateTime<Utc>,
    start_hour: Option<u8>,
    end_hour: Option<u8>,
    tz_name: &str,
) -> bool {
    let (Some(start), Some(end)) = (start_hour, end_hour) else {
        return false;
    };
    if start == end {
        return false;
    }

    let tz: Tz = tz_name.parse().unwrap_or(chrono_tz::UTC);
    let local_hour = now.with_timezone(&tz).format("%H").to_string().parse::<u8>().unwrap_or(0);

    if start < end {
        local_hour >= start && local_hour < end
    } else {
        local_hour >= start || local_hour < end
    }
}

/// Run the six-step decision chain for one alert, then fan out to
/// every enabled destination on `deliver`. Each destination's outcome
/// is recorded as its own `NotificationEvent` row; a delivery failure
/// never blocks the next destination or propagates to the caller.
pub async fn route(
    pool: &PgPool,
    config: &ServerConfig,
    alert: &Alert,
    message: &str,
    now: DateTime<Utc>,
) -> Result<Vec<RoutingDecision>, sqlx::Error> {
    let decision = decide(pool, config, alert, now).await?;

    if !decision.is_deliver() {
        db::notifications::record_event(
            pool,
            Uuid::now_v7(),
            &alert.device_id,
            &alert.alert_type,
            "none",
            decision_code(decision),
            false,
            None,
        )
        .await?;
        return Ok(vec![decision]);
    }

    let rows = db::notifications::list_enabled(pool).await?;
    let destinations: Vec<Box<dyn Destination>> = rows
        .into_iter()
        .map(|row| -> Box<dyn Destination> {
            Box::new(WebhookDestination::new(
                row.webhook_url,
                webhook_kind(&row.kind),
                WEBHOOK_TIMEOUT_S,
            ))
        })
        .collect();

    if destinations.is_empty() {
        db::notifications::record_event(
            pool,
            Uuid::now_v7(),
            &alert.device_id,
            &alert.alert_type,
            "none",
            decision_code(RoutingDecision::SuppressedNoAdapter),
            false,
            None,
        )
        .await?;
        return Ok(vec![RoutingDecision::SuppressedNoAdapter]);
    }

    let mut outcomes = Vec::with_capacity(destinations.len());
    for destination in destinations {
        let result = destination.deliver(alert, message).await;
        let (delivered, error) = match result {
            Ok(outcome) => (outcome.delivered, outcome.error_class),
            Err(e) => (false, Some(e.to_string())),
        };
        db::notifications::record_event(
            pool,
            Uuid::now_v7(),
            &alert.device_id,
            &alert.alert_type,
            destination.fingerprint(),
            decision_code(RoutingDecision::Deliver),
            delivered,
            error.as_deref(),
        )
        .await?;
        outcomes.push(RoutingDecision::Deliver);
    }
    Ok(outcomes)
}

async fn decide(
    pool: &PgPool,
    config: &ServerConfig,
    alert: &Alert,
    now: DateTime<Utc>,
) -> Result<RoutingDecision, sqlx::Error> {
    if !config.alert_router_enabled {
        return Ok(RoutingDecision::SuppressedDisabled);
    }

    if let Some(device) = db::devices::get_by_device_id(pool, &alert.device_id).await? {
        if let Some(muted_until) = device.alerts_muted_until {
            if now < muted_until {
                return Ok(RoutingDecision::SuppressedMuted);
            }
        }
    }

    if in_quiet_hours(
        now,
        config.alert_quiet_hours_start_hour,
        config.alert_quiet_hours_end_hour,
        &config.alert_quiet_hours_timezone,
    ) {
        return Ok(RoutingDecision::SuppressedQuietHours);
    }

    if config.alert_dedupe_window_s > 0 {
        let since = now - chrono::Duration::seconds(config.alert_dedupe_window_s as i64);
        if db::notifications::has_recent_delivered(pool, &alert.device_id, &alert.alert_type, since)
            .await?
        {
            return Ok(RoutingDecision::SuppressedDedupe);
        }
    }

    if config.alert_throttle_window_s > 0 && config.alert_throttle_max_notifications > 0 {
        let since = now - chrono::Duration::seconds(config.alert_throttle_window_s as i64);
        let count = db::notifications::count_recent_delivered(pool, &alert.device_id, since).await?;
        if count >= config.alert_throttle_max_notifications as i64 {
            return Ok(RoutingDecision::SuppressedThrottled);
        }
    }

    Ok(RoutingDecision::Deliver)
}

fn decision_code(decision: RoutingDecision) -> &'static str {
    match decision {
        RoutingDecision::Deliver => "deliver",
        RoutingDecision::SuppressedDisabled => "suppressed_disabled",
        RoutingDecision::SuppressedMuted => "suppressed_muted",
        RoutingDecision::SuppressedQuietHours => "suppressed_quiet_hours",
        RoutingDecision::SuppressedDedupe => "suppressed_dedupe",
        RoutingDecision::SuppressedThrottled => "suppressed_throttle",
        RoutingDecision::SuppressedNoAdapter => "suppressed_no_adapter",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_utc_hour(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn quiet_hours_disabled_when_bounds_missing() {
        assert!(!in_quiet_hours(at_utc_hour(23), None, Some(6), "UTC"));
    }

    #[test]
    fn quiet_hours_disabled_when_equal() {
        assert!(!in_quiet_hours(at_utc_hour(23), Some(6), Some(6), "UTC"));
    }

    #[test]
    fn cross_midnight_window_suppresses_late_night() {
        assert!(in_quiet_hours(at_utc_hour(23), Some(22), Some(6), "UTC"));
        assert!(!in_quiet_hours(at_utc_hour(12), Some(22), Some(6), "UTC"));
        assert!(in_quiet_hours(at_utc_hour(1), Some(22), Some(6), "UTC"));
    }

    #[test]
    fn same_day_window() {
        assert!(in_quiet_hours(at_utc_hour(13), Some(12), Some(14), "UTC"));
        assert!(!in_quiet_hours(at_utc_hour(15), Some(12), Some(14), "UTC"));
    }
}
