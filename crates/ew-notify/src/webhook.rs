use async_trait::async_trait;
use ew_protocol::alerts::Alert;
use serde_json::json;
use std::time::Duration;

use crate::destination::{destination_fingerprint, DeliveryOutcome, Destination};
use crate::error::DeliveryError;

/// Destination flavor, dispatched by URL kind the same way
/// `notifications.py`'s `WebhookNotificationAdapter.deliver` branches
/// on `self.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookKind {
    Generic,
    Slack,
    Discord,
    Telegram,
}

/// A webhook-backed notification destination.
pub struct WebhookDestination {
    client: reqwest::Client,
    url: String,
    kind: WebhookKind,
    fingerprint: String,
}

impl WebhookDestination {
    pub fn new(url: impl Into<String>, kind: WebhookKind, timeout_s: f64) -> Self {
        let url = url.into();
        let fingerprint = destination_fingerprint(&url);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(timeout_s))
            .build()
            .expect("reqwest client builds with valid timeout");
        Self {
            client,
            url,
            kind,
            fingerprint,
        }
    }

    fn telegram_chat_id(&self) -> Option<String> {
        let parsed = reqwest::Url::parse(&self.url).ok()?;
        parsed
            .query_pairs()
            .find(|(k, _)| k == "chat_id")
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn build_payload(&self, alert: &Alert, message: &str) -> Result<serde_json::Value, DeliveryError> {
        match self.kind {
            WebhookKind::Slack => Ok(json!({ "text": message })),
            WebhookKind::Discord => Ok(json!({ "content": message })),
            WebhookKind::Telegram => {
                let chat_id = self.telegram_chat_id().ok_or_else(|| DeliveryError::Rejected {
                    reason: "telegram chat_id missing in webhook URL query".to_string(),
                    error_class: "MISSING_CHAT_ID".to_string(),
                })?;
                Ok(json!({ "chat_id": chat_id, "text": message }))
            }
            WebhookKind::Generic => Ok(json!({
                "id": alert.id,
                "device_id": alert.device_id,
                "alert_type": alert.alert_type,
                "severity": alert.severity,
                "status": alert.status,
                "message": message,
                "created_at": alert.opened_at,
                "resolved_at": alert.resolved_at,
                "last_value": alert.last_value,
            })),
        }
    }
}

#[async_trait]
impl Destination for WebhookDestination {
    async fn deliver(
        &self,
        alert: &Alert,
        message: &str,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let payload = match self.build_payload(alert, message) {
            Ok(payload) => payload,
            Err(DeliveryError::Rejected { reason, error_class }) => {
                return Ok(DeliveryOutcome::failed(reason, error_class));
            }
            Err(e) => return Err(e),
        };

        let response = self.client.post(&self.url).json(&payload).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(DeliveryOutcome::delivered("webhook delivered"))
        } else {
            Ok(DeliveryOutcome::failed(
                "webhook non-success response",
                format!("HTTP_{}", status.as_u16()),
            ))
        }
    }

    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ew_protocol::alerts::{alert_type, AlertSeverity};
    use uuid::Uuid;

    fn sample_alert() -> Alert {
        Alert::open(
            Uuid::nil(),
            "dev-1",
            alert_type::WATER_PRESSURE_LOW,
            AlertSeverity::Warning,
            chrono::Utc::now(),
            Some(28.0),
        )
    }

    #[test]
    fn telegram_missing_chat_id_is_rejected() {
        let dest = WebhookDestination::new(
            "https://api.telegram.org/botXYZ/sendMessage",
            WebhookKind::Telegram,
            5.0,
        );
        let err = dest.build_payload(&sample_alert(), "msg").unwrap_err();
        match err {
            DeliveryError::Rejected { error_class, .. } => {
                assert_eq!(error_class, "MISSING_CHAT_ID");
            }
            _ => panic!("expected rejection"),
        }
    }

    #[test]
    fn telegram_chat_id_is_parsed_from_query() {
        let dest = WebhookDestination::new(
            "https://api.telegram.org/botXYZ/sendMessage?chat_id=12345",
            WebhookKind::Telegram,
            5.0,
        );
        let payload = dest.build_payload(&sample_alert(), "msg").unwrap();
        assert_eq!(payload["chat_id"], "12345");
    }

    #[test]
    fn slack_payload_uses_text_key() {
        let dest = WebhookDestination::new("https://hooks.slack.com/x", WebhookKind::Slack, 5.0);
        let payload = dest.build_payload(&sample_alert(), "hello").unwrap();
        assert_eq!(payload["text"], "hello");
    }

    #[test]
    fn generic_payload_uses_message_and_created_at() {
        let dest = WebhookDestination::new("https://example.com/hook", WebhookKind::Generic, 5.0);
        let alert = sample_alert();
        let payload = dest.build_payload(&alert, "water pressure low").unwrap();
        assert_eq!(payload["message"], "water pressure low");
        assert_eq!(payload["created_at"], json!(alert.opened_at));
        assert!(payload.get("opened_at").is_none());
    }

    #[test]
    fn fingerprint_is_stable_for_same_url() {
        let a = WebhookDestination::new("https://example.com/hook", WebhookKind::Generic, 5.0);
        let b = WebhookDestination::new("https://example.com/hook", WebhookKind::Generic, 5.0);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }
}
