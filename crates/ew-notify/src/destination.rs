use async_trait::async_trait;
use ew_protocol::alerts::Alert;

use crate::error::DeliveryError;

/// Outcome of one delivery attempt, mirroring `notifications.py`'s
/// `DeliveryResult` dataclass.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryOutcome {
    pub delivered: bool,
    pub reason: String,
    pub error_class: Option<String>,
}

impl DeliveryOutcome {
    pub fn delivered(reason: impl Into<String>) -> Self {
        Self {
            delivered: true,
            reason: reason.into(),
            error_class: None,
        }
    }

    pub fn failed(reason: impl Into<String>, error_class: impl Into<String>) -> Self {
        Self {
            delivered: false,
            reason: reason.into(),
            error_class: Some(error_class.into()),
        }
    }
}

/// A notification sink. Implementations never panic on delivery
/// failure — they report it through `DeliveryOutcome` or `Err` so the
/// router can record a `NotificationEvent` either way.
#[async_trait]
pub trait Destination: Send + Sync {
    async fn deliver(&self, alert: &Alert, message: &str) -> Result<DeliveryOutcome, DeliveryError>;

    /// Stable identity used for dedupe/throttle bookkeeping, grounded
    /// on `notifications.py`'s `destination_fingerprint` (sha256 of the
    /// raw webhook URL).
    fn fingerprint(&self) -> &str;
}

/// Redacts a webhook URL to `scheme://host/***` for logs, matching
/// `notifications.py`'s `mask_webhook_url`.
pub fn mask_webhook_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    match reqwest::Url::parse(trimmed) {
        Ok(url) => {
            let host = url.host_str().unwrap_or_default();
            if host.is_empty() {
                "***".to_string()
            } else {
                format!("{}://{}/***", url.scheme(), host)
            }
        }
        Err(_) => "***".to_string(),
    }
}

/// SHA-256 fingerprint of a raw destination URL.
pub fn destination_fingerprint(raw: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(raw.trim().as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_webhook_url_keeps_scheme_and_host_only() {
        assert_eq!(
            mask_webhook_url("https://hooks.slack.com/services/T000/B000/xyz"),
            "https://hooks.slack.com/***"
        );
    }

    #[test]
    fn mask_webhook_url_empty_input() {
        assert_eq!(mask_webhook_url(""), "");
        assert_eq!(mask_webhook_url("   "), "");
    }

    #[test]
    fn fingerprint_is_deterministic_sha256() {
        let a = destination_fingerprint("https://example.com/hook");
        let b = destination_fingerprint("https://example.com/hook");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}
