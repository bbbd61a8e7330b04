//! Mock notification destination for testing the router without
//! performing real HTTP deliveries.

use async_trait::async_trait;
use ew_protocol::alerts::Alert;
use std::sync::Mutex;

use crate::destination::{DeliveryOutcome, Destination};
use crate::error::DeliveryError;

#[derive(Debug, Clone)]
pub struct RecordedDelivery {
    pub device_id: String,
    pub alert_type: String,
    pub message: String,
}

/// Records every `deliver` call in memory for test assertions.
pub struct MockDestination {
    fingerprint: String,
    deliveries: Mutex<Vec<RecordedDelivery>>,
    fail_next: Mutex<Option<String>>,
}

impl MockDestination {
    pub fn new(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            deliveries: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
        }
    }

    pub fn deliveries(&self) -> Vec<RecordedDelivery> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn fail_next_with(&self, error_class: impl Into<String>) {
        *self.fail_next.lock().unwrap() = Some(error_class.into());
    }
}

#[async_trait]
impl Destination for MockDestination {
    async fn deliver(
        &self,
        alert: &Alert,
        message: &str,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        self.deliveries.lock().unwrap().push(RecordedDelivery {
            device_id: alert.device_id.clone(),
            alert_type: alert.alert_type.clone(),
            message: message.to_string(),
        });

        if let Some(error_class) = self.fail_next.lock().unwrap().take() {
            return Ok(DeliveryOutcome::failed("mock forced failure", error_class));
        }
        Ok(DeliveryOutcome::delivered("mock delivered"))
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
            alert_type::BATTERY_LOW,
            AlertSeverity::Critical,
            chrono::Utc::now(),
            Some(10.8),
        )
    }

    #[tokio::test]
    async fn mock_records_deliveries() {
        let mock = MockDestination::new("fp-1");
        mock.deliver(&sample_alert(), "battery low").await.unwrap();
        let deliveries = mock.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].device_id, "dev-1");
    }

    #[tokio::test]
    async fn mock_can_be_forced_to_fail_once() {
        let mock = MockDestination::new("fp-1");
        mock.fail_next_with("FORCED");
        let outcome = mock.deliver(&sample_alert(), "msg").await.unwrap();
        assert!(!outcome.delivered);
        assert_eq!(outcome.error_class.as_deref(), Some("FORCED"));

        let outcome2 = mock.deliver(&sample_alert(), "msg").await.unwrap();
        assert!(outcome2.delivered);
    }
}
