//! Notification destination adapters: generic/Slack/Discord/Telegram
//! webhooks, plus a mock for router tests.

pub mod destination;
pub mod error;
pub mod mock;
pub mod webhook;

pub use destination::{destination_fingerprint, mask_webhook_url, DeliveryOutcome, Destination};
pub use error::DeliveryError;
pub use mock::MockDestination;
pub use webhook::{WebhookDestination, WebhookKind};
