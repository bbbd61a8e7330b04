//! Shared application state for the Axum server.
//!
//! Dual-mode: a `PgPool` when `DATABASE_URL` is configured, falling
//! back to in-memory stores for local development and tests.

use std::collections::HashMap;
use std::sync::Arc;

use ew_protocol::alerts::Alert;
use ew_protocol::commands::DeviceControlCommand;
use ew_protocol::contract::TelemetryContract;
use ew_protocol::device::Device;
use ew_protocol::notifications::NotificationEvent;
use ew_protocol::policy::EdgePolicy;
use ew_protocol::telemetry::TelemetryPoint;
use tokio::sync::{broadcast, RwLock};

use crate::config::ServerConfig;
use crate::rate_limit::RateLimiterRegistry;

/// Real-time events pushed to admin-visible subscribers over the
/// event broadcast channel.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    AlertOpened { device_id: String, alert_type: String },
    AlertResolved { device_id: String, alert_type: String },
    DeviceStatusChanged { device_id: String, online: bool },
    CommandEnqueued { device_id: String, command_id: uuid::Uuid },
}

/// In-memory fallback store, used when no `DATABASE_URL` is configured.
#[derive(Default)]
pub struct MemoryStore {
    pub devices: HashMap<String, Device>,
    pub telemetry: Vec<TelemetryPoint>,
    pub seen_message_ids: std::collections::HashSet<(String, String)>,
    pub alerts: Vec<Alert>,
    pub notifications: Vec<NotificationEvent>,
    pub commands: Vec<DeviceControlCommand>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub pool: Option<sqlx::PgPool>,
    pub memory: Arc<RwLock<MemoryStore>>,
    pub event_tx: broadcast::Sender<ServerEvent>,
    pub rate_limiters: Arc<RateLimiterRegistry>,
    pub telemetry_contract: Arc<TelemetryContract>,
    pub contract_sha256: Arc<String>,
    pub edge_policy: Arc<EdgePolicy>,
    pub policy_sha256: Arc<String>,
}

#[allow(clippy::too_many_arguments)]
impl AppState {
    pub fn new(
        config: ServerConfig,
        pool: Option<sqlx::PgPool>,
        telemetry_contract: TelemetryContract,
        contract_sha256: String,
        edge_policy: EdgePolicy,
        policy_sha256: String,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let rate_limiters = RateLimiterRegistry::with_budget(config.rate_limit_per_minute as f64);
        Self {
            config: Arc::new(config),
            pool,
            memory: Arc::new(RwLock::new(MemoryStore::default())),
            event_tx,
            rate_limiters: Arc::new(rate_limiters),
            telemetry_contract: Arc::new(telemetry_contract),
            contract_sha256: Arc::new(contract_sha256),
            edge_policy: Arc::new(edge_policy),
            policy_sha256: Arc::new(policy_sha256),
        }
    }

    pub fn in_memory_mode(&self) -> bool {
        self.pool.is_none()
    }
}
