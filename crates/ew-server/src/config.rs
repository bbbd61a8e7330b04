//! Central server configuration, loaded from environment variables.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminAuthMode {
    Key,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestPipelineMode {
    Direct,
    Pubsub,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub admin_api_key: Option<String>,
    pub admin_auth_mode: AdminAuthMode,
    pub authz_enabled: bool,
    pub ingest_pipeline_mode: IngestPipelineMode,
    pub ingest_pubsub_topic: Option<String>,
    pub pubsub_push_shared_token: Option<String>,
    pub alert_webhook_url: Option<String>,
    pub alert_router_enabled: bool,
    pub alert_quiet_hours_start_hour: Option<u8>,
    pub alert_quiet_hours_end_hour: Option<u8>,
    pub alert_quiet_hours_timezone: String,
    pub alert_dedupe_window_s: u64,
    pub alert_throttle_window_s: u64,
    pub alert_throttle_max_notifications: u32,
    pub max_request_body_bytes: usize,
    pub max_points_per_request: usize,
    pub rate_limit_enabled: bool,
    pub rate_limit_per_minute: u32,
    pub telemetry_contract_version: String,
    pub telemetry_contract_path: Option<String>,
    pub edge_policy_version: String,
    pub edge_policy_path: Option<String>,
    pub cors_origins: Vec<String>,
    pub retention_enabled: bool,
    pub telemetry_retention_days: u32,
    pub quarantine_retention_days: u32,
    pub retention_batch_size: u32,
    pub retention_max_batches: u32,
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        let admin_auth_mode = match std::env::var("ADMIN_AUTH_MODE").as_deref() {
            Ok("none") => AdminAuthMode::None,
            _ => AdminAuthMode::Key,
        };
        let ingest_pipeline_mode = match std::env::var("INGEST_PIPELINE_MODE").as_deref() {
            Ok("pubsub") => IngestPipelineMode::Pubsub,
            _ => IngestPipelineMode::Direct,
        };
        let cors_origins = std::env::var("CORS_ORIGINS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 8080),
            database_url: std::env::var("DATABASE_URL").ok(),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            admin_auth_mode,
            authz_enabled: env_bool("AUTHZ_ENABLED", true),
            ingest_pipeline_mode,
            ingest_pubsub_topic: std::env::var("INGEST_PUBSUB_TOPIC").ok(),
            pubsub_push_shared_token: std::env::var("PUBSUB_PUSH_SHARED_TOKEN").ok(),
            alert_webhook_url: std::env::var("ALERT_WEBHOOK_URL").ok(),
            alert_router_enabled: env_bool("ALERT_ROUTER_ENABLED", true),
            alert_quiet_hours_start_hour: std::env::var("ALERT_QUIET_HOURS_START_HOUR")
                .ok()
                .and_then(|v| v.parse().ok()),
            alert_quiet_hours_end_hour: std::env::var("ALERT_QUIET_HOURS_END_HOUR")
                .ok()
                .and_then(|v| v.parse().ok()),
            alert_quiet_hours_timezone: std::env::var("ALERT_QUIET_HOURS_TIMEZONE")
                .unwrap_or_else(|_| "UTC".to_string()),
            alert_dedupe_window_s: env_parse("ALERT_DEDUPE_WINDOW_S", 900),
            alert_throttle_window_s: env_parse("ALERT_THROTTLE_WINDOW_S", 3600),
            alert_throttle_max_notifications: env_parse("ALERT_THROTTLE_MAX_NOTIFICATIONS", 10),
            max_request_body_bytes: env_parse("MAX_REQUEST_BODY_BYTES", 2_000_000),
            max_points_per_request: env_parse("MAX_POINTS_PER_REQUEST", 5000),
            rate_limit_enabled: env_bool("RATE_LIMIT_ENABLED", true),
            rate_limit_per_minute: env_parse("RATE_LIMIT_PER_MINUTE", 10_000),
            telemetry_contract_version: std::env::var("TELEMETRY_CONTRACT_VERSION")
                .unwrap_or_else(|_| "v1".to_string()),
            telemetry_contract_path: std::env::var("TELEMETRY_CONTRACT_PATH").ok(),
            edge_policy_version: std::env::var("EDGE_POLICY_VERSION")
                .unwrap_or_else(|_| "v1".to_string()),
            edge_policy_path: std::env::var("EDGE_POLICY_PATH").ok(),
            cors_origins,
            retention_enabled: env_bool("RETENTION_ENABLED", false),
            telemetry_retention_days: env_parse("TELEMETRY_RETENTION_DAYS", 30),
            quarantine_retention_days: env_parse("QUARANTINE_RETENTION_DAYS", 30),
            retention_batch_size: env_parse("RETENTION_BATCH_SIZE", 5000),
            retention_max_batches: env_parse("RETENTION_MAX_BATCHES", 50),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: None,
            admin_api_key: None,
            admin_auth_mode: AdminAuthMode::Key,
            authz_enabled: true,
            ingest_pipeline_mode: IngestPipelineMode::Direct,
            ingest_pubsub_topic: None,
            pubsub_push_shared_token: None,
            alert_webhook_url: None,
            alert_router_enabled: true,
            alert_quiet_hours_start_hour: None,
            alert_quiet_hours_end_hour: None,
            alert_quiet_hours_timezone: "UTC".to_string(),
            alert_dedupe_window_s: 900,
            alert_throttle_window_s: 3600,
            alert_throttle_max_notifications: 10,
            max_request_body_bytes: 2_000_000,
            max_points_per_request: 5000,
            rate_limit_enabled: true,
            rate_limit_per_minute: 10_000,
            telemetry_contract_version: "v1".to_string(),
            telemetry_contract_path: None,
            edge_policy_version: "v1".to_string(),
            edge_policy_path: None,
            cors_origins: vec![],
            retention_enabled: false,
            telemetry_retention_days: 30,
            quarantine_retention_days: 30,
            retention_batch_size: 5000,
            retention_max_batches: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_conservative_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.max_points_per_request, 5000);
        assert_eq!(config.admin_auth_mode, AdminAuthMode::Key);
        assert_eq!(config.ingest_pipeline_mode, IngestPipelineMode::Direct);
        assert!(config.rate_limit_enabled);
    }
}
