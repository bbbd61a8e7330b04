//! Shared fixtures for the cross-crate integration suite: a router
//! wired against a real Postgres pool (provided per-test by
//! `#[sqlx::test]`) plus a registered device ready to authenticate.

use chrono::Utc;
use ew_server::auth;
use ew_server::config::ServerConfig;
use ew_server::db;
use ew_server::db::devices::DeviceRow;
use ew_server::state::AppState;
use ew_server::{contract, edge_policy};
use sqlx::PgPool;

pub const DEVICE_TOKEN: &str = "e2e-test-device-token";

/// Builds an `AppState` over `pool` with the default contract/policy
/// and authz disabled, so tests focus on the pipeline under test
/// rather than admin-key plumbing.
pub fn build_state(pool: PgPool) -> AppState {
    let mut config = ServerConfig::default();
    config.authz_enabled = false;
    config.rate_limit_enabled = false;

    let (telemetry_contract, contract_raw) = contract::load(None).unwrap();
    let contract_sha256 = telemetry_contract.sha256(&contract_raw);
    let (edge_policy, _raw, policy_sha256) = edge_policy::load(None).unwrap();

    AppState::new(config, Some(pool), telemetry_contract, contract_sha256, edge_policy, policy_sha256)
}

/// Inserts `dev-1`, authenticating with [`DEVICE_TOKEN`], with
/// heartbeat/offline cadences matching spec.md §8 S4.
pub async fn register_device(pool: &PgPool, device_id: &str) {
    let now = Utc::now();
    let row = DeviceRow {
        device_id: device_id.to_string(),
        display_name: device_id.to_string(),
        token_fingerprint: auth::token_fingerprint(DEVICE_TOKEN),
        token_hash: auth::hash_token(DEVICE_TOKEN),
        heartbeat_interval_s: 60,
        offline_after_s: 300,
        enabled: true,
        operation_mode: "active".to_string(),
        sleep_poll_interval_s: 604_800,
        alerts_muted_until: None,
        alerts_muted_reason: None,
        last_seen_at: Some(now),
        created_at: now,
    };
    db::devices::insert(pool, &row).await.unwrap();
}

pub fn bearer_header() -> String {
    format!("Bearer {DEVICE_TOKEN}")
}
