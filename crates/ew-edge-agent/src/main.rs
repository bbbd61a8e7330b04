//! EdgeWatch edge agent — runs on the pad/device itself, buffering and
//! uploading telemetry, applying control commands, and tracking local
//! power/cost budgets against a cached policy document.

use tracing_subscriber::EnvFilter;

use ew_edge_agent::command_state::CommandState;
use ew_edge_agent::config::AgentConfig;
use ew_edge_agent::cost_caps::CostCaps;
use ew_edge_agent::http_client::EdgeHttpClient;
use ew_edge_agent::policy_cache::PolicyCache;
use ew_edge_agent::power_saver::PowerSaver;
use ew_edge_agent::scheduler::Scheduler;
use ew_edge_agent::sensors::{MockMetricSource, OilLifeSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ew-edge-agent starting");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/edgewatch/agent.toml".to_string());
    let config = AgentConfig::from_file(&config_path)?;
    tracing::info!(device_id = %config.device_id, "config loaded");

    let state_dir = std::path::PathBuf::from(&config.state_dir);
    std::fs::create_dir_all(&state_dir)?;

    let buffer_path = ew_buffer::LocalBuffer::path_for(&state_dir);
    let buffer = ew_buffer::LocalBuffer::open(&buffer_path, config.max_db_bytes).await?;

    let client = EdgeHttpClient::new(
        config.server_base_url.clone(),
        config.device_token.clone(),
        config.http_timeout_secs,
    );
    let policy_cache = PolicyCache::load(&state_dir);
    let command_state = CommandState::load(&state_dir);
    let cost_caps = CostCaps::load(&state_dir, chrono::Utc::now());
    let power_saver = PowerSaver::load(&state_dir);

    let sources: Vec<Box<dyn ew_edge_agent::sensors::MetricSource>> =
        vec![Box::new(MockMetricSource::default())];
    let oil_life = Some(OilLifeSource::new(500.0, 300.0));

    let mut scheduler = Scheduler::new(
        config.device_id.clone(),
        buffer,
        client,
        policy_cache,
        command_state,
        cost_caps,
        power_saver,
        sources,
        oil_life,
    );

    tracing::info!("ew-edge-agent ready");

    loop {
        tokio::select! {
            delay = scheduler.tick() => {
                tokio::time::sleep(delay).await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    tracing::info!("ew-edge-agent stopped");
    Ok(())
}
