//! EdgeWatch central server — ingest API, alert evaluator,
//! notification router, and control-command queue.

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use ew_server::config::ServerConfig;
use ew_server::state::AppState;
use ew_server::{contract, db, edge_policy, jobs, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ew-server starting");

    let config = ServerConfig::from_env();

    let (telemetry_contract, contract_raw) = contract::load(config.telemetry_contract_path.as_deref())?;
    let contract_sha256 = telemetry_contract.sha256(&contract_raw);
    let (edge_policy, _policy_raw, policy_sha256) = edge_policy::load(config.edge_policy_path.as_deref())?;

    let pool = match &config.database_url {
        Some(url) => Some(db::connect(url).await?),
        None => {
            tracing::warn!("no DATABASE_URL configured; core ingest/alert/command routes will return 500");
            None
        }
    };

    if let Some(pool) = &pool {
        if let Some(webhook_url) = &config.alert_webhook_url {
            db::notifications::ensure_default_destination(pool, webhook_url).await?;
        }
        jobs::spawn_all(pool.clone(), std::sync::Arc::new(config.clone()));
    }

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(config, pool, telemetry_contract, contract_sha256, edge_policy, policy_sha256);
    let app = routes::build_router(state);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(listener, app).await?;

    Ok(())
}
