//! Background jobs, each coalescing to `max_instances=1` (spec.md §5):
//! the offline/online sweep, retention pruning, and the
//! partition-manager boundary stub.

pub mod offline_check;
pub mod partition_manager;
pub mod retention;

use std::time::Duration;

use sqlx::PgPool;
use tokio::time::MissedTickBehavior;

use crate::config::ServerConfig;

/// Spawns every in-scope periodic job on its own interval. Each loop
/// owns a `tokio::time::interval` with `Skip` burst behavior so a slow
/// iteration coalesces instead of stacking ticks.
pub fn spawn_all(pool: PgPool, config: std::sync::Arc<ServerConfig>) {
    let offline_pool = pool.clone();
    let offline_config = config.clone();
    tokio::spawn(async move {
        run_periodic(Duration::from_secs(60), || {
            offline_check::run(&offline_pool, &offline_config)
        })
        .await;
    });

    let retention_pool = pool;
    let retention_config = config;
    tokio::spawn(async move {
        run_periodic(Duration::from_secs(3600), || {
            retention::run(&retention_pool, &retention_config)
        })
        .await;
    });
}

async fn run_periodic<F, Fut>(period: Duration, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), sqlx::Error>>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        if let Err(err) = tick().await {
            tracing::error!(error = %err, "background job iteration failed");
        }
    }
}
