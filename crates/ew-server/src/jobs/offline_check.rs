//! Periodic offline/online sweep, routed exactly like the threshold
//! evaluator's transitions.

use chrono::Utc;
use sqlx::PgPool;

use crate::alerts;
use crate::config::ServerConfig;

pub async fn run(pool: &PgPool, config: &ServerConfig) -> Result<(), sqlx::Error> {
    let now = Utc::now();
    let transitions = alerts::offline::sweep(pool, now).await?;
    if transitions.is_empty() {
        return Ok(());
    }
    tracing::info!(count = transitions.len(), "offline sweep produced transitions");
    alerts::route_transitions(pool, config, &transitions, now).await
}
