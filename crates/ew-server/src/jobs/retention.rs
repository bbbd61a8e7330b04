//! Telemetry and quarantine retention pruning, grounded on
//! `retention.py`'s batched CTE delete: bounded per-sweep work so a
//! single run never holds a table lock for long.

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;

use crate::config::ServerConfig;
use crate::db;

pub async fn run(pool: &PgPool, config: &ServerConfig) -> Result<(), sqlx::Error> {
    if !config.retention_enabled {
        return Ok(());
    }

    let now = Utc::now();
    let telemetry_cutoff = now - ChronoDuration::days(config.telemetry_retention_days as i64);
    let quarantine_cutoff = now - ChronoDuration::days(config.quarantine_retention_days as i64);
    let batch_size = config.retention_batch_size as i64;

    let deleted_telemetry = run_batches(config.retention_max_batches, batch_size, || {
        db::telemetry::delete_older_than(pool, telemetry_cutoff, batch_size)
    })
    .await?;
    let deleted_quarantine = run_batches(config.retention_max_batches, batch_size, || {
        db::quarantine::delete_older_than(pool, quarantine_cutoff, batch_size)
    })
    .await?;

    if deleted_telemetry > 0 || deleted_quarantine > 0 {
        tracing::info!(
            deleted_telemetry,
            deleted_quarantine,
            "retention sweep pruned rows"
        );
    }
    Ok(())
}

/// Repeats a single-batch delete until it returns fewer rows than the
/// batch size (table exhausted) or `max_batches` is reached, matching
/// `_delete_cte_batched`'s loop-until-empty-or-capped behavior.
async fn run_batches<F, Fut>(
    max_batches: u32,
    batch_size: i64,
    mut delete_batch: F,
) -> Result<u64, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<u64, sqlx::Error>>,
{
    let mut total = 0u64;
    for _ in 0..max_batches {
        let deleted = delete_batch().await?;
        total += deleted;
        if deleted < batch_size as u64 {
            break;
        }
    }
    Ok(total)
}
