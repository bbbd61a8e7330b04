//! Database access layer for PostgreSQL.
//!
//! Each sub-module provides typed query functions over a `PgPool`. No
//! compile-time `query!` macros are used since there is no live
//! database to check against at build time.

pub mod alerts;
pub mod batches;
pub mod commands;
pub mod devices;
pub mod idempotency;
pub mod notifications;
pub mod quarantine;
pub mod telemetry;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connect to PostgreSQL and apply the embedded schema. No migration
/// runner beyond `sqlx::raw_sql` schema application.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    tracing::info!("applying database schema");
    sqlx::raw_sql(include_str!("../../migrations/001_devices.sql"))
        .execute(&pool)
        .await?;
    sqlx::raw_sql(include_str!("../../migrations/002_telemetry.sql"))
        .execute(&pool)
        .await?;
    sqlx::raw_sql(include_str!("../../migrations/003_alerts.sql"))
        .execute(&pool)
        .await?;
    sqlx::raw_sql(include_str!("../../migrations/004_notifications.sql"))
        .execute(&pool)
        .await?;
    sqlx::raw_sql(include_str!("../../migrations/005_commands.sql"))
        .execute(&pool)
        .await?;
    tracing::info!("schema ready");

    Ok(pool)
}
