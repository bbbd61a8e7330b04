//! EdgeWatch central server — ingest API, alert evaluator, notification
//! router, and control-command queue. Re-exports the internals
//! `main.rs` and `ew-e2e-tests` drive against (`AppState`,
//! `build_router`, `ServerConfig`).

pub mod alerts;
pub mod auth;
pub mod commands;
pub mod config;
pub mod contract;
pub mod db;
pub mod edge_policy;
pub mod error;
pub mod ingest;
pub mod jobs;
pub mod rate_limit;
pub mod routes;
pub mod state;
