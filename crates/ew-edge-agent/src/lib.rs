//! EdgeWatch edge runtime library: the durable buffer glue, HTTP
//! client, and scheduler the `ew-edge-agent` binary drives. Exposed as
//! a library so integration tests can drive the scheduler directly
//! without a running server.

pub mod command_state;
pub mod config;
pub mod cost_caps;
pub mod error;
pub mod http_client;
pub mod policy_cache;
pub mod power_saver;
pub mod scheduler;
pub mod sensors;
pub mod sidecar;
