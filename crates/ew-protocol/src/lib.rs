//! Shared types for EdgeWatch, used by both the edge agent and the
//! central server. No I/O lives here — only the wire vocabulary.

pub mod alerts;
pub mod commands;
pub mod contract;
pub mod device;
pub mod notifications;
pub mod policy;
pub mod telemetry;

pub use device::{Device, DeviceStatus, OperationMode};
pub use telemetry::{MetricValue, TelemetryPoint};
