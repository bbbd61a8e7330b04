//! Durable local queue for the edge agent's offline telemetry buffer.

pub mod error;
pub mod queue;

pub use error::{BufferError, BufferResult};
pub use queue::{BufferMetrics, BufferedMessage, LocalBuffer};
