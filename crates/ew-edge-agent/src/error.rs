//! Agent-internal error type. `main.rs` and the tick loop otherwise
//! deal in `anyhow::Result` at the outer edge, matching the teacher's
//! split between library errors and binary-level `anyhow`.

/// Outcome of a single outbound call, distinguishing the handful of
/// cases the scheduler branches on (spec.md §4.1 flush algorithm).
#[derive(Debug)]
pub enum CallOutcome<T> {
    /// 2xx with a decoded body.
    Success(T),
    /// 422 contract rejection — drop, never retry the same payload.
    ContractRejected,
    /// Any other 4xx — server classified the request as invalid; drop.
    ClientRejected { status: u16 },
    /// Network error or 5xx — transient, caller should retain and
    /// back off.
    Transient,
}

#[derive(Debug, thiserror::Error)]
pub enum SidecarError {
    #[error("sidecar io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sidecar encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}
