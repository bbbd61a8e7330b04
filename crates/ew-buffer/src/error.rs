/// Errors surfaced by the local buffer.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("buffer database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("buffer payload encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("local disk is full, evicted oldest {evicted} point(s) and retried")]
    DiskFullAfterEviction { evicted: u64 },

    #[error("local buffer database file was corrupt and has been recreated")]
    RecoveredFromCorruption,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BufferResult<T> = Result<T, BufferError>;
