#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{reason} ({error_class})")]
    Rejected { reason: String, error_class: String },
}
