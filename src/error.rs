use thiserror::Error;

/// Errors surfaced at construction time. The producer-facing write path
/// never returns these; runtime failure is absorbed into counters so
/// observation can never crash the observed system.
#[derive(Debug, Error)]
pub enum ChronicleError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
