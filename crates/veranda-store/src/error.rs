use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Generic I/O error (creating directories, appending log lines).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing or parsing a persisted JSON document failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
