use crate::embedder::ProviderError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Index corrupt at {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Invalid search pattern: {0}")]
    InvalidPattern(String),

    #[error("Embedding provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl StoreError {
    pub fn corrupt(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
