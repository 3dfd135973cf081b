use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Chunker error: {0}")]
    Chunker(#[from] scout_chunker::ChunkerError),

    #[error("Store error: {0}")]
    Store(#[from] scout_store::StoreError),

    #[error("Embedding provider error: {0}")]
    Provider(#[from] scout_store::ProviderError),

    #[error("Stale changeset for {path}: base fingerprint superseded")]
    StaleChangeset { path: String },

    #[error("Invalid project path: {0}")]
    InvalidPath(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    pub fn stale(path: impl Into<String>) -> Self {
        Self::StaleChangeset { path: path.into() }
    }

    #[must_use]
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::StaleChangeset { .. })
    }
}
