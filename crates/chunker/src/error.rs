use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChunkerError>;

#[derive(Error, Debug)]
pub enum ChunkerError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Parse failed for {path}: {reason}")]
    ParseFailed { path: String, reason: String },

    #[error("Grammar error: {0}")]
    Grammar(String),
}

impl ChunkerError {
    pub fn unsupported_language(name: impl Into<String>) -> Self {
        Self::UnsupportedLanguage(name.into())
    }

    pub fn parse_failed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ParseFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
