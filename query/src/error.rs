use alayasiki_core::error::{AlayasikiError, ErrorCode};
use thiserror::Error;

/// Errors raised by `RetrievalEngine::retrieve`. Reranker failures never
/// surface here — they degrade gracefully inside the engine instead.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("query embedding failed: {0}")]
    Embedding(String),
}

impl AlayasikiError for RetrievalError {
    fn error_code(&self) -> ErrorCode {
        match self {
            RetrievalError::Embedding(_) => ErrorCode::Internal,
        }
    }
}

impl RetrievalError {
    pub fn taxonomy_code(&self) -> &'static str {
        match self {
            RetrievalError::Embedding(_) => "transient_io",
        }
    }
}
