use alayasiki_core::error::{AlayasikiError, ErrorCode};
use ingestion::{BlobError, PipelineError};
use thiserror::Error;

/// Errors raised while reindexing a single queue item. Unlike
/// `IngestionError`, nothing here is "permanent" in the ack/nack sense —
/// every failure is recorded on the queue row via `mark_reindex_failure` and
/// retried on a later run until `attempts >= max_attempts`.
#[derive(Debug, Error)]
pub enum ReindexError {
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("storage error: {0}")]
    Repo(#[from] storage::RepoError),
    #[error(transparent)]
    VectorStore(#[from] storage::VectorStoreError),
}

impl AlayasikiError for ReindexError {
    fn error_code(&self) -> ErrorCode {
        match self {
            ReindexError::Blob(e) => e.error_code(),
            ReindexError::Pipeline(e) => e.error_code(),
            ReindexError::Repo(_) => ErrorCode::Internal,
            ReindexError::VectorStore(e) => e.error_code(),
        }
    }
}

impl ReindexError {
    pub fn taxonomy_code(&self) -> &'static str {
        match self {
            ReindexError::Blob(e) => e.taxonomy_code(),
            ReindexError::Pipeline(e) => e.taxonomy_code(),
            ReindexError::Repo(_) => "transient_io",
            ReindexError::VectorStore(_) => "validation_error",
        }
    }
}
