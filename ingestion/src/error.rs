use alayasiki_core::error::{AlayasikiError, ErrorCode};
use thiserror::Error;

/// Errors raised while parsing an ingestion message. All variants are
/// permanent: the caller acks the message and marks the document `failed`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("malformed message payload: {0}")]
    MalformedPayload(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),
    #[error("invalid blob uri scheme: {0}")]
    InvalidBlobUriScheme(String),
}

impl AlayasikiError for MessageError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::InvalidArgument
    }
}

impl MessageError {
    pub fn taxonomy_code(&self) -> &'static str {
        match self {
            MessageError::UnsupportedContentType(_) => "unsupported_document_type",
            _ => "validation_error",
        }
    }
}

/// Errors raised by `EmbeddingPipeline::process`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input file missing before processing could begin: {0}")]
    MissingTempFile(String),
    #[error("unable to parse document contents: {0}")]
    ParseError(String),
    #[error("document did not yield any readable content")]
    EmptyDocument,
    #[error("embedding provider error: {0}")]
    Embedding(String),
    #[error("embedding provider is misconfigured: {0}")]
    EmbeddingConfiguration(String),
}

impl AlayasikiError for PipelineError {
    fn error_code(&self) -> ErrorCode {
        match self {
            PipelineError::MissingTempFile(_) => ErrorCode::InvalidArgument,
            PipelineError::ParseError(_) => ErrorCode::InvalidArgument,
            PipelineError::EmptyDocument => ErrorCode::InvalidArgument,
            PipelineError::Embedding(_) => ErrorCode::Internal,
            PipelineError::EmbeddingConfiguration(_) => ErrorCode::Internal,
        }
    }
}

impl PipelineError {
    pub fn taxonomy_code(&self) -> &'static str {
        match self {
            PipelineError::MissingTempFile(_) => "missing_temp_file",
            PipelineError::ParseError(_) => "parse_error",
            PipelineError::EmptyDocument => "empty_document",
            PipelineError::Embedding(_) => "transient_io",
            PipelineError::EmbeddingConfiguration(_) => "embedding_configuration_error",
        }
    }

    /// Whether a retry by the caller might succeed (maps to `transient_io`).
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::Embedding(_))
    }
}

/// Errors raised while fetching a blob from the (blackbox) object store.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),
    #[error("transient blob store error: {0}")]
    Transient(String),
}

impl AlayasikiError for BlobError {
    fn error_code(&self) -> ErrorCode {
        match self {
            BlobError::NotFound(_) => ErrorCode::NotFound,
            BlobError::Transient(_) => ErrorCode::Internal,
        }
    }
}

impl BlobError {
    pub fn taxonomy_code(&self) -> &'static str {
        match self {
            BlobError::NotFound(_) => "blob_not_found",
            BlobError::Transient(_) => "transient_io",
        }
    }
}

/// Top-level error surfaced by `IngestionWorker::process_message`, carrying
/// the permanent/transient split the state machine routes ack vs nack on.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error(transparent)]
    Message(#[from] MessageError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error("storage error: {0}")]
    Repo(#[from] storage::RepoError),
    #[error(transparent)]
    VectorStore(#[from] storage::VectorStoreError),
}

impl AlayasikiError for IngestionError {
    fn error_code(&self) -> ErrorCode {
        match self {
            IngestionError::Message(e) => e.error_code(),
            IngestionError::Pipeline(e) => e.error_code(),
            IngestionError::Blob(e) => e.error_code(),
            IngestionError::Repo(_) => ErrorCode::Internal,
            IngestionError::VectorStore(e) => e.error_code(),
        }
    }
}

impl IngestionError {
    pub fn taxonomy_code(&self) -> &'static str {
        match self {
            IngestionError::Message(e) => e.taxonomy_code(),
            IngestionError::Pipeline(e) => e.taxonomy_code(),
            IngestionError::Blob(e) => e.taxonomy_code(),
            IngestionError::Repo(_) => "transient_io",
            IngestionError::VectorStore(_) => "validation_error",
        }
    }

    /// Permanent errors ack the message and mark the document `failed`;
    /// everything else is transient and nacks for broker redelivery.
    pub fn is_permanent(&self) -> bool {
        match self {
            IngestionError::Message(_) => true,
            IngestionError::Blob(BlobError::NotFound(_)) => true,
            IngestionError::Pipeline(PipelineError::EmptyDocument) => true,
            IngestionError::Pipeline(PipelineError::ParseError(_)) => true,
            IngestionError::Pipeline(PipelineError::MissingTempFile(_)) => true,
            IngestionError::VectorStore(_) => true,
            _ => false,
        }
    }
}
