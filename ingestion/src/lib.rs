pub mod chunker;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod message;
pub mod pipeline;
pub mod policy;
pub mod worker;

pub use embedding::{DeterministicEmbeddingProvider, EmbeddingProvider};
pub use error::{BlobError, IngestionError, MessageError, PipelineError};
pub use extract::{BlobStore, FilesystemBlobStore};
pub use message::IngestionMessage;
pub use pipeline::{EmbeddingPipeline, PipelineChunk, PipelineConfig};
pub use policy::{BasicPolicy, ContentPolicy, NoOpPolicy};
pub use worker::{run_pull_loop, Disposition, IngestionWorker};
