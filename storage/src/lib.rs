pub mod crypto;
pub mod index;
pub mod repo;
pub mod vector_store;
pub mod wal;

pub use repo::{
    DocumentUpsert, LexicalHit, MetadataRepo, RepoError, UpsertChunkInput, UpsertedChunk,
};
pub use vector_store::{DenseHit, VectorStore, VectorStoreError};
