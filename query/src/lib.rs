pub mod blend;
pub mod engine;
pub mod error;
pub mod reranker;

pub use blend::Candidate;
pub use engine::{RetrievalDiagnostics, RetrievalEngine, RetrievalResponse, RetrievalResult};
pub use error::RetrievalError;
pub use reranker::{
    ChatCompletion, ChatReranker, DeterministicReranker, RerankInput, RerankResponse,
    RerankScoreEntry, Reranker,
};
