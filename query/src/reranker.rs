use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use alayasiki_core::model::ChunkId;

const MAX_CANDIDATE_CHARS: usize = 500;

/// One candidate handed to a reranker: id plus content truncated to at most
/// `MAX_CANDIDATE_CHARS` characters.
#[derive(Debug, Clone)]
pub struct RerankInput {
    pub chunk_id: ChunkId,
    pub content: String,
}

impl RerankInput {
    pub fn truncated(chunk_id: ChunkId, content: &str) -> Self {
        let truncated: String = content.chars().take(MAX_CANDIDATE_CHARS).collect();
        Self {
            chunk_id,
            content: truncated,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RerankScoreEntry {
    pub chunk_id: String,
    pub score: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RerankResponse {
    pub scores: Vec<RerankScoreEntry>,
}

/// A chat-style relevance scorer. Implementations own their own transport
/// and timeout enforcement is left to the caller (`RetrievalEngine` wraps
/// every call in `tokio::time::timeout`).
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, candidates: &[RerankInput]) -> anyhow::Result<RerankResponse>;
}

/// Deterministic stand-in scorer: scores each candidate by the fraction of
/// query tokens it contains, the same overlap heuristic `search_lexical`
/// uses. A real deployment would call a hosted chat model instead.
pub struct DeterministicReranker;

#[async_trait]
impl Reranker for DeterministicReranker {
    async fn rerank(&self, query: &str, candidates: &[RerankInput]) -> anyhow::Result<RerankResponse> {
        let query_tokens: Vec<String> = query
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();

        let scores = candidates
            .iter()
            .map(|c| {
                let content_tokens: Vec<String> = c
                    .content
                    .to_lowercase()
                    .split(|ch: char| !ch.is_alphanumeric())
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
                    .collect();
                let overlap = query_tokens
                    .iter()
                    .filter(|t| content_tokens.contains(t))
                    .count();
                let score = if query_tokens.is_empty() {
                    0.0
                } else {
                    overlap as f32 / query_tokens.len() as f32
                };
                RerankScoreEntry {
                    chunk_id: c.chunk_id.0.clone(),
                    score,
                }
            })
            .collect();

        Ok(RerankResponse { scores })
    }
}

/// A single chat-completion call: given a rendered prompt, returns the raw
/// model reply. Implementations own their own transport (HTTP client,
/// retries, auth) — this crate only renders the prompt and parses the reply.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Relevance scorer backed by a chat model. Renders `query` and `candidates`
/// into a single prompt asking for a `{"scores": [{"chunk_id", "score"}]}`
/// reply, then parses it with [`parse_rerank_response`]. A malformed or
/// missing-key reply is surfaced as an error so `RetrievalEngine` falls back
/// to the pre-rerank order rather than trusting a partial score set.
pub struct ChatReranker {
    chat: Arc<dyn ChatCompletion>,
}

impl ChatReranker {
    pub fn new(chat: Arc<dyn ChatCompletion>) -> Self {
        Self { chat }
    }
}

fn render_prompt(query: &str, candidates: &[RerankInput]) -> String {
    let mut prompt = format!(
        "Score each candidate passage's relevance to the query on a 0.0-1.0 \
         scale. Query: {query}\n\nReply with JSON: {{\"scores\": \
         [{{\"chunk_id\": ..., \"score\": ...}}]}}\n\nCandidates:\n"
    );
    for c in candidates {
        prompt.push_str(&format!("- {}: {}\n", c.chunk_id.0, c.content));
    }
    prompt
}

#[async_trait]
impl Reranker for ChatReranker {
    async fn rerank(&self, query: &str, candidates: &[RerankInput]) -> anyhow::Result<RerankResponse> {
        let prompt = render_prompt(query, candidates);
        let raw = self.chat.complete(&prompt).await?;
        parse_rerank_response(&raw).ok_or_else(|| anyhow::anyhow!("reranker returned malformed response"))
    }
}

/// A reranker that always times out, used to exercise the engine's
/// degrade-gracefully path in tests.
pub struct TimingOutReranker {
    pub delay: Duration,
}

#[async_trait]
impl Reranker for TimingOutReranker {
    async fn rerank(&self, _query: &str, _candidates: &[RerankInput]) -> anyhow::Result<RerankResponse> {
        tokio::time::sleep(self.delay).await;
        Ok(RerankResponse { scores: vec![] })
    }
}

/// Parses a reranker's raw JSON reply, tolerating malformed or unexpected
/// payloads. A `None` here tells the caller to fall back to the pre-rerank
/// blended order instead of failing the request.
pub fn parse_rerank_response(json: &str) -> Option<RerankResponse> {
    serde_json::from_str(json).ok()
}
