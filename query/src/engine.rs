use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alayasiki_core::config::RetrievalConfig;
use alayasiki_core::model::{Chunk, ChunkId, TenantId};
use ingestion::EmbeddingProvider;
use serde::Serialize;
use storage::{MetadataRepo, VectorStore};

use crate::blend::{blend, Candidate};
use crate::error::RetrievalError;
use crate::reranker::{RerankInput, Reranker};

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub chunk_id: ChunkId,
    pub document_id: alayasiki_core::model::DocumentId,
    pub content: String,
    pub source_uri: String,
    pub page_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dense_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexical_score: Option<f32>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalDiagnostics {
    pub dense_retrieved: usize,
    pub lexical_retrieved: usize,
    pub merged_candidates: usize,
    pub returned: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResponse {
    pub query: String,
    pub tenant_id: TenantId,
    pub results: Vec<RetrievalResult>,
    pub diagnostics: RetrievalDiagnostics,
}

/// Hybrid dense + lexical retrieval with a rerank pass, tenant-scoped at
/// every hop.
pub struct RetrievalEngine {
    repo: Arc<MetadataRepo>,
    vector_store: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Arc<dyn Reranker>,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(
        repo: Arc<MetadataRepo>,
        vector_store: Arc<VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        reranker: Arc<dyn Reranker>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            repo,
            vector_store,
            embedder,
            reranker,
            config,
        }
    }

    pub async fn retrieve(
        &self,
        tenant_id: &TenantId,
        query: &str,
    ) -> Result<RetrievalResponse, RetrievalError> {
        let normalized_query = query.trim();
        if normalized_query.is_empty() {
            return Ok(RetrievalResponse {
                query: normalized_query.to_string(),
                tenant_id: tenant_id.clone(),
                results: Vec::new(),
                diagnostics: RetrievalDiagnostics::default(),
            });
        }

        let query_vector = self
            .embedder
            .embed_query(normalized_query)
            .await
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        let (dense_hits, lexical_hits) = tokio::join!(
            self.vector_store
                .dense_search(tenant_id, &query_vector, self.config.dense_top_n),
            self.repo.search_lexical(
                tenant_id,
                normalized_query,
                self.config.bm25_top_m,
                &self.config.fts_config,
            )
        );

        let dense_retrieved = dense_hits.len();
        let lexical_retrieved = lexical_hits.len();

        let dense_chunk_ids: Vec<ChunkId> = dense_hits.iter().map(|h| h.chunk_id.clone()).collect();
        let known_chunks = self.repo.fetch_chunks_by_ids(tenant_id, &dense_chunk_ids).await;
        let known_by_id: HashMap<ChunkId, Chunk> = known_chunks
            .into_iter()
            .map(|c| (c.chunk_id.clone(), c))
            .collect();

        let mut candidates: HashMap<ChunkId, Candidate> = HashMap::new();
        for hit in &lexical_hits {
            candidates.insert(
                hit.chunk_id.clone(),
                Candidate {
                    chunk_id: hit.chunk_id.clone(),
                    document_id: hit.document_id.clone(),
                    content: hit.content.clone(),
                    source_uri: hit.source_uri.clone(),
                    page_number: hit.page_number,
                    metadata: hit.metadata.clone(),
                    dense_score: None,
                    lexical_score: Some(hit.rank),
                    blended_score: 0.0,
                },
            );
        }

        for hit in &dense_hits {
            let Some(chunk) = known_by_id.get(&hit.chunk_id) else {
                // Stale vector: its chunk row no longer exists in the repo.
                continue;
            };
            candidates
                .entry(hit.chunk_id.clone())
                .and_modify(|c| c.dense_score = Some(hit.score))
                .or_insert_with(|| Candidate {
                    chunk_id: hit.chunk_id.clone(),
                    document_id: chunk.document_id.clone(),
                    content: chunk.content.clone(),
                    source_uri: chunk.source_uri.clone(),
                    page_number: chunk.page_number,
                    metadata: chunk.metadata.clone(),
                    dense_score: Some(hit.score),
                    lexical_score: None,
                    blended_score: 0.0,
                });
        }

        let merged_candidates = candidates.len();
        let blended = blend(candidates.into_values().collect());

        let rerank_pool_size = std::cmp::max(2 * self.config.rerank_top_k, self.config.rerank_top_k);
        let pool: Vec<Candidate> = blended.into_iter().take(rerank_pool_size).collect();

        let reranked = self.rerank_or_fallback(normalized_query, pool).await;
        let returned = reranked.len().min(self.config.rerank_top_k);
        let results: Vec<RetrievalResult> = reranked.into_iter().take(returned).collect();

        Ok(RetrievalResponse {
            query: normalized_query.to_string(),
            tenant_id: tenant_id.clone(),
            results,
            diagnostics: RetrievalDiagnostics {
                dense_retrieved,
                lexical_retrieved,
                merged_candidates,
                returned,
            },
        })
    }

    /// Reranks `pool` (already blended-ranked) via the configured `Reranker`,
    /// returning the pre-rerank order on timeout or parse failure — never
    /// fail retrieval over a degraded rerank pass.
    async fn rerank_or_fallback(&self, query: &str, pool: Vec<Candidate>) -> Vec<RetrievalResult> {
        if pool.is_empty() {
            return Vec::new();
        }

        let inputs: Vec<RerankInput> = pool
            .iter()
            .map(|c| RerankInput::truncated(c.chunk_id.clone(), &c.content))
            .collect();

        let timeout = Duration::from_secs(self.config.reranker_timeout_seconds);
        let outcome = tokio::time::timeout(timeout, self.reranker.rerank(query, &inputs)).await;

        let scores = match outcome {
            Ok(Ok(response)) => Some(response),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "reranker call failed; falling back to pre-rerank order");
                None
            }
            Err(_) => {
                tracing::warn!("reranker timed out; falling back to pre-rerank order");
                None
            }
        };

        let Some(scores) = scores else {
            return pool.into_iter().map(to_result).collect();
        };

        let score_by_id: HashMap<String, f32> = scores
            .scores
            .into_iter()
            .map(|s| (s.chunk_id, s.score))
            .collect();

        let mut scored: Vec<(f32, Candidate)> = pool
            .into_iter()
            .map(|c| {
                let score = score_by_id.get(&c.chunk_id.0).copied().unwrap_or(0.0);
                (score, c)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.chunk_id.0.cmp(&b.1.chunk_id.0))
        });

        scored
            .into_iter()
            .map(|(score, candidate)| {
                let mut result = to_result(candidate);
                result
                    .metadata
                    .insert("rerank_score".to_string(), score.to_string());
                result
            })
            .collect()
    }
}

fn to_result(candidate: Candidate) -> RetrievalResult {
    RetrievalResult {
        chunk_id: candidate.chunk_id,
        document_id: candidate.document_id,
        content: candidate.content,
        source_uri: candidate.source_uri,
        page_number: candidate.page_number,
        dense_score: candidate.dense_score,
        lexical_score: candidate.lexical_score,
        metadata: candidate.metadata,
    }
}
