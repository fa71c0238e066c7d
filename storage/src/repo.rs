use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use alayasiki_core::error::{AlayasikiError, ErrorCode};
use alayasiki_core::model::{
    Chunk, ChunkId, Document, DocumentId, DocumentStatus, ReindexJob, ReindexReason,
    ReindexStatus, TenantId,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::wal::{Wal, WalError};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("wal error: {0}")]
    Wal(#[from] WalError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("reindex queue item not found: {0}")]
    QueueItemNotFound(u64),
}

impl AlayasikiError for RepoError {
    fn error_code(&self) -> ErrorCode {
        match self {
            RepoError::Wal(_) => ErrorCode::Internal,
            RepoError::Serialization(_) => ErrorCode::Internal,
            RepoError::QueueItemNotFound(_) => ErrorCode::NotFound,
        }
    }
}

/// Fields `upsert_document` may set. `None` leaves the existing column
/// untouched, matching the `COALESCE(new, existing)` semantics a partial
/// update needs.
#[derive(Debug, Clone, Default)]
pub struct DocumentUpsert {
    pub document_id: DocumentId,
    pub tenant_id: TenantId,
    pub filename: Option<String>,
    pub blob_uri: Option<String>,
    pub status: Option<DocumentStatus>,
    pub chunk_count: Option<u32>,
    pub last_error: Option<Option<String>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub last_schema_version: Option<String>,
    pub last_embedding_model: Option<String>,
    pub reindex_attempts: Option<u32>,
}

/// A proposed chunk row, as produced fresh by `EmbeddingPipeline` on every
/// run. `upsert_chunks` resolves it against the existing `(tenant_id,
/// content_hash)` row, if any, so the authoritative `chunk_id` a caller must
/// use for the vector store stays stable across reruns.
#[derive(Debug, Clone)]
pub struct UpsertChunkInput {
    pub chunk_id: ChunkId,
    pub chunk_index: u32,
    pub content: String,
    pub embedding_model: String,
    pub source_uri: String,
    pub page_number: Option<u32>,
    pub metadata: HashMap<String, String>,
    pub values: Vec<f32>,
}

/// Authoritative chunk row plus its embedding vector, ready to hand to
/// `VectorStore::upsert_embeddings`.
#[derive(Debug, Clone)]
pub struct UpsertedChunk {
    pub chunk: Chunk,
    pub values: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub content: String,
    pub page_number: Option<u32>,
    pub source_uri: String,
    pub metadata: HashMap<String, String>,
    pub rank: f32,
}

#[derive(Debug, Serialize, Deserialize)]
enum WalEntry {
    UpsertDocument(DocumentRecord),
    UpsertChunk(ChunkRecord),
    EnqueueReindex(ReindexJob),
    MarkReindexStarted(u64),
    MarkReindexSuccess(u64),
    MarkReindexFailure { queue_id: u64, error: String },
}

/// Serializable mirror of `Document` (identical fields; kept separate so the
/// WAL wire format doesn't change shape if `Document` grows core-only
/// derived accessors later).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DocumentRecord {
    document_id: String,
    tenant_id: String,
    filename: String,
    blob_uri: String,
    status: DocumentStatus,
    chunk_count: u32,
    last_error: Option<String>,
    submitted_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_indexed_at: Option<DateTime<Utc>>,
    last_schema_version: Option<String>,
    last_embedding_model: Option<String>,
    reindex_attempts: u32,
}

impl From<&Document> for DocumentRecord {
    fn from(d: &Document) -> Self {
        Self {
            document_id: d.document_id.0.clone(),
            tenant_id: d.tenant_id.0.clone(),
            filename: d.filename.clone(),
            blob_uri: d.blob_uri.clone(),
            status: d.status,
            chunk_count: d.chunk_count,
            last_error: d.last_error.clone(),
            submitted_at: d.submitted_at,
            updated_at: d.updated_at,
            last_indexed_at: d.last_indexed_at,
            last_schema_version: d.last_schema_version.clone(),
            last_embedding_model: d.last_embedding_model.clone(),
            reindex_attempts: d.reindex_attempts,
        }
    }
}

impl From<DocumentRecord> for Document {
    fn from(r: DocumentRecord) -> Self {
        Self {
            document_id: DocumentId(r.document_id),
            tenant_id: TenantId(r.tenant_id),
            filename: r.filename,
            blob_uri: r.blob_uri,
            status: r.status,
            chunk_count: r.chunk_count,
            last_error: r.last_error,
            submitted_at: r.submitted_at,
            updated_at: r.updated_at,
            last_indexed_at: r.last_indexed_at,
            last_schema_version: r.last_schema_version,
            last_embedding_model: r.last_embedding_model,
            reindex_attempts: r.reindex_attempts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChunkRecord {
    chunk_id: String,
    document_id: String,
    tenant_id: String,
    chunk_index: u32,
    content: String,
    content_hash: String,
    schema_version: String,
    embedding_model: String,
    source_uri: String,
    page_number: Option<u32>,
    metadata: HashMap<String, String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<&Chunk> for ChunkRecord {
    fn from(c: &Chunk) -> Self {
        Self {
            chunk_id: c.chunk_id.0.clone(),
            document_id: c.document_id.0.clone(),
            tenant_id: c.tenant_id.0.clone(),
            chunk_index: c.chunk_index,
            content: c.content.clone(),
            content_hash: c.content_hash.clone(),
            schema_version: c.schema_version.clone(),
            embedding_model: c.embedding_model.clone(),
            source_uri: c.source_uri.clone(),
            page_number: c.page_number,
            metadata: c.metadata.clone(),
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

impl From<ChunkRecord> for Chunk {
    fn from(r: ChunkRecord) -> Self {
        Self {
            chunk_id: ChunkId(r.chunk_id),
            document_id: DocumentId(r.document_id),
            tenant_id: TenantId(r.tenant_id),
            chunk_index: r.chunk_index,
            content: r.content,
            content_hash: r.content_hash,
            schema_version: r.schema_version,
            embedding_model: r.embedding_model,
            source_uri: r.source_uri,
            page_number: r.page_number,
            metadata: r.metadata,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Default)]
struct State {
    documents: HashMap<(TenantId, DocumentId), Document>,
    chunks: HashMap<(TenantId, ChunkId), Chunk>,
    chunk_by_hash: HashMap<(TenantId, String), ChunkId>,
    lexical_tokens: HashMap<(TenantId, ChunkId), Vec<String>>,
    reindex_queue: HashMap<u64, ReindexJob>,
    reindex_by_key: HashMap<(TenantId, DocumentId, ReindexReason), u64>,
}

/// Relational-shaped store for documents, chunks, and the reindex queue.
/// Durable via a write-ahead log replayed into the in-memory `State` on
/// open; the WAL is the single process-global lock this crate serializes
/// writes through, playing the role a bounded DB connection pool would.
pub struct MetadataRepo {
    wal: Mutex<Wal>,
    state: RwLock<State>,
    next_queue_id: AtomicU64,
}

impl MetadataRepo {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        let mut wal = Wal::open(path).await?;
        let mut state = State::default();
        let mut max_queue_id = 0u64;

        wal.replay(|_lsn, payload| {
            let entry: WalEntry = serde_json::from_slice(&payload).map_err(|e| {
                WalError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })?;
            apply_entry(&mut state, entry, &mut max_queue_id);
            Ok(())
        })
        .await?;

        Ok(Self {
            wal: Mutex::new(wal),
            state: RwLock::new(state),
            next_queue_id: AtomicU64::new(max_queue_id + 1),
        })
    }

    async fn append(&self, entry: &WalEntry) -> Result<(), RepoError> {
        let payload = serde_json::to_vec(entry)?;
        let mut wal = self.wal.lock().await;
        wal.append(&payload).await?;
        wal.flush().await?;
        Ok(())
    }

    pub async fn get_document(
        &self,
        tenant_id: &TenantId,
        document_id: &DocumentId,
    ) -> Option<Document> {
        let state = self.state.read().await;
        state
            .documents
            .get(&(tenant_id.clone(), document_id.clone()))
            .cloned()
    }

    /// Insert or update a document by `document_id`, applying `COALESCE`
    /// semantics: fields left `None` on the patch keep their existing value.
    pub async fn upsert_document(&self, patch: DocumentUpsert) -> Result<Document, RepoError> {
        let now = Utc::now();
        let key = (patch.tenant_id.clone(), patch.document_id.clone());

        let merged = {
            let state = self.state.read().await;
            match state.documents.get(&key) {
                Some(existing) => Document {
                    document_id: existing.document_id.clone(),
                    tenant_id: existing.tenant_id.clone(),
                    filename: patch.filename.unwrap_or_else(|| existing.filename.clone()),
                    blob_uri: patch.blob_uri.unwrap_or_else(|| existing.blob_uri.clone()),
                    status: patch.status.unwrap_or(existing.status),
                    chunk_count: patch.chunk_count.unwrap_or(existing.chunk_count),
                    last_error: patch.last_error.unwrap_or_else(|| existing.last_error.clone()),
                    submitted_at: patch.submitted_at.unwrap_or(existing.submitted_at),
                    updated_at: now,
                    last_indexed_at: patch.last_indexed_at.or(existing.last_indexed_at),
                    last_schema_version: patch
                        .last_schema_version
                        .or_else(|| existing.last_schema_version.clone()),
                    last_embedding_model: patch
                        .last_embedding_model
                        .or_else(|| existing.last_embedding_model.clone()),
                    reindex_attempts: patch.reindex_attempts.unwrap_or(existing.reindex_attempts),
                },
                None => Document {
                    document_id: patch.document_id.clone(),
                    tenant_id: patch.tenant_id.clone(),
                    filename: patch.filename.unwrap_or_default(),
                    blob_uri: patch.blob_uri.unwrap_or_default(),
                    status: patch.status.unwrap_or(DocumentStatus::Pending),
                    chunk_count: patch.chunk_count.unwrap_or(0),
                    last_error: patch.last_error.flatten(),
                    submitted_at: patch.submitted_at.unwrap_or(now),
                    updated_at: now,
                    last_indexed_at: patch.last_indexed_at,
                    last_schema_version: patch.last_schema_version,
                    last_embedding_model: patch.last_embedding_model,
                    reindex_attempts: patch.reindex_attempts.unwrap_or(0),
                },
            }
        };

        self.append(&WalEntry::UpsertDocument((&merged).into()))
            .await?;

        let mut state = self.state.write().await;
        state.documents.insert(key, merged.clone());
        Ok(merged)
    }

    /// Batch upsert keyed by `(tenant_id, content_hash)`. Returns the
    /// authoritative row (existing `chunk_id` reused if present) paired with
    /// its embedding vector, in input order. `fts_config` is accepted for
    /// wire compatibility; the token-overlap tokenizer is language-agnostic
    /// and derives the same lexical index regardless of its value.
    pub async fn upsert_chunks(
        &self,
        tenant_id: &TenantId,
        document_id: &DocumentId,
        inputs: Vec<UpsertChunkInput>,
        schema_version: &str,
        fts_config: &str,
        source_uri: &str,
    ) -> Result<Vec<UpsertedChunk>, RepoError> {
        let _ = fts_config;
        let now = Utc::now();
        let mut results = Vec::with_capacity(inputs.len());

        for input in inputs {
            let content_hash = content_hash(&input.content);
            let hash_key = (tenant_id.clone(), content_hash.clone());

            let chunk_id = {
                let state = self.state.read().await;
                state
                    .chunk_by_hash
                    .get(&hash_key)
                    .cloned()
                    .unwrap_or_else(|| input.chunk_id.clone())
            };

            let created_at = {
                let state = self.state.read().await;
                state
                    .chunks
                    .get(&(tenant_id.clone(), chunk_id.clone()))
                    .map(|c| c.created_at)
                    .unwrap_or(now)
            };

            let chunk = Chunk {
                chunk_id: chunk_id.clone(),
                document_id: document_id.clone(),
                tenant_id: tenant_id.clone(),
                chunk_index: input.chunk_index,
                content: input.content.clone(),
                content_hash: content_hash.clone(),
                schema_version: schema_version.to_string(),
                embedding_model: input.embedding_model.clone(),
                source_uri: source_uri.to_string(),
                page_number: input.page_number,
                metadata: input.metadata,
                created_at,
                updated_at: now,
            };

            self.append(&WalEntry::UpsertChunk((&chunk).into())).await?;

            {
                let mut state = self.state.write().await;
                state.chunk_by_hash.insert(hash_key, chunk_id.clone());
                state
                    .lexical_tokens
                    .insert((tenant_id.clone(), chunk_id.clone()), tokenize(&chunk.content));
                state
                    .chunks
                    .insert((tenant_id.clone(), chunk_id.clone()), chunk.clone());
            }

            results.push(UpsertedChunk {
                chunk,
                values: input.values,
            });
        }

        Ok(results)
    }

    /// Deterministic, monotone-in-overlap lexical ranking: the in-process
    /// stand-in for a BM25/`ts_rank_cd` scored text-search column. Ties
    /// break by `chunk_id` for a stable ordering. `fts_config` is accepted
    /// for wire compatibility; see `upsert_chunks`.
    pub async fn search_lexical(
        &self,
        tenant_id: &TenantId,
        query: &str,
        limit: usize,
        fts_config: &str,
    ) -> Vec<LexicalHit> {
        let _ = fts_config;
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let state = self.state.read().await;
        let mut hits: Vec<LexicalHit> = state
            .chunks
            .iter()
            .filter(|((tid, _), _)| tid == tenant_id)
            .filter_map(|((_, chunk_id), chunk)| {
                let tokens = state
                    .lexical_tokens
                    .get(&(tenant_id.clone(), chunk_id.clone()))?;
                let overlap = query_tokens.iter().filter(|t| tokens.contains(t)).count();
                if overlap == 0 {
                    return None;
                }
                Some(LexicalHit {
                    chunk_id: chunk_id.clone(),
                    document_id: chunk.document_id.clone(),
                    content: chunk.content.clone(),
                    page_number: chunk.page_number,
                    source_uri: chunk.source_uri.clone(),
                    metadata: chunk.metadata.clone(),
                    rank: overlap as f32,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.rank
                .partial_cmp(&a.rank)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.0.cmp(&b.chunk_id.0))
        });
        hits.truncate(limit);
        hits
    }

    pub async fn fetch_chunks_by_ids(
        &self,
        tenant_id: &TenantId,
        chunk_ids: &[ChunkId],
    ) -> Vec<Chunk> {
        let state = self.state.read().await;
        chunk_ids
            .iter()
            .filter_map(|id| state.chunks.get(&(tenant_id.clone(), id.clone())).cloned())
            .collect()
    }

    /// Idempotent: re-enqueueing an existing `(tenant, document, reason)`
    /// resets it to `pending` with a cleared error instead of duplicating
    /// the row; `attempts` is left untouched so it never decreases.
    pub async fn enqueue_reindex(
        &self,
        tenant_id: &TenantId,
        document_id: &DocumentId,
        reason: ReindexReason,
        priority: i32,
    ) -> Result<ReindexJob, RepoError> {
        let now = Utc::now();
        let natural_key = (tenant_id.clone(), document_id.clone(), reason);

        let job = {
            let state = self.state.read().await;
            match state.reindex_by_key.get(&natural_key) {
                Some(queue_id) => {
                    let existing = state
                        .reindex_queue
                        .get(queue_id)
                        .expect("queue id indexed");
                    ReindexJob {
                        queue_id: *queue_id,
                        tenant_id: tenant_id.clone(),
                        document_id: document_id.clone(),
                        reason,
                        priority,
                        status: ReindexStatus::Pending,
                        attempts: existing.attempts,
                        last_error: None,
                        created_at: existing.created_at,
                        updated_at: now,
                    }
                }
                None => ReindexJob {
                    queue_id: self.next_queue_id.fetch_add(1, Ordering::SeqCst),
                    tenant_id: tenant_id.clone(),
                    document_id: document_id.clone(),
                    reason,
                    priority,
                    status: ReindexStatus::Pending,
                    attempts: 0,
                    last_error: None,
                    created_at: now,
                    updated_at: now,
                },
            }
        };

        self.append(&WalEntry::EnqueueReindex(job.clone())).await?;

        let mut state = self.state.write().await;
        state.reindex_by_key.insert(natural_key, job.queue_id);
        state.reindex_queue.insert(job.queue_id, job.clone());
        Ok(job)
    }

    /// `pending` rows with `attempts < max_attempts`, ordered by
    /// `priority DESC, created_at ASC` so urgent work leads but steady
    /// inflow cannot starve older low-priority items.
    pub async fn fetch_reindex_queue(
        &self,
        limit: usize,
        max_attempts: u32,
        tenant_id: Option<&TenantId>,
    ) -> Vec<ReindexJob> {
        let state = self.state.read().await;
        let mut items: Vec<ReindexJob> = state
            .reindex_queue
            .values()
            .filter(|j| j.status == ReindexStatus::Pending && j.attempts < max_attempts)
            .filter(|j| tenant_id.map(|t| &j.tenant_id == t).unwrap_or(true))
            .cloned()
            .collect();

        items.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        items.truncate(limit);
        items
    }

    pub async fn mark_reindex_started(&self, queue_id: u64) -> Result<(), RepoError> {
        self.append(&WalEntry::MarkReindexStarted(queue_id)).await?;
        let mut state = self.state.write().await;
        let job = state
            .reindex_queue
            .get_mut(&queue_id)
            .ok_or(RepoError::QueueItemNotFound(queue_id))?;
        job.attempts += 1;
        job.status = ReindexStatus::Processing;
        job.updated_at = Utc::now();
        Ok(())
    }

    pub async fn mark_reindex_success(&self, queue_id: u64) -> Result<(), RepoError> {
        self.append(&WalEntry::MarkReindexSuccess(queue_id)).await?;
        let mut state = self.state.write().await;
        let job = state
            .reindex_queue
            .get_mut(&queue_id)
            .ok_or(RepoError::QueueItemNotFound(queue_id))?;
        job.status = ReindexStatus::Completed;
        job.updated_at = Utc::now();
        Ok(())
    }

    pub async fn mark_reindex_failure(
        &self,
        queue_id: u64,
        error: impl Into<String>,
    ) -> Result<(), RepoError> {
        let error = error.into();
        self.append(&WalEntry::MarkReindexFailure {
            queue_id,
            error: error.clone(),
        })
        .await?;
        let mut state = self.state.write().await;
        let job = state
            .reindex_queue
            .get_mut(&queue_id)
            .ok_or(RepoError::QueueItemNotFound(queue_id))?;
        job.status = ReindexStatus::Failed;
        job.last_error = Some(error);
        job.updated_at = Utc::now();
        Ok(())
    }

    /// Documents whose stored chunks/metadata disagree with the current
    /// schema/embedding model, or haven't been indexed within
    /// `stale_after_days`. Ordered `updated_at DESC`.
    pub async fn find_drift_candidates(
        &self,
        target_schema: &str,
        target_embedding: &str,
        stale_after_days: i64,
        limit: usize,
        tenant_id: Option<&TenantId>,
    ) -> Vec<Document> {
        let now = Utc::now();
        let stale_cutoff = now - Duration::days(stale_after_days);
        let state = self.state.read().await;

        let mut candidates: Vec<Document> = state
            .documents
            .values()
            .filter(|d| tenant_id.map(|t| &d.tenant_id == t).unwrap_or(true))
            .filter(|d| {
                let schema_drift = d.last_schema_version.as_deref() != Some(target_schema);
                let model_drift = d.last_embedding_model.as_deref() != Some(target_embedding);
                let stale = d.last_indexed_at.map(|t| t < stale_cutoff).unwrap_or(true);
                let chunk_drift = state.chunks.iter().any(|((_, _), c)| {
                    c.document_id == d.document_id
                        && c.tenant_id == d.tenant_id
                        && (c.schema_version != target_schema
                            || c.embedding_model != target_embedding)
                });
                schema_drift || model_drift || stale || chunk_drift
            })
            .cloned()
            .collect();

        candidates.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        candidates.truncate(limit);
        candidates
    }
}

fn apply_entry(state: &mut State, entry: WalEntry, max_queue_id: &mut u64) {
    match entry {
        WalEntry::UpsertDocument(record) => {
            let doc: Document = record.into();
            state
                .documents
                .insert((doc.tenant_id.clone(), doc.document_id.clone()), doc);
        }
        WalEntry::UpsertChunk(record) => {
            let chunk: Chunk = record.into();
            let key = (chunk.tenant_id.clone(), chunk.chunk_id.clone());
            state.chunk_by_hash.insert(
                (chunk.tenant_id.clone(), chunk.content_hash.clone()),
                chunk.chunk_id.clone(),
            );
            state
                .lexical_tokens
                .insert(key.clone(), tokenize(&chunk.content));
            state.chunks.insert(key, chunk);
        }
        WalEntry::EnqueueReindex(job) => {
            *max_queue_id = (*max_queue_id).max(job.queue_id);
            state.reindex_by_key.insert(
                (job.tenant_id.clone(), job.document_id.clone(), job.reason),
                job.queue_id,
            );
            state.reindex_queue.insert(job.queue_id, job);
        }
        WalEntry::MarkReindexStarted(queue_id) => {
            if let Some(job) = state.reindex_queue.get_mut(&queue_id) {
                job.attempts += 1;
                job.status = ReindexStatus::Processing;
            }
        }
        WalEntry::MarkReindexSuccess(queue_id) => {
            if let Some(job) = state.reindex_queue.get_mut(&queue_id) {
                job.status = ReindexStatus::Completed;
            }
        }
        WalEntry::MarkReindexFailure { queue_id, error } => {
            if let Some(job) = state.reindex_queue.get_mut(&queue_id) {
                job.status = ReindexStatus::Failed;
                job.last_error = Some(error);
            }
        }
    }
}

fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tenant() -> TenantId {
        TenantId::from("t1")
    }

    fn doc_id() -> DocumentId {
        DocumentId::from("doc-1")
    }

    async fn open_repo() -> (MetadataRepo, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("repo.wal");
        let repo = MetadataRepo::open(&path).await.unwrap();
        (repo, dir)
    }

    #[tokio::test]
    async fn upsert_document_creates_then_coalesces() {
        let (repo, _dir) = open_repo().await;
        let doc = repo
            .upsert_document(DocumentUpsert {
                document_id: doc_id(),
                tenant_id: tenant(),
                filename: Some("a.pdf".into()),
                blob_uri: Some("gs://bucket/a.pdf".into()),
                status: Some(DocumentStatus::Processing),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Processing);
        assert_eq!(doc.filename, "a.pdf");

        let updated = repo
            .upsert_document(DocumentUpsert {
                document_id: doc_id(),
                tenant_id: tenant(),
                status: Some(DocumentStatus::Completed),
                chunk_count: Some(3),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(updated.filename, "a.pdf");
        assert_eq!(updated.blob_uri, "gs://bucket/a.pdf");
        assert_eq!(updated.status, DocumentStatus::Completed);
        assert_eq!(updated.chunk_count, 3);
    }

    #[tokio::test]
    async fn upsert_chunks_is_idempotent_by_content_hash() {
        let (repo, _dir) = open_repo().await;
        let input = UpsertChunkInput {
            chunk_id: ChunkId::from("fresh-1"),
            chunk_index: 0,
            content: "Alpha Bravo Charlie".to_string(),
            embedding_model: "embedding-default-v1".to_string(),
            source_uri: "gs://bucket/a.pdf".to_string(),
            page_number: Some(1),
            metadata: HashMap::new(),
            values: vec![0.1, 0.2],
        };

        let first = repo
            .upsert_chunks(
                &tenant(),
                &doc_id(),
                vec![input.clone()],
                "2024-09-24",
                "english",
                "gs://bucket/a.pdf",
            )
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        let first_id = first[0].chunk.chunk_id.clone();

        let mut rerun_input = input;
        rerun_input.chunk_id = ChunkId::from("fresh-2");
        let second = repo
            .upsert_chunks(
                &tenant(),
                &doc_id(),
                vec![rerun_input],
                "2024-09-24",
                "english",
                "gs://bucket/a.pdf",
            )
            .await
            .unwrap();

        assert_eq!(
            second[0].chunk.chunk_id, first_id,
            "content hash collision must reuse chunk_id"
        );
    }

    #[tokio::test]
    async fn search_lexical_ranks_by_overlap_and_breaks_ties_by_chunk_id() {
        let (repo, _dir) = open_repo().await;
        for (id, content) in [("b", "Bravo only"), ("a", "Bravo only")] {
            repo.upsert_chunks(
                &tenant(),
                &doc_id(),
                vec![UpsertChunkInput {
                    chunk_id: ChunkId::from(id),
                    chunk_index: 0,
                    content: content.to_string(),
                    embedding_model: "embedding-default-v1".to_string(),
                    source_uri: "gs://bucket/a.pdf".to_string(),
                    page_number: None,
                    metadata: HashMap::new(),
                    values: vec![0.1],
                }],
                "2024-09-24",
                "english",
                "gs://bucket/a.pdf",
            )
            .await
            .unwrap();
        }

        let hits = repo.search_lexical(&tenant(), "Bravo", 10, "english").await;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id.as_str(), "a");
        assert_eq!(hits[1].chunk_id.as_str(), "b");
    }

    #[tokio::test]
    async fn enqueue_reindex_coalesces_and_never_decreases_attempts() {
        let (repo, _dir) = open_repo().await;
        let job = repo
            .enqueue_reindex(&tenant(), &doc_id(), ReindexReason::Drift, 5)
            .await
            .unwrap();
        repo.mark_reindex_started(job.queue_id).await.unwrap();
        repo.mark_reindex_failure(job.queue_id, "boom").await.unwrap();

        let re_enqueued = repo
            .enqueue_reindex(&tenant(), &doc_id(), ReindexReason::Drift, 5)
            .await
            .unwrap();

        assert_eq!(re_enqueued.queue_id, job.queue_id, "coalesces, no duplicate row");
        assert_eq!(re_enqueued.status, ReindexStatus::Pending);
        assert!(re_enqueued.last_error.is_none());
        assert_eq!(re_enqueued.attempts, 1, "attempts must not decrease");

        let queue = repo.fetch_reindex_queue(10, 3, None).await;
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn fetch_reindex_queue_orders_priority_then_fifo() {
        let (repo, _dir) = open_repo().await;
        repo.enqueue_reindex(&tenant(), &DocumentId::from("low"), ReindexReason::Manual, 1)
            .await
            .unwrap();
        repo.enqueue_reindex(&tenant(), &DocumentId::from("high"), ReindexReason::Manual, 9)
            .await
            .unwrap();

        let queue = repo.fetch_reindex_queue(10, 3, None).await;
        assert_eq!(queue[0].document_id.as_str(), "high");
        assert_eq!(queue[1].document_id.as_str(), "low");
    }

    #[tokio::test]
    async fn find_drift_candidates_flags_schema_mismatch() {
        let (repo, _dir) = open_repo().await;
        repo.upsert_document(DocumentUpsert {
            document_id: doc_id(),
            tenant_id: tenant(),
            last_schema_version: Some("2024-09-24".to_string()),
            last_embedding_model: Some("embedding-default-v1".to_string()),
            last_indexed_at: Some(Utc::now()),
            ..Default::default()
        })
        .await
        .unwrap();

        let candidates = repo
            .find_drift_candidates("2024-12-01", "embedding-default-v1", 30, 10, None)
            .await;
        assert_eq!(candidates.len(), 1);
    }

    #[tokio::test]
    async fn repo_replays_wal_on_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("repo.wal");
        {
            let repo = MetadataRepo::open(&path).await.unwrap();
            repo.upsert_document(DocumentUpsert {
                document_id: doc_id(),
                tenant_id: tenant(),
                filename: Some("a.pdf".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        }

        let repo = MetadataRepo::open(&path).await.unwrap();
        let doc = repo.get_document(&tenant(), &doc_id()).await.unwrap();
        assert_eq!(doc.filename, "a.pdf");
    }
}
