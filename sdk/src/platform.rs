use std::path::PathBuf;
use std::sync::Arc;

use alayasiki_core::audit::{AuditSink, JsonlAuditSink};
use alayasiki_core::config::AppConfig;
use alayasiki_core::model::{Document, DocumentId, TenantId};
use ingestion::extract::{BlobStore, DocumentLoader, FilesystemBlobStore, PdfLoader};
use ingestion::policy::BasicPolicy;
use ingestion::worker::{run_pull_loop, Disposition, IngestionWorker};
use ingestion::{DeterministicEmbeddingProvider, EmbeddingPipeline, EmbeddingProvider, IngestionMessage};
use jobs::{ReindexRunner, ReindexSummary};
use query::{DeterministicReranker, Reranker, RetrievalEngine, RetrievalError, RetrievalResponse};
use storage::{MetadataRepo, VectorStore};
use tokio::sync::mpsc;

use crate::error::PlatformError;

/// Outcome of handling one `/pubsub/push` envelope: this crate stops at the
/// status code a caller should answer with and never binds a socket itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Acked,
    Nacked,
}

impl PushOutcome {
    pub fn http_status(&self) -> u16 {
        match self {
            PushOutcome::Acked => 200,
            PushOutcome::Nacked => 500,
        }
    }
}

/// One wired-up instance of every component in this repo, assembled from a
/// single `AppConfig` and handed to embedders (an HTTP layer, a CLI, a test
/// harness) as a single handle. Holds no transport of its own.
pub struct Platform {
    repo: Arc<MetadataRepo>,
    vector_store: Arc<VectorStore>,
    worker: Arc<IngestionWorker>,
    engine: Arc<RetrievalEngine>,
    runner: Arc<ReindexRunner>,
    audit: Arc<dyn AuditSink>,
}

impl Platform {
    /// Wires up every component for production use: a real PDF loader and a
    /// JSONL audit trail under `config.storage.data_dir`.
    pub async fn init(config: AppConfig) -> Result<Self, PlatformError> {
        Self::init_with_loader(config, Arc::new(PdfLoader)).await
    }

    /// Same wiring as `init` with the document loader injected. Tests use
    /// this to stand in for `pdf-extract` without shipping real PDF bytes.
    pub async fn init_with_loader(
        config: AppConfig,
        loader: Arc<dyn DocumentLoader>,
    ) -> Result<Self, PlatformError> {
        let data_dir = PathBuf::from(&config.storage.data_dir);
        std::fs::create_dir_all(&data_dir)
            .map_err(|e| PlatformError::TempDir(data_dir.display().to_string(), e))?;

        let wal_path = data_dir.join("metadata.wal");
        let repo = Arc::new(MetadataRepo::open(&wal_path).await?);
        let vector_store = Arc::new(VectorStore::new());

        let audit: Arc<dyn AuditSink> =
            Arc::new(JsonlAuditSink::open(data_dir.join("audit.jsonl"))?);

        let embedder = Arc::new(DeterministicEmbeddingProvider::new(
            config.processing.embedding_model.clone(),
        ));
        let policy = Arc::new(BasicPolicy::new(&config.guardrails));
        let blob_store: Arc<dyn BlobStore> = Arc::new(FilesystemBlobStore);

        let pipeline = Arc::new(EmbeddingPipeline::new(loader, embedder.clone(), policy));

        let temp_dir = data_dir.join("tmp");
        std::fs::create_dir_all(&temp_dir)
            .map_err(|e| PlatformError::TempDir(temp_dir.display().to_string(), e))?;

        let worker = Arc::new(IngestionWorker::new(
            repo.clone(),
            vector_store.clone(),
            blob_store.clone(),
            pipeline.clone(),
            audit.clone(),
            config.processing.clone(),
            config.retrieval.chunk_schema_version.clone(),
            config.retrieval.fts_config.clone(),
            temp_dir.clone(),
        ));

        let reranker: Arc<dyn Reranker> = Arc::new(DeterministicReranker);
        let engine = Arc::new(RetrievalEngine::new(
            repo.clone(),
            vector_store.clone(),
            embedder as Arc<dyn EmbeddingProvider>,
            reranker,
            config.retrieval.clone(),
        ));

        let runner = Arc::new(ReindexRunner::new(
            repo.clone(),
            vector_store.clone(),
            blob_store,
            pipeline,
            audit.clone(),
            config.reindex.clone(),
            config.processing.clone(),
            config.retrieval.chunk_schema_version.clone(),
            config.retrieval.fts_config.clone(),
            temp_dir,
        ));

        Ok(Self {
            repo,
            vector_store,
            worker,
            engine,
            runner,
            audit,
        })
    }

    /// Processes one ingestion message synchronously and returns the
    /// broker disposition (ack/nack) — the pull-subscriber path.
    pub async fn ingest_message(&self, message: IngestionMessage) -> Disposition {
        self.worker.process_message(message).await
    }

    /// Handles one `POST /pubsub/push` envelope: parses the body, processes
    /// it, and maps the outcome onto the status code contract a push
    /// endpoint answers with. A parse failure is itself permanent and
    /// acked, matching `IngestionError::is_permanent` for message errors.
    pub async fn handle_push(&self, envelope: &serde_json::Value) -> PushOutcome {
        match IngestionMessage::parse_push(envelope) {
            Ok(message) => match self.worker.process_message(message).await {
                Disposition::Ack => PushOutcome::Acked,
                Disposition::Nack => PushOutcome::Nacked,
            },
            Err(e) => {
                tracing::warn!(error = %e, "rejected malformed push envelope");
                PushOutcome::Acked
            }
        }
    }

    /// Runs the pull-subscriber loop against a channel of messages until
    /// shutdown, draining in-flight work first.
    pub async fn run_ingestion_loop(self: &Arc<Self>, messages: mpsc::Receiver<IngestionMessage>) {
        run_pull_loop(self.worker.clone(), messages).await;
    }

    /// Hybrid dense + lexical retrieval for one tenant's query.
    pub async fn ask(&self, tenant_id: &TenantId, query: &str) -> Result<RetrievalResponse, RetrievalError> {
        self.engine.retrieve(tenant_id, query).await
    }

    /// Runs one drift-scan-and-reindex pass, optionally scoped to a tenant.
    pub async fn reindex(&self, tenant_id: Option<&TenantId>, limit: usize, dry_run: bool) -> ReindexSummary {
        self.runner.run(tenant_id, limit, dry_run).await
    }

    pub async fn get_document(&self, tenant_id: &TenantId, document_id: &DocumentId) -> Option<Document> {
        self.repo.get_document(tenant_id, document_id).await
    }

    /// Number of vectors currently indexed for a tenant, exposed for
    /// diagnostics and tests.
    pub async fn namespace_size(&self, tenant_id: &TenantId) -> usize {
        self.vector_store.namespace_len(tenant_id).await
    }

    /// Liveness/readiness probe: every component here is in-process, so a
    /// successful call into this method is itself the health signal.
    pub fn is_healthy(&self) -> bool {
        true
    }

    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }
}
