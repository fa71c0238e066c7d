use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use alayasiki_core::audit::{AuditEvent, AuditOperation, AuditOutcome, AuditSink};
use alayasiki_core::config::{ProcessingConfig, ReindexConfig};
use alayasiki_core::correlation::CorrelationContext;
use alayasiki_core::model::{DocumentStatus, Embedding, ReindexJob, ReindexReason, TenantId};
use ingestion::extract::ScopedTempFile;
use ingestion::{BlobStore, EmbeddingPipeline, PipelineConfig};
use serde::Serialize;
use storage::{DocumentUpsert, MetadataRepo, UpsertChunkInput, VectorStore};
use tracing::Instrument;

use crate::error::ReindexError;

/// Outcome of one `ReindexRunner::run` invocation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReindexSummary {
    pub processed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub duration_seconds: f64,
}

/// Nightly/on-demand drift detection and backfill. Scans for
/// documents whose stored chunks disagree with the current schema or
/// embedding model, enqueues them alongside any manually requested work, and
/// reindexes queued items one at a time so that a single bad document can't
/// stall or crowd out the rest of a run.
pub struct ReindexRunner {
    repo: Arc<MetadataRepo>,
    vector_store: Arc<VectorStore>,
    blob_store: Arc<dyn BlobStore>,
    pipeline: Arc<EmbeddingPipeline>,
    audit: Arc<dyn AuditSink>,
    config: ReindexConfig,
    processing: ProcessingConfig,
    schema_version: String,
    fts_config: String,
    temp_dir: PathBuf,
}

impl ReindexRunner {
    pub fn new(
        repo: Arc<MetadataRepo>,
        vector_store: Arc<VectorStore>,
        blob_store: Arc<dyn BlobStore>,
        pipeline: Arc<EmbeddingPipeline>,
        audit: Arc<dyn AuditSink>,
        config: ReindexConfig,
        processing: ProcessingConfig,
        schema_version: String,
        fts_config: String,
        temp_dir: PathBuf,
    ) -> Self {
        Self {
            repo,
            vector_store,
            blob_store,
            pipeline,
            audit,
            config,
            processing,
            schema_version,
            fts_config,
            temp_dir,
        }
    }

    /// Runs one reindex pass: scan drift, enqueue, then drain up to `limit`
    /// pending queue items sequentially; processing items in parallel
    /// within a single run is explicitly not done — a later run picks up
    /// whatever this one didn't reach.
    pub async fn run(
        &self,
        tenant_id: Option<&TenantId>,
        limit: usize,
        dry_run: bool,
    ) -> ReindexSummary {
        let start = Instant::now();

        let drift_candidates = self
            .repo
            .find_drift_candidates(
                &self.schema_version,
                &self.processing.embedding_model,
                self.config.stale_after_days,
                self.config.queue_poll_limit,
                tenant_id,
            )
            .await;

        for candidate in &drift_candidates {
            if let Err(e) = self
                .repo
                .enqueue_reindex(
                    &candidate.tenant_id,
                    &candidate.document_id,
                    ReindexReason::Drift,
                    5,
                )
                .await
            {
                tracing::warn!(error = %e, document_id = %candidate.document_id, "failed to enqueue drift candidate");
            }
        }

        let queue_limit = self.config.queue_poll_limit.min(limit);
        let queue_items = self
            .repo
            .fetch_reindex_queue(queue_limit, self.config.max_attempts, tenant_id)
            .await;

        let mut processed = 0u32;
        let mut failed = 0u32;
        let mut skipped = 0u32;

        for item in queue_items.into_iter().take(limit) {
            if dry_run {
                skipped += 1;
                tracing::info!(
                    tenant_id = %item.tenant_id,
                    document_id = %item.document_id,
                    queue_id = item.queue_id,
                    reason = %item.reason,
                    "dry-run: would reindex document"
                );
                continue;
            }

            match self.process_item(&item).await {
                Ok(()) => processed += 1,
                Err(e) => {
                    failed += 1;
                    tracing::warn!(
                        error = %e,
                        taxonomy_code = e.taxonomy_code(),
                        tenant_id = %item.tenant_id,
                        document_id = %item.document_id,
                        queue_id = item.queue_id,
                        "failed to reindex document"
                    );
                    if let Err(mark_err) =
                        self.repo.mark_reindex_failure(item.queue_id, e.to_string()).await
                    {
                        tracing::warn!(error = %mark_err, queue_id = item.queue_id, "failed to record reindex failure");
                    }
                    self.record_failed_attempt(item).await;
                }
            }
        }

        let duration_seconds = start.elapsed().as_secs_f64();
        tracing::info!(processed, failed, skipped, duration_seconds, "reindex job completed");
        self.record_audit(tenant_id, processed, failed);

        ReindexSummary {
            processed,
            failed,
            skipped,
            duration_seconds,
        }
    }

    async fn process_item(&self, item: &ReindexJob) -> Result<(), ReindexError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let ctx = CorrelationContext::new(request_id, item.tenant_id.clone())
            .with_document(item.document_id.clone());
        let span = tracing::info_span!(
            "reindex.process_item",
            request_id = %ctx.request_id,
            tenant_id = %ctx.tenant_id,
            document_id = %item.document_id,
            queue_id = item.queue_id,
        );

        self.do_process_item(item).instrument(span).await
    }

    async fn do_process_item(&self, item: &ReindexJob) -> Result<(), ReindexError> {
        self.repo.mark_reindex_started(item.queue_id).await?;

        let document = self
            .repo
            .get_document(&item.tenant_id, &item.document_id)
            .await
            .ok_or_else(|| {
                ReindexError::Blob(ingestion::BlobError::NotFound(format!(
                    "document {} has no blob_uri on record",
                    item.document_id
                )))
            })?;

        let temp_file = ScopedTempFile::new(&self.temp_dir, item.document_id.as_str());
        self.blob_store
            .download(&document.blob_uri, temp_file.path())
            .await?;

        let mut context = std::collections::HashMap::new();
        context.insert("tenant_id".to_string(), item.tenant_id.to_string());
        context.insert("document_id".to_string(), item.document_id.to_string());
        context.insert("source_path".to_string(), document.blob_uri.clone());
        context.insert("reason".to_string(), item.reason.to_string());

        let pipeline_config = PipelineConfig {
            chunk_size: self.processing.chunk_size,
            chunk_overlap: self.processing.chunk_overlap,
        };
        let chunks = self
            .pipeline
            .process(temp_file.path(), &document.blob_uri, &context, &pipeline_config)
            .await?;

        let inputs: Vec<UpsertChunkInput> = chunks
            .iter()
            .map(|c| UpsertChunkInput {
                chunk_id: c.chunk_id.clone(),
                chunk_index: c.chunk_index,
                content: c.content.clone(),
                embedding_model: self.processing.embedding_model.clone(),
                source_uri: document.blob_uri.clone(),
                page_number: c.page_number,
                metadata: c.metadata.clone(),
                values: c.vector.clone(),
            })
            .collect();

        let upserted = self
            .repo
            .upsert_chunks(
                &item.tenant_id,
                &item.document_id,
                inputs,
                &self.schema_version,
                &self.fts_config,
                &document.blob_uri,
            )
            .await?;

        let embeddings: Vec<Embedding> = upserted
            .iter()
            .map(|u| Embedding {
                chunk_id: u.chunk.chunk_id.clone(),
                tenant_id: item.tenant_id.clone(),
                values: u.values.clone(),
                metadata: u.chunk.metadata.clone(),
            })
            .collect();
        self.vector_store
            .upsert_embeddings(&item.tenant_id, embeddings)
            .await?;

        let chunk_count = upserted.len() as u32;
        self.repo
            .upsert_document(DocumentUpsert {
                document_id: item.document_id.clone(),
                tenant_id: item.tenant_id.clone(),
                status: Some(DocumentStatus::Completed),
                chunk_count: Some(chunk_count),
                last_error: Some(None),
                last_indexed_at: Some(chrono::Utc::now()),
                last_schema_version: Some(self.schema_version.clone()),
                last_embedding_model: Some(self.processing.embedding_model.clone()),
                ..Default::default()
            })
            .await?;

        self.repo.mark_reindex_success(item.queue_id).await?;
        tracing::info!(chunk_count, document_id = %item.document_id, "reindexed document");
        Ok(())
    }

    /// Bumps the document's own `reindex_attempts` counter after a failed
    /// `process_item`, independent of the queue row's `attempts` field.
    async fn record_failed_attempt(&self, item: &ReindexJob) {
        let Some(document) = self
            .repo
            .get_document(&item.tenant_id, &item.document_id)
            .await
        else {
            return;
        };
        if let Err(e) = self
            .repo
            .upsert_document(DocumentUpsert {
                document_id: item.document_id.clone(),
                tenant_id: item.tenant_id.clone(),
                reindex_attempts: Some(document.reindex_attempts + 1),
                ..Default::default()
            })
            .await
        {
            tracing::warn!(error = %e, document_id = %item.document_id, "failed to record reindex attempt on document");
        }
    }

    fn record_audit(&self, tenant_id: Option<&TenantId>, processed: u32, failed: u32) {
        let outcome = if failed == 0 {
            AuditOutcome::Succeeded
        } else {
            AuditOutcome::Failed
        };
        let mut event = AuditEvent::new(AuditOperation::Reindex, outcome);
        event.tenant = tenant_id.map(|t| t.to_string());
        event
            .metadata
            .insert("processed".to_string(), processed.to_string());
        event.metadata.insert("failed".to_string(), failed.to_string());
        if let Err(e) = self.audit.record(event) {
            tracing::warn!(error = %e, "failed to record reindex audit event");
        }
    }
}
