use std::path::PathBuf;
use std::sync::Arc;

use alayasiki_core::audit::{AuditEvent, AuditOperation, AuditOutcome, AuditSink};
use alayasiki_core::config::ProcessingConfig;
use alayasiki_core::correlation::CorrelationContext;
use alayasiki_core::model::{Document, DocumentStatus};
use storage::{DocumentUpsert, MetadataRepo, UpsertChunkInput, VectorStore};
use tokio::sync::Semaphore;
use tracing::Instrument;

use crate::error::IngestionError;
use crate::extract::{BlobStore, ScopedTempFile};
use crate::message::IngestionMessage;
use crate::pipeline::{EmbeddingPipeline, PipelineConfig};

/// Bounds concurrent in-flight messages for backpressure. Fixed at 5 rather
/// than exposed as a config knob.
pub const MAX_CONCURRENT_MESSAGES: usize = 5;

/// Outcome of a single message, driving the caller's ack/nack decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Nack,
}

pub struct IngestionWorker {
    repo: Arc<MetadataRepo>,
    vector_store: Arc<VectorStore>,
    blob_store: Arc<dyn BlobStore>,
    pipeline: Arc<EmbeddingPipeline>,
    audit: Arc<dyn AuditSink>,
    processing: ProcessingConfig,
    schema_version: String,
    fts_config: String,
    temp_dir: PathBuf,
    semaphore: Arc<Semaphore>,
}

impl IngestionWorker {
    pub fn new(
        repo: Arc<MetadataRepo>,
        vector_store: Arc<VectorStore>,
        blob_store: Arc<dyn BlobStore>,
        pipeline: Arc<EmbeddingPipeline>,
        audit: Arc<dyn AuditSink>,
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
            processing,
            schema_version,
            fts_config,
            temp_dir,
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_MESSAGES)),
        }
    }

    /// Process one message end to end, applying the ingestion state machine.
    /// Never panics on a handleable failure: returns `Disposition` so the
    /// caller (pull loop or push handler) can ack or nack.
    pub async fn process_message(&self, message: IngestionMessage) -> Disposition {
        let _permit = self.semaphore.acquire().await.expect("semaphore not closed");

        let ctx = CorrelationContext::new(message.request_id.clone(), message.tenant_id.clone())
            .with_document(message.document_id.clone());

        let span = tracing::info_span!(
            "ingestion.process_message",
            request_id = %ctx.request_id,
            tenant_id = %ctx.tenant_id,
            document_id = %message.document_id,
        );

        self.run(message, ctx).instrument(span).await
    }

    async fn run(&self, message: IngestionMessage, ctx: CorrelationContext) -> Disposition {
        match self.try_process(&message).await {
            Ok(chunk_count) => {
                tracing::info!(chunk_count, "document ingested");
                self.record_audit(&ctx, AuditOutcome::Succeeded, None);
                Disposition::Ack
            }
            Err(err) => {
                tracing::warn!(error = %err, taxonomy_code = err.taxonomy_code(), "ingestion failed");
                let _ = self
                    .repo
                    .upsert_document(DocumentUpsert {
                        document_id: message.document_id.clone(),
                        tenant_id: message.tenant_id.clone(),
                        status: Some(DocumentStatus::Failed),
                        last_error: Some(Some(err.to_string())),
                        ..Default::default()
                    })
                    .await;
                self.record_audit(&ctx, AuditOutcome::Failed, Some(err.to_string()));
                if err.is_permanent() {
                    Disposition::Ack
                } else {
                    Disposition::Nack
                }
            }
        }
    }

    async fn try_process(&self, message: &IngestionMessage) -> Result<u32, IngestionError> {
        // 1. Mark document processing, preserving submitted_at.
        self.repo
            .upsert_document(DocumentUpsert {
                document_id: message.document_id.clone(),
                tenant_id: message.tenant_id.clone(),
                filename: Some(message.filename.clone()),
                blob_uri: Some(message.blob_uri.clone()),
                status: Some(DocumentStatus::Processing),
                submitted_at: Some(message.submitted_at),
                ..Default::default()
            })
            .await?;

        // 2. Download blob to a scoped temp file, cleaned up on every exit
        // path via `ScopedTempFile`'s `Drop`.
        let temp_file = ScopedTempFile::new(&self.temp_dir, message.document_id.as_str());
        self.blob_store
            .download(&message.blob_uri, temp_file.path())
            .await?;

        // 3. Run EmbeddingPipeline with chunk_config from the message (or
        // defaults).
        let pipeline_config = PipelineConfig::with_override(&self.processing, &message.chunk_config);
        let chunks = self
            .pipeline
            .process(
                temp_file.path(),
                &message.blob_uri,
                &message.attributes,
                &pipeline_config,
            )
            .await?;

        // 4. Persist chunks via MetadataRepo (idempotent by content hash).
        let inputs: Vec<UpsertChunkInput> = chunks
            .iter()
            .map(|c| UpsertChunkInput {
                chunk_id: c.chunk_id.clone(),
                chunk_index: c.chunk_index,
                content: c.content.clone(),
                embedding_model: self.pipeline_model_id(),
                source_uri: message.blob_uri.clone(),
                page_number: c.page_number,
                metadata: c.metadata.clone(),
                values: c.vector.clone(),
            })
            .collect();

        let upserted = self
            .repo
            .upsert_chunks(
                &message.tenant_id,
                &message.document_id,
                inputs,
                &self.schema_version,
                &self.fts_config,
                &message.blob_uri,
            )
            .await?;

        // 5. Upsert embeddings via VectorStore.
        let embeddings = upserted
            .iter()
            .map(|u| alayasiki_core::model::Embedding {
                chunk_id: u.chunk.chunk_id.clone(),
                tenant_id: message.tenant_id.clone(),
                values: u.values.clone(),
                metadata: u.chunk.metadata.clone(),
            })
            .collect();
        self.vector_store
            .upsert_embeddings(&message.tenant_id, embeddings)
            .await?;

        // 6. Mark document completed.
        let chunk_count = upserted.len() as u32;
        self.repo
            .upsert_document(DocumentUpsert {
                document_id: message.document_id.clone(),
                tenant_id: message.tenant_id.clone(),
                status: Some(DocumentStatus::Completed),
                chunk_count: Some(chunk_count),
                last_error: Some(None),
                last_indexed_at: Some(chrono::Utc::now()),
                last_schema_version: Some(self.schema_version.clone()),
                last_embedding_model: Some(self.pipeline_model_id()),
                ..Default::default()
            })
            .await?;

        Ok(chunk_count)
    }

    fn pipeline_model_id(&self) -> String {
        self.processing.embedding_model.clone()
    }

    fn record_audit(&self, ctx: &CorrelationContext, outcome: AuditOutcome, error: Option<String>) {
        let mut event = AuditEvent::new(AuditOperation::Ingest, outcome);
        event.actor = Some(ctx.request_id.clone());
        event.tenant = Some(ctx.tenant_id.to_string());
        event.document_id = ctx.document_id.as_ref().map(|d| d.to_string());
        if let Some(error) = error {
            event.metadata.insert("error".to_string(), error);
        }
        if let Err(e) = self.audit.record(event) {
            tracing::warn!(error = %e, "failed to record audit event");
        }
    }

    pub async fn get_document(
        &self,
        tenant_id: &alayasiki_core::model::TenantId,
        document_id: &alayasiki_core::model::DocumentId,
    ) -> Option<Document> {
        self.repo.get_document(tenant_id, document_id).await
    }
}

/// Runs `process_message` concurrently over a channel of messages, pulling
/// at most `MAX_CONCURRENT_MESSAGES` at once (enforced by the worker's own
/// semaphore), until `tokio::signal::ctrl_c` or, on unix, SIGTERM fires.
/// In-flight messages are allowed to drain before returning: cancellation
/// stops new pulls, it doesn't abort callbacks already in progress.
pub async fn run_pull_loop(
    worker: Arc<IngestionWorker>,
    mut messages: tokio::sync::mpsc::Receiver<IngestionMessage>,
) {
    let mut in_flight = tokio::task::JoinSet::new();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to install SIGTERM handler");

    loop {
        tokio::select! {
            biased;
            _ = &mut ctrl_c => {
                tracing::info!("SIGINT received, draining in-flight ingestion work");
                break;
            }
            #[cfg(unix)]
            _ = sigterm.recv() => {
                tracing::info!("SIGTERM received, draining in-flight ingestion work");
                break;
            }
            maybe_message = messages.recv() => {
                match maybe_message {
                    Some(message) => {
                        let worker = worker.clone();
                        in_flight.spawn(async move { worker.process_message(message).await });
                    }
                    None => break,
                }
            }
        }
    }

    while in_flight.join_next().await.is_some() {}
    tracing::info!("ingestion worker stopped");
}
