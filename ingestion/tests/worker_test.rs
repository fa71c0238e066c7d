use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use alayasiki_core::model::{DocumentStatus, TenantId};
use async_trait::async_trait;
use chrono::Utc;
use ingestion::chunker::Page;
use ingestion::error::{BlobError, PipelineError};
use ingestion::extract::{BlobStore, DocumentLoader};
use ingestion::message::{ChunkConfigOverride, IngestionMessage};
use ingestion::pipeline::EmbeddingPipeline;
use ingestion::policy::NoOpPolicy;
use ingestion::worker::{Disposition, IngestionWorker};
use ingestion::DeterministicEmbeddingProvider;
use storage::{MetadataRepo, VectorStore};
use tempfile::tempdir;

struct FakeBlobStore;

#[async_trait]
impl BlobStore for FakeBlobStore {
    async fn download(&self, blob_uri: &str, destination: &Path) -> Result<(), BlobError> {
        if blob_uri == "gs://bucket/missing.pdf" {
            return Err(BlobError::NotFound(blob_uri.to_string()));
        }
        tokio::fs::write(destination, b"stand-in for downloaded bytes")
            .await
            .map_err(|e| BlobError::Transient(e.to_string()))?;
        Ok(())
    }
}

struct RepeatingLoader(String);

impl DocumentLoader for RepeatingLoader {
    fn load(&self, _path: &Path) -> Result<Vec<Page>, PipelineError> {
        Ok(vec![
            Page {
                text: self.0.clone(),
                page_number: Some(1),
            },
            Page {
                text: self.0.clone(),
                page_number: Some(2),
            },
            Page {
                text: self.0.clone(),
                page_number: Some(3),
            },
        ])
    }
}

fn message(chunk_size: usize, chunk_overlap: usize) -> IngestionMessage {
    let mut attributes = HashMap::new();
    attributes.insert("env".to_string(), "test".to_string());
    IngestionMessage {
        request_id: "req-1".to_string(),
        tenant_id: TenantId::from("tenant-a"),
        document_id: "doc-1".into(),
        filename: "brief.pdf".to_string(),
        content_type: "application/pdf".to_string(),
        blob_uri: "gs://bucket/brief.pdf".to_string(),
        chunk_config: ChunkConfigOverride {
            size: Some(chunk_size),
            overlap: Some(chunk_overlap),
        },
        submitted_at: Utc::now(),
        attributes,
    }
}

async fn build_worker(text: &str, temp_dir: &Path) -> (Arc<IngestionWorker>, Arc<MetadataRepo>, Arc<VectorStore>) {
    let dir = tempdir().unwrap();
    let repo = Arc::new(MetadataRepo::open(dir.path().join("repo.wal")).await.unwrap());
    let vector_store = Arc::new(VectorStore::new());

    let pipeline = Arc::new(EmbeddingPipeline::new(
        Arc::new(RepeatingLoader(text.to_string())),
        Arc::new(DeterministicEmbeddingProvider::new("embedding-default-v1")),
        Arc::new(NoOpPolicy),
    ));

    let worker = Arc::new(IngestionWorker::new(
        repo.clone(),
        vector_store.clone(),
        Arc::new(FakeBlobStore),
        pipeline,
        Arc::new(alayasiki_core::audit::InMemoryAuditSink::default()),
        alayasiki_core::config::ProcessingConfig::default(),
        "2024-09-24".to_string(),
        "english".to_string(),
        temp_dir.to_path_buf(),
    ));

    // `dir` (the repo's WAL directory) must outlive the worker's use of
    // `repo`; leak it for the test's duration rather than threading an extra
    // guard through every call site.
    std::mem::forget(dir);

    (worker, repo, vector_store)
}

#[tokio::test]
async fn s1_ingest_produces_chunks_queryable_in_the_tenant_namespace() {
    let temp_dir = tempdir().unwrap();
    let (worker, repo, vector_store) =
        build_worker("Alpha Bravo Charlie ", temp_dir.path()).await;

    let msg = message(50, 10);
    let disposition = worker.process_message(msg.clone()).await;
    assert_eq!(disposition, Disposition::Ack);

    let doc = repo
        .get_document(&msg.tenant_id, &msg.document_id)
        .await
        .unwrap();
    assert_eq!(doc.status, DocumentStatus::Completed);
    assert!(doc.chunk_count >= 3, "chunk_count was {}", doc.chunk_count);

    let hits = repo.search_lexical(&msg.tenant_id, "Bravo", 10, "english").await;
    assert!(!hits.is_empty());
    for hit in &hits {
        assert_eq!(hit.document_id, msg.document_id);
    }

    assert!(vector_store.namespace_len(&msg.tenant_id).await >= doc.chunk_count as usize);
}

#[tokio::test]
async fn s2_duplicate_delivery_converges_without_duplicating_chunks() {
    let temp_dir = tempdir().unwrap();
    let (worker, repo, vector_store) =
        build_worker("Alpha Bravo Charlie ", temp_dir.path()).await;

    let msg = message(50, 10);

    let first = worker.process_message(msg.clone()).await;
    assert_eq!(first, Disposition::Ack);
    let doc_after_first = repo
        .get_document(&msg.tenant_id, &msg.document_id)
        .await
        .unwrap();

    let second = worker.process_message(msg.clone()).await;
    assert_eq!(second, Disposition::Ack);
    let doc_after_second = repo
        .get_document(&msg.tenant_id, &msg.document_id)
        .await
        .unwrap();

    assert_eq!(doc_after_first.chunk_count, doc_after_second.chunk_count);
    assert_eq!(
        vector_store.namespace_len(&msg.tenant_id).await,
        doc_after_first.chunk_count as usize
    );
}

#[tokio::test]
async fn blob_not_found_is_permanent_and_marks_document_failed() {
    let temp_dir = tempdir().unwrap();
    let (worker, repo, _vector_store) =
        build_worker("irrelevant", temp_dir.path()).await;

    let mut msg = message(50, 10);
    msg.blob_uri = "gs://bucket/missing.pdf".to_string();

    let disposition = worker.process_message(msg.clone()).await;
    assert_eq!(disposition, Disposition::Ack);

    let doc = repo
        .get_document(&msg.tenant_id, &msg.document_id)
        .await
        .unwrap();
    assert_eq!(doc.status, DocumentStatus::Failed);
}
