use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use alayasiki_core::config::{
    AppConfig, GuardrailsConfig, ProcessingConfig, ReindexConfig, RetrievalConfig, ServerConfig,
    StorageConfig,
};
use alayasiki_core::model::TenantId;
use chrono::Utc;
use ingestion::chunker::Page;
use ingestion::error::PipelineError;
use ingestion::extract::DocumentLoader;
use ingestion::message::ChunkConfigOverride;
use ingestion::worker::Disposition;
use ingestion::IngestionMessage;
use alayasiki_sdk::Platform;
use tempfile::tempdir;

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
        ])
    }
}

fn test_config(data_dir: &Path) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        storage: StorageConfig {
            data_dir: data_dir.display().to_string(),
            wal_flush_interval_ms: 50,
        },
        processing: ProcessingConfig::default(),
        retrieval: RetrievalConfig::default(),
        reindex: ReindexConfig::default(),
        guardrails: GuardrailsConfig::default(),
    }
}

async fn build_platform(text: &str, blob_path: &Path) -> (Arc<Platform>, String) {
    let data_dir = tempdir().unwrap();
    let config = test_config(data_dir.path());
    let platform = Platform::init_with_loader(config, Arc::new(RepeatingLoader(text.to_string())))
        .await
        .unwrap();
    std::mem::forget(data_dir);

    tokio::fs::write(blob_path, b"stand-in for downloaded bytes")
        .await
        .unwrap();
    let blob_uri = format!("file://{}", blob_path.display());
    (Arc::new(platform), blob_uri)
}

fn message(blob_uri: &str, document_id: &str) -> IngestionMessage {
    let mut attributes = HashMap::new();
    attributes.insert("env".to_string(), "test".to_string());
    IngestionMessage {
        request_id: "req-1".to_string(),
        tenant_id: TenantId::from("tenant-a"),
        document_id: document_id.into(),
        filename: "brief.pdf".to_string(),
        content_type: "application/pdf".to_string(),
        blob_uri: blob_uri.to_string(),
        chunk_config: ChunkConfigOverride {
            size: Some(50),
            overlap: Some(10),
        },
        submitted_at: Utc::now(),
        attributes,
    }
}

#[tokio::test]
async fn ingest_then_ask_returns_the_ingested_chunk() {
    let blobs = tempdir().unwrap();
    let blob_path = blobs.path().join("brief.pdf");
    let (platform, blob_uri) = build_platform("Alpha Bravo Charlie Delta", &blob_path).await;

    let msg = message(&blob_uri, "doc-1");
    let disposition = platform.ingest_message(msg.clone()).await;
    assert_eq!(disposition, Disposition::Ack);

    let doc = platform
        .get_document(&msg.tenant_id, &msg.document_id)
        .await
        .unwrap();
    assert!(doc.chunk_count > 0);
    assert!(platform.namespace_size(&msg.tenant_id).await > 0);

    let response = platform.ask(&msg.tenant_id, "Bravo").await.unwrap();
    assert!(!response.results.is_empty());
    for result in &response.results {
        assert_eq!(result.document_id, msg.document_id);
    }
}

#[tokio::test]
async fn duplicate_push_delivery_converges_without_duplicating_chunks() {
    let blobs = tempdir().unwrap();
    let blob_path = blobs.path().join("brief.pdf");
    let (platform, blob_uri) = build_platform("Alpha Bravo Charlie Delta", &blob_path).await;

    let msg = message(&blob_uri, "doc-1");
    let envelope = serde_json::json!({
        "message": {
            "data": base64_encode(&serde_json::to_vec(&msg).unwrap()),
            "attributes": {}
        }
    });

    let first = platform.handle_push(&envelope).await;
    assert_eq!(first, alayasiki_sdk::PushOutcome::Acked);
    let after_first = platform
        .get_document(&msg.tenant_id, &msg.document_id)
        .await
        .unwrap();

    let second = platform.handle_push(&envelope).await;
    assert_eq!(second, alayasiki_sdk::PushOutcome::Acked);
    let after_second = platform
        .get_document(&msg.tenant_id, &msg.document_id)
        .await
        .unwrap();

    assert_eq!(after_first.chunk_count, after_second.chunk_count);
}

#[tokio::test]
async fn malformed_push_envelope_is_acked_not_retried() {
    let blobs = tempdir().unwrap();
    let blob_path = blobs.path().join("brief.pdf");
    let (platform, _blob_uri) = build_platform("irrelevant", &blob_path).await;

    let envelope = serde_json::json!({"nonsense": true});
    let outcome = platform.handle_push(&envelope).await;
    assert_eq!(outcome, alayasiki_sdk::PushOutcome::Acked);
    assert_eq!(outcome.http_status(), 200);
}

#[tokio::test]
async fn reindex_dry_run_does_not_touch_storage() {
    let blobs = tempdir().unwrap();
    let blob_path = blobs.path().join("brief.pdf");
    let (platform, blob_uri) = build_platform("Alpha Bravo Charlie Delta", &blob_path).await;

    let msg = message(&blob_uri, "doc-1");
    platform.ingest_message(msg.clone()).await;

    // Force the stored document to look stale so the drift scan re-queues it.
    let summary = platform.reindex(None, 10, true).await;
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn platform_reports_healthy_once_initialized() {
    let blobs = tempdir().unwrap();
    let blob_path = blobs.path().join("brief.pdf");
    let (platform, _blob_uri) = build_platform("irrelevant", &blob_path).await;
    assert!(platform.is_healthy());
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
