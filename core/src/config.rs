use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub data_dir: String,
    pub wal_flush_interval_ms: u64,
}

/// Chunk/embedding knobs for `EmbeddingPipeline`. Defaults match
/// `RecursiveCharacterSplitter`.
#[derive(Debug, Deserialize, Clone)]
pub struct ProcessingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            embedding_model: default_embedding_model(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_embedding_model() -> String {
    "embedding-default-v1".to_string()
}

/// Retrieval knobs for `RetrievalEngine`.
#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_dense_top_n")]
    pub dense_top_n: usize,
    #[serde(default = "default_bm25_top_m")]
    pub bm25_top_m: usize,
    #[serde(default = "default_rerank_top_k")]
    pub rerank_top_k: usize,
    #[serde(default = "default_reranker_timeout_seconds")]
    pub reranker_timeout_seconds: u64,
    #[serde(default = "default_fts_config")]
    pub fts_config: String,
    #[serde(default = "default_chunk_schema_version")]
    pub chunk_schema_version: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            dense_top_n: default_dense_top_n(),
            bm25_top_m: default_bm25_top_m(),
            rerank_top_k: default_rerank_top_k(),
            reranker_timeout_seconds: default_reranker_timeout_seconds(),
            fts_config: default_fts_config(),
            chunk_schema_version: default_chunk_schema_version(),
        }
    }
}

fn default_dense_top_n() -> usize {
    20
}
fn default_bm25_top_m() -> usize {
    20
}
fn default_rerank_top_k() -> usize {
    8
}
fn default_reranker_timeout_seconds() -> u64 {
    10
}
fn default_fts_config() -> String {
    "english".to_string()
}
fn default_chunk_schema_version() -> String {
    "2024-09-24".to_string()
}

/// Reindex/backfill knobs for `ReindexRunner`.
#[derive(Debug, Deserialize, Clone)]
pub struct ReindexConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_documents")]
    pub max_documents: usize,
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: i64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_queue_poll_limit")]
    pub queue_poll_limit: usize,
    #[serde(default = "default_soft_timeout_seconds")]
    pub soft_timeout_seconds: u64,
}

impl Default for ReindexConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_documents: default_max_documents(),
            stale_after_days: default_stale_after_days(),
            max_attempts: default_max_attempts(),
            queue_poll_limit: default_queue_poll_limit(),
            soft_timeout_seconds: default_soft_timeout_seconds(),
        }
    }
}

fn default_batch_size() -> usize {
    50
}
fn default_max_documents() -> usize {
    100
}
fn default_stale_after_days() -> i64 {
    30
}
fn default_max_attempts() -> u32 {
    3
}
fn default_queue_poll_limit() -> usize {
    100
}
fn default_soft_timeout_seconds() -> u64 {
    300
}

/// Guardrail knobs applied by the content policy during ingestion.
#[derive(Debug, Deserialize, Clone)]
pub struct GuardrailsConfig {
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default)]
    pub banned_phrases: Vec<String>,
    #[serde(default = "default_mask_pii")]
    pub mask_pii: bool,
}

impl Default for GuardrailsConfig {
    fn default() -> Self {
        Self {
            max_input_chars: default_max_input_chars(),
            banned_phrases: Vec::new(),
            mask_pii: default_mask_pii(),
        }
    }
}

fn default_max_input_chars() -> usize {
    6000
}

fn default_mask_pii() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub reindex: ReindexConfig,
    #[serde(default)]
    pub guardrails: GuardrailsConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(Environment::with_prefix("ALAYASIKI").separator("__"));

        builder.build()?.try_deserialize()
    }
}
