use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use alayasiki_core::model::ChunkId;
use uuid::Uuid;

use crate::chunker::RecursiveCharacterSplitter;
use crate::embedding::EmbeddingProvider;
use crate::error::PipelineError;
use crate::extract::DocumentLoader;
use crate::message::ChunkConfigOverride;
use crate::policy::ContentPolicy;

/// A single pipeline output: a fresh `chunk_id`, its (policy-filtered) text,
/// its embedding vector, merged metadata, and position within the document.
#[derive(Debug, Clone)]
pub struct PipelineChunk {
    pub chunk_id: ChunkId,
    pub chunk_index: u32,
    pub content: String,
    pub vector: Vec<f32>,
    pub page_number: Option<u32>,
    pub metadata: HashMap<String, String>,
}

pub struct PipelineConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl PipelineConfig {
    /// Apply a message-level override of the configured chunk size/overlap
    /// defaults, falling back to each default when the override omits it.
    pub fn with_override(defaults: &alayasiki_core::config::ProcessingConfig, over: &ChunkConfigOverride) -> Self {
        Self {
            chunk_size: over.size.unwrap_or(defaults.chunk_size),
            chunk_overlap: over.overlap.unwrap_or(defaults.chunk_overlap),
        }
    }
}

/// Produces a deterministic list of `(chunk_id, text, vector, metadata)`
/// from a document file: load → split → policy-filter → embed.
pub struct EmbeddingPipeline {
    loader: Arc<dyn DocumentLoader>,
    provider: Arc<dyn EmbeddingProvider>,
    policy: Arc<dyn ContentPolicy>,
}

impl EmbeddingPipeline {
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        provider: Arc<dyn EmbeddingProvider>,
        policy: Arc<dyn ContentPolicy>,
    ) -> Self {
        Self {
            loader,
            provider,
            policy,
        }
    }

    /// `caller_context` is merged into each chunk's metadata in order: loader
    /// metadata, then caller context, then `{chunk_index, source_path}` —
    /// later entries win on key collision.
    pub async fn process(
        &self,
        path: &Path,
        source_path: &str,
        caller_context: &HashMap<String, String>,
        config: &PipelineConfig,
    ) -> Result<Vec<PipelineChunk>, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::MissingTempFile(path.display().to_string()));
        }
        let pages = self.loader.load(path)?;

        let splitter = RecursiveCharacterSplitter::new(config.chunk_size, config.chunk_overlap);
        let text_chunks = splitter.split_pages(&pages);

        if text_chunks.is_empty() {
            return Err(PipelineError::EmptyDocument);
        }

        let mut filtered_texts = Vec::with_capacity(text_chunks.len());
        for chunk in &text_chunks {
            let filtered = self
                .policy
                .apply(&chunk.content)
                .map_err(|e| PipelineError::ParseError(e.to_string()))?;
            filtered_texts.push(filtered);
        }

        let vectors = self.provider.embed_documents(&filtered_texts).await?;

        let mut out = Vec::with_capacity(text_chunks.len());
        for (index, ((text_chunk, text), vector)) in
            text_chunks.into_iter().zip(filtered_texts).zip(vectors).enumerate()
        {
            let mut metadata = HashMap::new();
            metadata.extend(caller_context.clone());
            metadata.insert("chunk_index".to_string(), index.to_string());
            metadata.insert("source_path".to_string(), source_path.to_string());

            out.push(PipelineChunk {
                chunk_id: ChunkId(Uuid::new_v4().to_string()),
                chunk_index: index as u32,
                content: text,
                vector,
                page_number: text_chunk.page_number,
                metadata,
            });
        }

        Ok(out)
    }
}
