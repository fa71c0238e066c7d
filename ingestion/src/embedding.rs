use async_trait::async_trait;

use crate::error::PipelineError;

/// Fixed output dimension for the deterministic embedding stand-in. A real
/// provider pins its own dimension; this keeps `dense_search` comparisons
/// well-formed across a tenant's namespace.
pub const EMBEDDING_DIMS: usize = 256;

/// Provider-agnostic embedding contract: a single batched call for
/// document chunks, a separate single-vector call for queries.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError>;
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, PipelineError>;

    /// Model identifier stamped onto chunks/documents for drift detection.
    fn model_id(&self) -> &str;
}

/// Deterministic SHA-256 based embedding, standing in for a real provider
/// (OpenAI/Vertex) while remaining reproducible for identical inputs, per
/// `alayasiki_core::embedding::deterministic_embedding`.
pub struct DeterministicEmbeddingProvider {
    model_id: String,
    dims: usize,
}

impl DeterministicEmbeddingProvider {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            dims: EMBEDDING_DIMS,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for DeterministicEmbeddingProvider {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        if self.model_id.trim().is_empty() {
            return Err(PipelineError::EmbeddingConfiguration(
                "embedding_model is not configured".to_string(),
            ));
        }
        // A real provider batches these into one HTTP call; here the
        // "batch" is simply computing every vector before returning.
        Ok(texts
            .iter()
            .map(|t| alayasiki_core::embedding::deterministic_embedding(t, &self.model_id, self.dims))
            .collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        if self.model_id.trim().is_empty() {
            return Err(PipelineError::EmbeddingConfiguration(
                "embedding_model is not configured".to_string(),
            ));
        }
        Ok(alayasiki_core::embedding::deterministic_embedding(
            text,
            &self.model_id,
            self.dims,
        ))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embeds_a_batch_of_documents() {
        let provider = DeterministicEmbeddingProvider::new("embedding-default-v1");
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let vectors = provider.embed_documents(&texts).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].len(), EMBEDDING_DIMS);
        assert_ne!(vectors[0], vectors[1]);
    }

    #[tokio::test]
    async fn query_and_document_embeddings_of_same_text_match() {
        let provider = DeterministicEmbeddingProvider::new("embedding-default-v1");
        let doc_vec = provider
            .embed_documents(&["hello world".to_string()])
            .await
            .unwrap();
        let query_vec = provider.embed_query("hello world").await.unwrap();
        assert_eq!(doc_vec[0], query_vec);
    }

    #[tokio::test]
    async fn blank_model_id_is_a_configuration_error() {
        let provider = DeterministicEmbeddingProvider::new("  ");
        let err = provider.embed_query("hi").await.unwrap_err();
        assert_eq!(err.taxonomy_code(), "embedding_configuration_error");
    }
}
