use std::collections::HashMap;

use alayasiki_core::error::{AlayasikiError, ErrorCode};
use alayasiki_core::model::{ChunkId, Embedding, TenantId};
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::index::LinearAnnIndex;

#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl AlayasikiError for VectorStoreError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::InvalidArgument
    }
}

/// A dense hit from `dense_search`: comparable across candidates from the
/// same call but not calibrated across calls.
#[derive(Debug, Clone)]
pub struct DenseHit {
    pub chunk_id: ChunkId,
    pub score: f32,
    pub metadata: HashMap<String, String>,
}

/// Per-tenant namespaced dense index. Each tenant's `LinearAnnIndex` is
/// created lazily on first upsert — the in-process analogue of the
/// serverless index bootstrap: no-op if the namespace already exists.
pub struct VectorStore {
    namespaces: DashMap<TenantId, RwLock<LinearAnnIndex>>,
    metadata: DashMap<(TenantId, ChunkId), HashMap<String, String>>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self {
            namespaces: DashMap::new(),
            metadata: DashMap::new(),
        }
    }

    /// Idempotent by `chunk_id`: re-upserting the same id replaces its vector
    /// and metadata rather than duplicating it. Every embedding must match
    /// the namespace's established dimension (the first vector ever stored
    /// in it, or the first vector in this batch if the namespace is still
    /// empty) — a mismatch is rejected rather than silently stored, since a
    /// wrong-length vector would otherwise just drop out of every future
    /// `dense_search` via `cosine_similarity`'s length check.
    pub async fn upsert_embeddings(
        &self,
        tenant_id: &TenantId,
        embeddings: Vec<Embedding>,
    ) -> Result<(), VectorStoreError> {
        let entry = self
            .namespaces
            .entry(tenant_id.clone())
            .or_insert_with(|| RwLock::new(LinearAnnIndex::new()));
        let mut index = entry.write().await;

        let expected = index
            .dimension()
            .or_else(|| embeddings.first().map(|e| e.values.len()));
        if let Some(expected) = expected {
            for embedding in &embeddings {
                if embedding.values.len() != expected {
                    return Err(VectorStoreError::DimensionMismatch {
                        expected,
                        actual: embedding.values.len(),
                    });
                }
            }
        }

        for embedding in embeddings {
            self.metadata.insert(
                (tenant_id.clone(), embedding.chunk_id.clone()),
                embedding.metadata,
            );
            index.insert(embedding.chunk_id.0, embedding.values);
        }
        Ok(())
    }

    pub async fn delete(&self, tenant_id: &TenantId, chunk_id: &ChunkId) -> bool {
        self.metadata
            .remove(&(tenant_id.clone(), chunk_id.clone()));
        match self.namespaces.get(tenant_id) {
            Some(entry) => entry.write().await.delete(chunk_id.as_str()),
            None => false,
        }
    }

    /// Cosine-similarity top-k within `tenant_id`'s namespace. A missing
    /// namespace is not an error — it returns an empty result, matching a
    /// tenant that has never ingested anything yet.
    pub async fn dense_search(
        &self,
        tenant_id: &TenantId,
        vector: &[f32],
        top_k: usize,
    ) -> Vec<DenseHit> {
        let Some(entry) = self.namespaces.get(tenant_id) else {
            return Vec::new();
        };
        let index = entry.read().await;
        index
            .search(vector, top_k)
            .into_iter()
            .map(|(id, score)| {
                let chunk_id = ChunkId(id);
                let metadata = self
                    .metadata
                    .get(&(tenant_id.clone(), chunk_id.clone()))
                    .map(|m| m.clone())
                    .unwrap_or_default();
                DenseHit {
                    chunk_id,
                    score,
                    metadata,
                }
            })
            .collect()
    }

    pub async fn namespace_len(&self, tenant_id: &TenantId) -> usize {
        match self.namespaces.get(tenant_id) {
            Some(entry) => entry.read().await.len(),
            None => 0,
        }
    }
}

impl Default for VectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedding(chunk: &str, values: Vec<f32>) -> Embedding {
        Embedding {
            chunk_id: ChunkId::from(chunk),
            tenant_id: TenantId::from("t1"),
            values,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn upsert_then_search_returns_namespaced_hits() {
        let store = VectorStore::new();
        let tenant = TenantId::from("t1");
        store
            .upsert_embeddings(&tenant, vec![embedding("c1", vec![1.0, 0.0])])
            .await
            .unwrap();

        let hits = store.dense_search(&tenant, &[1.0, 0.0], 5).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id.as_str(), "c1");
    }

    #[tokio::test]
    async fn missing_namespace_returns_empty_not_error() {
        let store = VectorStore::new();
        let hits = store
            .dense_search(&TenantId::from("unknown"), &[1.0, 0.0], 5)
            .await;
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn tenants_are_isolated() {
        let store = VectorStore::new();
        store
            .upsert_embeddings(&TenantId::from("t1"), vec![embedding("c1", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .upsert_embeddings(&TenantId::from("t2"), vec![embedding("c2", vec![1.0, 0.0])])
            .await
            .unwrap();

        let hits = store
            .dense_search(&TenantId::from("t1"), &[1.0, 0.0], 10)
            .await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id.as_str(), "c1");
    }

    #[tokio::test]
    async fn repeated_upsert_is_idempotent_by_chunk_id() {
        let store = VectorStore::new();
        let tenant = TenantId::from("t1");
        store
            .upsert_embeddings(&tenant, vec![embedding("c1", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .upsert_embeddings(&tenant, vec![embedding("c1", vec![0.0, 1.0])])
            .await
            .unwrap();

        assert_eq!(store.namespace_len(&tenant).await, 1);
    }

    #[tokio::test]
    async fn mismatched_dimension_is_rejected_not_silently_dropped() {
        let store = VectorStore::new();
        let tenant = TenantId::from("t1");
        store
            .upsert_embeddings(&tenant, vec![embedding("c1", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();

        let err = store
            .upsert_embeddings(&tenant, vec![embedding("c2", vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert_eq!(store.namespace_len(&tenant).await, 1);
    }
}
