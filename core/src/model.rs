use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(TenantId);
string_id!(DocumentId);
string_id!(ChunkId);

/// A tenant-scoped uploaded artifact. Mutated by the ingestion worker and the
/// reindex runner; never deleted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: DocumentId,
    pub tenant_id: TenantId,
    pub filename: String,
    pub blob_uri: String,
    pub status: DocumentStatus,
    pub chunk_count: u32,
    pub last_error: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub last_schema_version: Option<String>,
    pub last_embedding_model: Option<String>,
    pub reindex_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// A patch applied to a `Document` row. `None` fields are left untouched —
/// the in-memory analogue of `COALESCE(new, existing)` per-column upserts.
#[derive(Debug, Clone, Default)]
pub struct DocumentPatch {
    pub filename: Option<String>,
    pub blob_uri: Option<String>,
    pub status: Option<DocumentStatus>,
    pub chunk_count: Option<u32>,
    pub last_error: Option<Option<String>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub last_schema_version: Option<String>,
    pub last_embedding_model: Option<String>,
}

/// A content-addressed segment of a document's text, small enough to embed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub tenant_id: TenantId,
    pub chunk_index: u32,
    pub content: String,
    pub content_hash: String,
    pub schema_version: String,
    pub embedding_model: String,
    pub source_uri: String,
    pub page_number: Option<u32>,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A dense vector for a chunk, namespaced by tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub chunk_id: ChunkId,
    pub tenant_id: TenantId,
    pub values: Vec<f32>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReindexReason {
    Drift,
    Manual,
    SchemaBump,
}

impl fmt::Display for ReindexReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReindexReason::Drift => "drift",
            ReindexReason::Manual => "manual",
            ReindexReason::SchemaBump => "schema_bump",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReindexStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// A queued reprocessing request. Natural key `(tenant_id, document_id,
/// reason)` is unique; re-enqueueing coalesces rather than duplicating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReindexJob {
    pub queue_id: u64,
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub reason: ReindexReason,
    pub priority: i32,
    pub status: ReindexStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
