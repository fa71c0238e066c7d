use std::collections::HashMap;

use alayasiki_core::model::{DocumentId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MessageError;

/// Chunk/overlap override carried on an ingestion message. Falls back
/// to `ProcessingConfig` defaults when absent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct ChunkConfigOverride {
    pub size: Option<usize>,
    pub overlap: Option<usize>,
}

/// Wire shape of the ingestion message body, before required-field
/// validation and broker attribute merging.
#[derive(Debug, Clone, Deserialize)]
struct RawIngestionMessage {
    #[allow(dead_code)]
    version: Option<String>,
    request_id: Option<String>,
    tenant_id: Option<String>,
    document_id: Option<String>,
    filename: Option<String>,
    content_type: Option<String>,
    blob_uri: Option<String>,
    #[serde(default)]
    chunk_config: ChunkConfigOverride,
    submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    attributes: HashMap<String, String>,
}

/// A validated ingestion message ready for `IngestionWorker::process_message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionMessage {
    pub request_id: String,
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub filename: String,
    pub content_type: String,
    pub blob_uri: String,
    pub chunk_config: ChunkConfigOverride,
    pub submitted_at: DateTime<Utc>,
    pub attributes: HashMap<String, String>,
}

const SUPPORTED_BLOB_SCHEMES: &[&str] = &["gs://", "s3://", "file://"];

impl IngestionMessage {
    /// Parse and validate a message body, then merge broker attributes over
    /// it (attribute-level keys win on collision).
    pub fn parse(body: &[u8], broker_attributes: HashMap<String, String>) -> Result<Self, MessageError> {
        let raw: RawIngestionMessage = serde_json::from_slice(body)
            .map_err(|e| MessageError::MalformedPayload(e.to_string()))?;
        Self::from_raw(raw, broker_attributes)
    }

    fn from_raw(
        raw: RawIngestionMessage,
        broker_attributes: HashMap<String, String>,
    ) -> Result<Self, MessageError> {
        let request_id = raw.request_id.ok_or(MessageError::MissingField("request_id"))?;
        let tenant_id = raw.tenant_id.ok_or(MessageError::MissingField("tenant_id"))?;
        let document_id = raw
            .document_id
            .ok_or(MessageError::MissingField("document_id"))?;
        let filename = raw.filename.ok_or(MessageError::MissingField("filename"))?;
        let content_type = raw
            .content_type
            .ok_or(MessageError::MissingField("content_type"))?;
        let blob_uri = raw.blob_uri.ok_or(MessageError::MissingField("blob_uri"))?;
        let submitted_at = raw
            .submitted_at
            .ok_or(MessageError::MissingField("submitted_at"))?;

        if content_type != "application/pdf" {
            return Err(MessageError::UnsupportedContentType(content_type));
        }
        if !SUPPORTED_BLOB_SCHEMES.iter().any(|s| blob_uri.starts_with(s)) {
            return Err(MessageError::InvalidBlobUriScheme(blob_uri));
        }

        let mut attributes = raw.attributes;
        for (k, v) in broker_attributes {
            attributes.insert(k, v);
        }

        Ok(Self {
            request_id,
            tenant_id: TenantId::from(tenant_id),
            document_id: DocumentId::from(document_id),
            filename,
            content_type,
            blob_uri,
            chunk_config: raw.chunk_config,
            submitted_at,
            attributes,
        })
    }

    /// Parse the `POST /pubsub/push` envelope: `{"message": {"data": base64,
    /// "attributes": {...}}}`.
    pub fn parse_push(envelope: &serde_json::Value) -> Result<Self, MessageError> {
        use base64::Engine;

        let message = envelope
            .get("message")
            .ok_or_else(|| MessageError::MalformedPayload("missing `message`".to_string()))?;
        let data_b64 = message
            .get("data")
            .and_then(|v| v.as_str())
            .ok_or_else(|| MessageError::MalformedPayload("missing `message.data`".to_string()))?;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(data_b64)
            .map_err(|e| MessageError::MalformedPayload(e.to_string()))?;

        let broker_attributes: HashMap<String, String> = message
            .get("attributes")
            .and_then(|v| v.as_object())
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Self::parse(&decoded, broker_attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_body() -> serde_json::Value {
        serde_json::json!({
            "version": "2024-09-24",
            "request_id": "req-1",
            "tenant_id": "t1",
            "document_id": "doc-1",
            "filename": "a.pdf",
            "content_type": "application/pdf",
            "blob_uri": "gs://bucket/a.pdf",
            "chunk_config": {"size": 500, "overlap": 50},
            "submitted_at": "2024-01-01T00:00:00Z",
            "attributes": {"env": "prod"}
        })
    }

    #[test]
    fn parses_a_well_formed_message() {
        let body = serde_json::to_vec(&valid_body()).unwrap();
        let msg = IngestionMessage::parse(&body, HashMap::new()).unwrap();
        assert_eq!(msg.tenant_id.as_str(), "t1");
        assert_eq!(msg.chunk_config.size, Some(500));
    }

    #[test]
    fn missing_required_field_is_permanent() {
        let mut body = valid_body();
        body.as_object_mut().unwrap().remove("tenant_id");
        let bytes = serde_json::to_vec(&body).unwrap();
        let err = IngestionMessage::parse(&bytes, HashMap::new()).unwrap_err();
        assert_eq!(err.taxonomy_code(), "validation_error");
    }

    #[test]
    fn non_pdf_content_type_is_unsupported() {
        let mut body = valid_body();
        body["content_type"] = serde_json::json!("text/plain");
        let bytes = serde_json::to_vec(&body).unwrap();
        let err = IngestionMessage::parse(&bytes, HashMap::new()).unwrap_err();
        assert_eq!(err.taxonomy_code(), "unsupported_document_type");
    }

    #[test]
    fn invalid_blob_scheme_is_rejected() {
        let mut body = valid_body();
        body["blob_uri"] = serde_json::json!("ftp://bucket/a.pdf");
        let bytes = serde_json::to_vec(&body).unwrap();
        let err = IngestionMessage::parse(&bytes, HashMap::new()).unwrap_err();
        assert!(matches!(err, MessageError::InvalidBlobUriScheme(_)));
    }

    #[test]
    fn broker_attributes_win_over_body_attributes() {
        let body = valid_body();
        let bytes = serde_json::to_vec(&body).unwrap();
        let mut broker = HashMap::new();
        broker.insert("env".to_string(), "staging".to_string());
        let msg = IngestionMessage::parse(&bytes, broker).unwrap();
        assert_eq!(msg.attributes.get("env").unwrap(), "staging");
    }
}
