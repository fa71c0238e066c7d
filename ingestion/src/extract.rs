use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use crate::chunker::Page;
use crate::error::{BlobError, PipelineError};

/// Blackbox object store contract: fetch a blob by its URI into a local
/// path. Implementations own the retry/backoff policy for their own
/// transport; failures are classified permanent/transient here.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn download(&self, blob_uri: &str, destination: &Path) -> Result<(), BlobError>;
}

/// A filesystem-backed `BlobStore` for `file://` URIs, used by tests and by
/// on-prem deployments that mount the object store locally.
pub struct FilesystemBlobStore;

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn download(&self, blob_uri: &str, destination: &Path) -> Result<(), BlobError> {
        let source = blob_uri
            .strip_prefix("file://")
            .ok_or_else(|| BlobError::NotFound(blob_uri.to_string()))?;
        tokio::fs::copy(source, destination).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BlobError::NotFound(blob_uri.to_string())
            } else {
                BlobError::Transient(e.to_string())
            }
        })?;
        Ok(())
    }
}

/// A scoped temporary file guaranteeing cleanup on every exit path,
/// including early returns via `?`.
pub struct ScopedTempFile {
    path: PathBuf,
}

impl ScopedTempFile {
    pub fn new(dir: &Path, document_id: &str) -> Self {
        let path = dir.join(format!("{}-{}.pdf", document_id, Uuid::new_v4()));
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedTempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Extracts page-attributed text from a downloaded document. `EmbeddingPipeline`
/// checks the file exists before calling a loader, so implementations only
/// need to handle parse failures.
pub trait DocumentLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Vec<Page>, PipelineError>;
}

/// Loads a PDF via `pdf-extract`, flattening all pages into one span since
/// the crate doesn't expose per-page boundaries — `page_number` is left
/// `None` here; loaders that preserve page boundaries would populate it.
pub struct PdfLoader;

impl DocumentLoader for PdfLoader {
    fn load(&self, path: &Path) -> Result<Vec<Page>, PipelineError> {
        let text =
            pdf_extract::extract_text(path).map_err(|e| PipelineError::ParseError(e.to_string()))?;

        if text.trim().is_empty() {
            return Err(PipelineError::EmptyDocument);
        }

        Ok(vec![Page {
            text,
            page_number: None,
        }])
    }
}

/// Load a PDF from `path` into page-attributed text, ready for
/// `RecursiveCharacterSplitter::split_pages`.
pub fn load_pdf(path: &Path) -> Result<Vec<Page>, PipelineError> {
    if !path.exists() {
        return Err(PipelineError::MissingTempFile(path.display().to_string()));
    }
    PdfLoader.load(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_missing_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nonexistent.pdf");
        let err = load_pdf(&path).unwrap_err();
        assert_eq!(err.taxonomy_code(), "missing_temp_file");
    }

    #[tokio::test]
    async fn filesystem_blob_store_rejects_missing_files() {
        let store = FilesystemBlobStore;
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.pdf");
        let err = store
            .download("file:///no/such/path.pdf", &dest)
            .await
            .unwrap_err();
        assert_eq!(err.taxonomy_code(), "blob_not_found");
    }

    #[tokio::test]
    async fn filesystem_blob_store_copies_existing_files() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("in.bin");
        tokio::fs::write(&src, b"hello").await.unwrap();
        let dest = dir.path().join("out.bin");

        let store = FilesystemBlobStore;
        store
            .download(&format!("file://{}", src.display()), &dest)
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"hello");
    }

    #[test]
    fn scoped_temp_file_is_removed_on_drop() {
        let dir = tempdir().unwrap();
        let path = {
            let guard = ScopedTempFile::new(dir.path(), "doc-1");
            std::fs::write(guard.path(), b"x").unwrap();
            assert!(guard.path().exists());
            guard.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
