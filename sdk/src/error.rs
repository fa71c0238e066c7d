use alayasiki_core::error::{AlayasikiError, ErrorCode};
use thiserror::Error;

/// Errors raised while standing up a `Platform`. This is the only crate
/// allowed to flatten cross-crate errors with `anyhow`-style orchestration
/// once a `Platform` is running; `init` itself stays a typed `Result`.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("failed to open metadata store: {0}")]
    Repo(#[from] storage::RepoError),
    #[error("failed to open audit sink: {0}")]
    Audit(#[from] alayasiki_core::audit::AuditError),
    #[error("failed to prepare temp directory {0}: {1}")]
    TempDir(String, std::io::Error),
}

impl AlayasikiError for PlatformError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::Internal
    }
}
