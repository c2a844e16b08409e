//! Registry error types.

use thiserror::Error;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur in key registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No wrapped key for this identity. Treated as access denied.
    #[error("no key for '{identity}' on file '{file_id}'")]
    KeyNotFound { file_id: String, identity: String },

    /// A wrapped key was written for a file with no registered metadata.
    #[error("no encryption metadata registered for file '{0}'")]
    MetadataMissing(String),

    #[error("file '{0}' is already registered")]
    FileExists(String),

    #[error("registry is closed")]
    Closed,

    /// Backend temporarily unreachable; safe to retry.
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error("registry storage error: {0}")]
    Storage(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RegistryError {
    /// Whether the operation may succeed if retried unchanged.
    pub fn is_transient(&self) -> bool {
        match self {
            RegistryError::Unavailable(_) => true,
            RegistryError::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}
