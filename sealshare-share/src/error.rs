//! Sharing error types.

use sealshare_crypto::CryptoError;
use sealshare_pki::CaError;
use sealshare_registry::RegistryError;
use std::time::Duration;
use thiserror::Error;

/// Result type for sharing operations.
pub type ShareResult<T> = Result<T, ShareError>;

/// Errors from a [`CertificateDirectory`](crate::CertificateDirectory).
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("no certificate published for '{0}'")]
    NotFound(String),

    /// The directory (or the CA behind it) cannot be reached right now.
    #[error("certificate directory unavailable: {0}")]
    Unavailable(String),
}

impl DirectoryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DirectoryError::Unavailable(_))
    }
}

/// Errors that can occur while sealing, opening or sharing files.
#[derive(Debug, Error)]
pub enum ShareError {
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("certificate error: {0}")]
    Certificate(#[from] CaError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid share request: {0}")]
    InvalidRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ShareError {
    /// Whether the failed step may succeed if retried.
    pub fn is_transient(&self) -> bool {
        match self {
            ShareError::Registry(e) => e.is_transient(),
            ShareError::Directory(e) => e.is_transient(),
            _ => false,
        }
    }
}
