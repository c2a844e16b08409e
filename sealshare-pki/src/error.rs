//! Certificate authority error types.

use sealshare_crypto::CryptoError;
use thiserror::Error;

/// Result type for certificate authority operations.
pub type CaResult<T> = Result<T, CaError>;

/// Errors that can occur while issuing or verifying certificates.
#[derive(Debug, Error)]
pub enum CaError {
    /// Persisted root key or certificate exists but cannot be used. Terminal:
    /// regenerating would orphan every certificate already issued.
    #[error("CA root material is corrupt: {0}")]
    CorruptRootMaterial(String),

    #[error("certificate request rejected: {0}")]
    CertificateRejected(String),

    /// Verification failure; deliberately carries no reason.
    #[error("certificate expired or invalid")]
    CertificateExpiredOrInvalid,

    #[error("malformed encoding: {0}")]
    Malformed(String),

    /// A validity window that cannot be represented in a certificate.
    #[error("certificate validity out of range: {0}")]
    ValidityOutOfRange(String),

    #[error("invalid CA configuration: {0}")]
    Config(String),

    #[error("CA storage error: {0}")]
    Storage(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<der::Error> for CaError {
    fn from(e: der::Error) -> Self {
        CaError::Malformed(e.to_string())
    }
}
