//! Crypto error types.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in the encryption layer.
///
/// `AuthenticationFailure`, `WrapFailure` and `Signature` carry no detail on
/// purpose: callers must not be able to tell a wrong key from tampered bytes.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("authentication failed (wrong key, nonce, or tampered data)")]
    AuthenticationFailure,

    #[error("key unwrap failed")]
    WrapFailure,

    #[error("signature verification failed")]
    Signature,

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("unsupported key length: {actual} bytes (accepted: {accepted:?})")]
    UnsupportedKeyLength {
        accepted: &'static [usize],
        actual: usize,
    },

    #[error("key too small: {bits} bits (minimum {minimum})")]
    KeyTooSmall { bits: usize, minimum: usize },

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("encoding error: {0}")]
    Encoding(String),
}
