//! Asymmetric wrapping of content keys (RSA-OAEP, SHA-256).
//!
//! Wrapping is the only place a content key is encrypted under a public key.
//! Every unwrap failure is reported as the same [`CryptoError::WrapFailure`],
//! regardless of whether the bytes were the wrong size, the padding was
//! invalid, or the key simply did not match.

use crate::algorithm::KeyWrapAlgorithm;
use crate::cipher::ContentKey;
use crate::encoding::base64_vec;
use crate::error::{CryptoError, CryptoResult};
use crate::keypair::{PrivateKey, PublicKey};
use rand::rngs::OsRng;
use rsa::Oaep;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

/// A content key encrypted under one recipient's public key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    /// Scheme used to produce `bytes`; persisted for backward readability.
    pub algorithm: KeyWrapAlgorithm,
    /// Wrapped key material, exactly one RSA modulus long.
    #[serde(with = "base64_vec")]
    pub bytes: Vec<u8>,
}

/// Wraps `content_key` for the holder of `recipient`'s private key.
pub fn wrap(content_key: &ContentKey, recipient: &PublicKey) -> CryptoResult<WrappedKey> {
    let bytes = oaep_encrypt(content_key.as_bytes(), recipient)?;
    Ok(WrappedKey {
        algorithm: KeyWrapAlgorithm::RsaOaepSha256,
        bytes,
    })
}

/// Recovers a content key wrapped by [`wrap`].
pub fn unwrap(wrapped: &WrappedKey, recipient: &PrivateKey) -> CryptoResult<ContentKey> {
    let key_bytes = oaep_decrypt(wrapped, recipient)?;
    ContentKey::from_slice(&key_bytes).map_err(|_| CryptoError::WrapFailure)
}

pub(crate) fn oaep_encrypt(payload: &[u8], recipient: &PublicKey) -> CryptoResult<Vec<u8>> {
    recipient
        .as_rsa()
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), payload)
        .map_err(|e| CryptoError::Encryption(format!("RSA-OAEP wrap failed: {e}")))
}

pub(crate) fn oaep_decrypt(
    wrapped: &WrappedKey,
    recipient: &PrivateKey,
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    match wrapped.algorithm {
        KeyWrapAlgorithm::RsaOaepSha256 => {}
    }

    if wrapped.bytes.len() != recipient.modulus_len() {
        return Err(CryptoError::WrapFailure);
    }

    recipient
        .as_rsa()
        .decrypt_blinded(&mut OsRng, Oaep::new::<Sha256>(), &wrapped.bytes)
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::WrapFailure)
}
