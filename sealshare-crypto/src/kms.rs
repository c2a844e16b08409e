//! Trusted-KMS wrapping profile.
//!
//! In this profile a service holds its own RSA key pair and wraps symmetric
//! keys that clients hand to it in the clear (base64). The service therefore
//! sees raw key material, which makes this a strictly weaker trust model than
//! per-identity key pairs where private keys never leave the client. It
//! exists for demo and trusted deployments only; records produced here must
//! not be mixed with per-identity records without the caller knowing which
//! profile produced them.

use crate::error::{CryptoError, CryptoResult};
use crate::keypair::{generate_keypair, KeyPair, PublicKey};
use crate::wrap::{oaep_decrypt, oaep_encrypt, WrappedKey};
use crate::KeyWrapAlgorithm;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

/// Which party is trusted with unwrapped key material.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustProfile {
    /// Keys are wrapped client-side for each identity's own key pair.
    PerIdentityKeyPair,
    /// A service receives raw keys and wraps them under its own key pair.
    TrustedKms,
}

/// Accepted raw key sizes: AES-128, AES-192, AES-256.
const ACCEPTED_KEY_LENGTHS: [usize; 3] = [16, 24, 32];

/// Key-wrapping service that owns its key pair.
pub struct TrustedKms {
    keypair: KeyPair,
}

impl TrustedKms {
    pub fn new(keypair: KeyPair) -> Self {
        Self { keypair }
    }

    /// Creates a KMS with a freshly generated key pair.
    pub fn generate(bits: usize) -> CryptoResult<Self> {
        Ok(Self::new(generate_keypair(bits)?))
    }

    pub fn profile(&self) -> TrustProfile {
        TrustProfile::TrustedKms
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.keypair.public
    }

    /// Wraps a base64-encoded symmetric key under the service key.
    pub fn wrap_base64(&self, key_b64: &str) -> CryptoResult<WrappedKey> {
        let raw = Zeroizing::new(
            STANDARD
                .decode(key_b64.trim())
                .map_err(|e| CryptoError::Encoding(format!("symmetric key base64: {e}")))?,
        );

        if !ACCEPTED_KEY_LENGTHS.contains(&raw.len()) {
            return Err(CryptoError::UnsupportedKeyLength {
                accepted: &ACCEPTED_KEY_LENGTHS,
                actual: raw.len(),
            });
        }

        let bytes = oaep_encrypt(&raw, &self.keypair.public)?;
        debug!("kms wrapped a {}-byte key", raw.len());
        Ok(WrappedKey {
            algorithm: KeyWrapAlgorithm::RsaOaepSha256,
            bytes,
        })
    }

    /// Unwraps a key produced by [`TrustedKms::wrap_base64`], returning it
    /// base64-encoded.
    pub fn unwrap_to_base64(&self, wrapped: &WrappedKey) -> CryptoResult<Zeroizing<String>> {
        let raw = oaep_decrypt(wrapped, &self.keypair.private)?;
        if !ACCEPTED_KEY_LENGTHS.contains(&raw.len()) {
            return Err(CryptoError::WrapFailure);
        }
        Ok(Zeroizing::new(STANDARD.encode(raw.as_slice())))
    }
}
