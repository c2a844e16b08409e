//! RSA key pairs owned by identities.
//!
//! Public keys travel as SPKI DER (or PEM); private keys as PKCS#8. The
//! private half is only ever exported through [`PrivateKey::to_pkcs8_pem`],
//! which returns a zeroizing string.

use crate::error::{CryptoError, CryptoResult};
use rand::rngs::OsRng;
use rsa::pkcs8::{
    DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding,
};
use rsa::pkcs1v15;
use rsa::pss::{BlindedSigningKey, Signature, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroizing;

/// Default modulus size for identity key pairs.
pub const DEFAULT_KEY_BITS: usize = 3072;
/// Smallest modulus accepted anywhere in SealShare.
pub const MIN_KEY_BITS: usize = 2048;

/// RSA public key of an identity or of the certificate authority.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(RsaPublicKey);

impl PublicKey {
    /// Parses a DER-encoded SubjectPublicKeyInfo.
    pub fn from_der(der: &[u8]) -> CryptoResult<Self> {
        RsaPublicKey::from_public_key_der(der)
            .map(Self)
            .map_err(|e| CryptoError::InvalidKey(format!("public key DER: {e}")))
    }

    /// Parses a PEM-encoded SubjectPublicKeyInfo.
    pub fn from_pem(pem: &str) -> CryptoResult<Self> {
        RsaPublicKey::from_public_key_pem(pem)
            .map(Self)
            .map_err(|e| CryptoError::InvalidKey(format!("public key PEM: {e}")))
    }

    pub fn to_der(&self) -> CryptoResult<Vec<u8>> {
        self.0
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CryptoError::Encoding(format!("public key DER: {e}")))
    }

    pub fn to_pem(&self) -> CryptoResult<String> {
        self.0
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::Encoding(format!("public key PEM: {e}")))
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.0.n().bits()
    }

    /// Modulus size in bytes; also the length of every wrapped key.
    pub fn modulus_len(&self) -> usize {
        self.0.size()
    }

    /// Hex SHA-256 of the SPKI DER encoding.
    pub fn fingerprint(&self) -> CryptoResult<String> {
        let der = self.to_der()?;
        Ok(hex::encode(Sha256::digest(&der)))
    }

    /// Verifies an RSA-PSS (SHA-256) signature.
    ///
    /// Every failure, including a malformed signature, maps to the same
    /// [`CryptoError::Signature`] value.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> CryptoResult<()> {
        let verifying_key = VerifyingKey::<Sha256>::new(self.0.clone());
        let signature = Signature::try_from(signature).map_err(|_| CryptoError::Signature)?;
        verifying_key
            .verify(message, &signature)
            .map_err(|_| CryptoError::Signature)
    }

    /// Verifies an RSASSA-PKCS1-v1_5 (SHA-256) signature, the scheme most
    /// external tools use for certificate requests.
    pub fn verify_pkcs1v15(&self, message: &[u8], signature: &[u8]) -> CryptoResult<()> {
        let verifying_key = pkcs1v15::VerifyingKey::<Sha256>::new(self.0.clone());
        let signature =
            pkcs1v15::Signature::try_from(signature).map_err(|_| CryptoError::Signature)?;
        verifying_key
            .verify(message, &signature)
            .map_err(|_| CryptoError::Signature)
    }

    pub(crate) fn as_rsa(&self) -> &RsaPublicKey {
        &self.0
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("bits", &self.bits())
            .finish_non_exhaustive()
    }
}

/// RSA private key. The underlying key material is zeroized on drop.
pub struct PrivateKey(RsaPrivateKey);

impl PrivateKey {
    pub fn from_pkcs8_der(der: &[u8]) -> CryptoResult<Self> {
        RsaPrivateKey::from_pkcs8_der(der)
            .map(Self)
            .map_err(|e| CryptoError::InvalidKey(format!("private key DER: {e}")))
    }

    pub fn from_pkcs8_pem(pem: &str) -> CryptoResult<Self> {
        RsaPrivateKey::from_pkcs8_pem(pem)
            .map(Self)
            .map_err(|e| CryptoError::InvalidKey(format!("private key PEM: {e}")))
    }

    pub fn to_pkcs8_pem(&self) -> CryptoResult<Zeroizing<String>> {
        self.0
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::Encoding(format!("private key PEM: {e}")))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.to_public_key())
    }

    pub fn bits(&self) -> usize {
        self.0.n().bits()
    }

    pub fn modulus_len(&self) -> usize {
        self.0.size()
    }

    /// Signs `message` with RSA-PSS (SHA-256) using blinded signing.
    pub fn sign(&self, message: &[u8]) -> CryptoResult<Vec<u8>> {
        let signature = self
            .pss_signer()
            .try_sign_with_rng(&mut OsRng, message)
            .map_err(|e| CryptoError::Encryption(format!("RSA-PSS signing failed: {e}")))?;
        Ok(signature.to_vec())
    }

    /// RSA-PSS (SHA-256) blinded signer over this key, for building
    /// certificates and requests.
    pub fn pss_signer(&self) -> BlindedSigningKey<Sha256> {
        BlindedSigningKey::<Sha256>::new(self.0.clone())
    }

    pub(crate) fn as_rsa(&self) -> &RsaPrivateKey {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey([REDACTED])")
    }
}

/// RSA key pair owned by one identity.
pub struct KeyPair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

impl KeyPair {
    /// Rebuilds a key pair from its private half.
    pub fn from_private(private: PrivateKey) -> Self {
        let public = private.public_key();
        Self { public, private }
    }

    /// Returns the public key as DER-encoded SubjectPublicKeyInfo.
    pub fn public_der(&self) -> CryptoResult<Vec<u8>> {
        self.public.to_der()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Generates a new RSA key pair with a modulus of `bits` bits.
pub fn generate_keypair(bits: usize) -> CryptoResult<KeyPair> {
    if bits < MIN_KEY_BITS {
        return Err(CryptoError::KeyTooSmall {
            bits,
            minimum: MIN_KEY_BITS,
        });
    }

    let private = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| CryptoError::KeyGeneration(format!("RSA-{bits}: {e}")))?;
    Ok(KeyPair::from_private(PrivateKey(private)))
}
