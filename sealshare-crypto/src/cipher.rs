//! AES-256-GCM content encryption.
//!
//! The primitives here are pure: given the same key, nonce, plaintext and
//! associated data they produce the same ciphertext and tag. Randomness is
//! only consumed by [`generate_content_key`] and [`random_nonce`].

use crate::encoding::base64_array;
use crate::error::{CryptoError, CryptoResult};
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce as GcmNonce, Tag};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Content key size in bytes (AES-256).
pub const KEY_SIZE: usize = 32;
/// GCM nonce size in bytes.
pub const NONCE_SIZE: usize = 12;
/// GCM authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Per-file symmetric key.
///
/// Deliberately neither `Clone` nor `Serialize`: a content key is owned by the
/// operation that currently needs it and is wiped when that operation ends.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ContentKey([u8; KEY_SIZE]);

impl ContentKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Builds a key from a slice, rejecting anything that is not 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut key = Self([0u8; KEY_SIZE]);
        key.0.copy_from_slice(bytes);
        Ok(key)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl PartialEq for ContentKey {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq(&self.0, &other.0)
    }
}

impl Eq for ContentKey {}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentKey([REDACTED])")
    }
}

/// 96-bit GCM nonce. Must never be reused with the same [`ContentKey`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nonce(#[serde(with = "base64_array")] [u8; NONCE_SIZE]);

impl Nonce {
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let array: [u8; NONCE_SIZE] = bytes
            .try_into()
            .map_err(|_| CryptoError::Encoding(format!("nonce must be {NONCE_SIZE} bytes, got {}", bytes.len())))?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// 128-bit GCM authentication tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthTag(#[serde(with = "base64_array")] [u8; TAG_SIZE]);

impl AuthTag {
    pub fn from_bytes(bytes: [u8; TAG_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let array: [u8; TAG_SIZE] = bytes
            .try_into()
            .map_err(|_| CryptoError::Encoding(format!("tag must be {TAG_SIZE} bytes, got {}", bytes.len())))?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; TAG_SIZE] {
        &self.0
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; TAG_SIZE] {
        &mut self.0
    }
}

/// Ciphertext of a file body plus the values needed to open it.
#[derive(Clone, Debug)]
pub struct SealedContent {
    pub ciphertext: Vec<u8>,
    pub nonce: Nonce,
    pub tag: AuthTag,
}

/// Generates a fresh 256-bit content key from the OS CSPRNG.
pub fn generate_content_key() -> ContentKey {
    let mut key = ContentKey([0u8; KEY_SIZE]);
    OsRng.fill_bytes(&mut key.0);
    key
}

/// Generates a random 96-bit nonce from the OS CSPRNG.
pub fn random_nonce() -> Nonce {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    Nonce(nonce)
}

/// Encrypts `plaintext` with AES-256-GCM, returning the ciphertext and the
/// detached tag. The tag also authenticates `associated_data`.
pub fn encrypt(
    plaintext: &[u8],
    key: &ContentKey,
    nonce: &Nonce,
    associated_data: Option<&[u8]>,
) -> CryptoResult<(Vec<u8>, AuthTag)> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let mut buffer = plaintext.to_vec();

    let tag = cipher
        .encrypt_in_place_detached(
            GcmNonce::from_slice(nonce.as_bytes()),
            associated_data.unwrap_or_default(),
            &mut buffer,
        )
        .map_err(|e| CryptoError::Encryption(format!("AES-256-GCM: {e}")))?;

    let mut tag_bytes = [0u8; TAG_SIZE];
    tag_bytes.copy_from_slice(tag.as_slice());
    Ok((buffer, AuthTag(tag_bytes)))
}

/// Decrypts and authenticates `ciphertext`.
///
/// The tag is checked before any plaintext is released. On mismatch the
/// working buffer is wiped and only [`CryptoError::AuthenticationFailure`]
/// is returned.
pub fn decrypt(
    ciphertext: &[u8],
    key: &ContentKey,
    nonce: &Nonce,
    tag: &AuthTag,
    associated_data: Option<&[u8]>,
) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let mut buffer = ciphertext.to_vec();

    let result = cipher.decrypt_in_place_detached(
        GcmNonce::from_slice(nonce.as_bytes()),
        associated_data.unwrap_or_default(),
        &mut buffer,
        Tag::from_slice(tag.as_bytes()),
    );

    match result {
        Ok(()) => Ok(buffer),
        Err(_) => {
            buffer.zeroize();
            Err(CryptoError::AuthenticationFailure)
        }
    }
}

/// Encrypts a whole file body under a brand-new key and nonce.
///
/// The returned key has encrypted exactly one message, so nonce reuse under
/// it is impossible by construction.
pub fn seal_content(
    plaintext: &[u8],
    associated_data: Option<&[u8]>,
) -> CryptoResult<(ContentKey, SealedContent)> {
    let key = generate_content_key();
    let nonce = random_nonce();
    let (ciphertext, tag) = encrypt(plaintext, &key, &nonce, associated_data)?;
    Ok((
        key,
        SealedContent {
            ciphertext,
            nonce,
            tag,
        },
    ))
}

/// Opens a body produced by [`seal_content`].
pub fn open_content(
    sealed: &SealedContent,
    key: &ContentKey,
    associated_data: Option<&[u8]>,
) -> CryptoResult<Vec<u8>> {
    decrypt(
        &sealed.ciphertext,
        key,
        &sealed.nonce,
        &sealed.tag,
        associated_data,
    )
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
