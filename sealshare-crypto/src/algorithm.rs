//! Persisted algorithm identifiers.
//!
//! The identifiers are stored next to every ciphertext, wrapped key and
//! certificate so that records written under today's defaults stay readable
//! if the defaults change. Unknown identifiers are rejected with
//! [`CryptoError::UnsupportedAlgorithm`] instead of being guessed.

use crate::error::{CryptoError, CryptoResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Symmetric cipher used for file bodies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ContentCipher {
    #[default]
    Aes256Gcm,
}

impl ContentCipher {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCipher::Aes256Gcm => "AES-256-GCM",
        }
    }
}

/// Asymmetric scheme used to wrap content keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum KeyWrapAlgorithm {
    /// RSA-OAEP with SHA-256 for both the label hash and MGF1.
    #[default]
    RsaOaepSha256,
}

impl KeyWrapAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyWrapAlgorithm::RsaOaepSha256 => "RSA-OAEP-256",
        }
    }
}

/// Signature scheme used for certificates and signing requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SignatureAlgorithm {
    #[default]
    RsaPssSha256,
}

impl SignatureAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureAlgorithm::RsaPssSha256 => "RSA-PSS-SHA256",
        }
    }
}

impl FromStr for ContentCipher {
    type Err = CryptoError;

    fn from_str(s: &str) -> CryptoResult<Self> {
        match s {
            "AES-256-GCM" => Ok(ContentCipher::Aes256Gcm),
            other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl FromStr for KeyWrapAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> CryptoResult<Self> {
        match s {
            "RSA-OAEP-256" => Ok(KeyWrapAlgorithm::RsaOaepSha256),
            other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> CryptoResult<Self> {
        match s {
            "RSA-PSS-SHA256" => Ok(SignatureAlgorithm::RsaPssSha256),
            other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for ContentCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for KeyWrapAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for ContentCipher {
    type Error = CryptoError;

    fn try_from(value: String) -> CryptoResult<Self> {
        value.parse()
    }
}

impl TryFrom<String> for KeyWrapAlgorithm {
    type Error = CryptoError;

    fn try_from(value: String) -> CryptoResult<Self> {
        value.parse()
    }
}

impl TryFrom<String> for SignatureAlgorithm {
    type Error = CryptoError;

    fn try_from(value: String) -> CryptoResult<Self> {
        value.parse()
    }
}

impl From<ContentCipher> for String {
    fn from(value: ContentCipher) -> Self {
        value.as_str().to_string()
    }
}

impl From<KeyWrapAlgorithm> for String {
    fn from(value: KeyWrapAlgorithm) -> Self {
        value.as_str().to_string()
    }
}

impl From<SignatureAlgorithm> for String {
    fn from(value: SignatureAlgorithm) -> Self {
        value.as_str().to_string()
    }
}
