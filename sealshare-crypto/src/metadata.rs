//! Persisted records that travel alongside (never inside) ciphertext blobs.

use crate::algorithm::{ContentCipher, KeyWrapAlgorithm};
use crate::cipher::{AuthTag, Nonce, SealedContent};
use crate::wrap::WrappedKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the AEAD tag was bound to besides the ciphertext.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociatedData {
    /// No associated data (records written before file-id binding).
    #[default]
    None,
    /// The UTF-8 file identifier.
    FileId,
}

impl AssociatedData {
    /// Returns the associated-data bytes for `file_id` under this binding.
    pub fn bytes<'a>(&self, file_id: &'a str) -> Option<&'a [u8]> {
        match self {
            AssociatedData::None => None,
            AssociatedData::FileId => Some(file_id.as_bytes()),
        }
    }
}

/// Encryption parameters of one file body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionMetadata {
    #[serde(rename = "algorithm")]
    pub content_cipher: ContentCipher,
    #[serde(rename = "keyEncryption")]
    pub key_encryption: KeyWrapAlgorithm,
    pub nonce: Nonce,
    pub tag: AuthTag,
    #[serde(default)]
    pub associated_data: AssociatedData,
}

impl EncryptionMetadata {
    /// Captures the parameters of a freshly sealed body.
    pub fn for_sealed(sealed: &SealedContent, associated_data: AssociatedData) -> Self {
        Self {
            content_cipher: ContentCipher::Aes256Gcm,
            key_encryption: KeyWrapAlgorithm::RsaOaepSha256,
            nonce: sealed.nonce,
            tag: sealed.tag,
            associated_data,
        }
    }

    /// Reattaches the metadata to its ciphertext for decryption.
    pub fn attach(&self, ciphertext: Vec<u8>) -> SealedContent {
        SealedContent {
            ciphertext,
            nonce: self.nonce,
            tag: self.tag,
        }
    }
}

/// Access kind granted together with a wrapped key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    #[default]
    Read,
    Write,
}

impl AccessKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessKind::Read => "read",
            AccessKind::Write => "write",
        }
    }
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file's content key wrapped for one identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKeyRecord {
    pub file_id: String,
    pub identity: String,
    pub wrapped_key: WrappedKey,
    #[serde(default)]
    pub access: AccessKind,
    pub created_at: DateTime<Utc>,
}

impl WrappedKeyRecord {
    pub fn new(
        file_id: impl Into<String>,
        identity: impl Into<String>,
        wrapped_key: WrappedKey,
        access: AccessKind,
    ) -> Self {
        Self {
            file_id: file_id.into(),
            identity: identity.into(),
            wrapped_key,
            access,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::seal_content;

    #[test]
    fn metadata_serializes_wire_names() {
        let (_key, sealed) = seal_content(b"payload", Some(b"file-1")).unwrap();
        let meta = EncryptionMetadata::for_sealed(&sealed, AssociatedData::FileId);

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["algorithm"], "AES-256-GCM");
        assert_eq!(json["keyEncryption"], "RSA-OAEP-256");
        assert_eq!(json["associated_data"], "file_id");
        assert_eq!(json["nonce"].as_str().unwrap().len(), 16);
        assert_eq!(json["tag"].as_str().unwrap().len(), 24);

        let parsed: EncryptionMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn legacy_metadata_without_binding_defaults_to_none() {
        let json = r#"{
            "algorithm": "AES-256-GCM",
            "keyEncryption": "RSA-OAEP-256",
            "nonce": "AAAAAAAAAAAAAAAA",
            "tag": "AAAAAAAAAAAAAAAAAAAAAA=="
        }"#;
        let meta: EncryptionMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.associated_data, AssociatedData::None);
        assert_eq!(meta.associated_data.bytes("f"), None);
    }

    #[test]
    fn attach_restores_sealed_content() {
        let (_key, sealed) = seal_content(b"payload", None).unwrap();
        let meta = EncryptionMetadata::for_sealed(&sealed, AssociatedData::None);
        let reattached = meta.attach(sealed.ciphertext.clone());
        assert_eq!(reattached.nonce, sealed.nonce);
        assert_eq!(reattached.tag, sealed.tag);
        assert_eq!(reattached.ciphertext, sealed.ciphertext);
    }
}
