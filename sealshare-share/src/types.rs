//! Request and result types of the sharing service.

use sealshare_crypto::{AccessKind, EncryptionMetadata};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Grant `to` access to a file that `from` can already open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareRequest {
    pub file_id: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub access: AccessKind,
}

impl ShareRequest {
    pub fn new(
        file_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        access: AccessKind,
    ) -> Self {
        Self {
            file_id: file_id.into(),
            from: from.into(),
            to: to.into(),
            access,
        }
    }
}

/// An encrypted file body as handed to blob storage. The content key is not
/// here; it lives wrapped in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedFile {
    pub file_id: String,
    #[serde(with = "sealshare_crypto::encoding::base64_vec")]
    pub ciphertext: Vec<u8>,
    pub metadata: EncryptionMetadata,
}

/// Generates a new, time-ordered file identifier.
pub fn new_file_id() -> String {
    Uuid::now_v7().to_string()
}
