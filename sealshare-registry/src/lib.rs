//! Key registry for SealShare.
//!
//! Stores, per file, the encryption metadata of the file body and one
//! wrapped content key per authorized identity. The registry never sees a
//! content key or a plaintext; everything it holds is safe to persist.
//!
//! Two backends implement [`KeyRegistry`]:
//! - [`MemoryKeyRegistry`]: sharded concurrent maps, for tests and
//!   single-process deployments
//! - [`SqliteKeyRegistry`]: a SQLite database in WAL mode

mod error;
pub mod memory;
pub mod sqlite;

pub use error::{RegistryError, RegistryResult};
pub use memory::MemoryKeyRegistry;
pub use sqlite::SqliteKeyRegistry;

use async_trait::async_trait;
use sealshare_crypto::{EncryptionMetadata, WrappedKeyRecord};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Everything the registry holds for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileKeys {
    pub metadata: EncryptionMetadata,
    /// One record per identity, ordered by identity.
    pub records: Vec<WrappedKeyRecord>,
}

/// Storage for wrapped content keys.
///
/// Records are keyed by `(file_id, identity)`. Every method fails with
/// [`RegistryError::Closed`] once [`close`](KeyRegistry::close) has run.
#[async_trait]
pub trait KeyRegistry: Send + Sync {
    /// Writes the file's metadata and its first (owner) record together.
    /// Fails with [`RegistryError::FileExists`] if the file is registered.
    async fn register_file(
        &self,
        file_id: &str,
        metadata: &EncryptionMetadata,
        owner_record: &WrappedKeyRecord,
    ) -> RegistryResult<()>;

    /// Inserts or replaces the record for `(record.file_id, record.identity)`.
    async fn put(&self, record: &WrappedKeyRecord) -> RegistryResult<()>;

    async fn get(&self, file_id: &str, identity: &str) -> RegistryResult<WrappedKeyRecord>;

    /// Removes one identity's record. Returns whether a record existed.
    async fn delete(&self, file_id: &str, identity: &str) -> RegistryResult<bool>;

    /// Removes the file's metadata and all of its records. Returns the
    /// number of records removed.
    async fn delete_file(&self, file_id: &str) -> RegistryResult<usize>;

    async fn get_metadata(&self, file_id: &str) -> RegistryResult<EncryptionMetadata>;

    async fn list(&self, file_id: &str) -> RegistryResult<FileKeys>;

    /// Releases the backend. Idempotent.
    async fn close(&self) -> RegistryResult<()>;
}

/// Registry backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// SQLite database path. `None` selects the in-memory backend.
    pub path: Option<PathBuf>,
}

/// Opens the backend named by `config`.
pub fn open_registry(config: &RegistryConfig) -> RegistryResult<Arc<dyn KeyRegistry>> {
    match &config.path {
        Some(path) => {
            info!("Opening SQLite key registry at {}", path.display());
            Ok(Arc::new(SqliteKeyRegistry::open(path)?))
        }
        None => {
            info!("Using in-memory key registry");
            Ok(Arc::new(MemoryKeyRegistry::new()))
        }
    }
}

pub(crate) fn check_record_file(file_id: &str, record: &WrappedKeyRecord) -> RegistryResult<()> {
    if record.file_id != file_id {
        return Err(RegistryError::Storage(format!(
            "record for file '{}' registered under '{}'",
            record.file_id, file_id
        )));
    }
    Ok(())
}
