//! In-memory registry backend.

use crate::error::{RegistryError, RegistryResult};
use crate::{check_record_file, FileKeys, KeyRegistry};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sealshare_crypto::{EncryptionMetadata, WrappedKeyRecord};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// One file's metadata and the wrapped keys granted on it.
struct FileEntry {
    metadata: EncryptionMetadata,
    records: DashMap<String, WrappedKeyRecord>,
}

/// Registry held in a sharded map of files, each indexing its records by
/// identity.
///
/// Writers to different `(file, identity)` keys do not contend, and listing a
/// file touches only that file's records. A record is inserted while a read
/// guard on its file entry is held, so it cannot outlive a concurrent
/// [`delete_file`](KeyRegistry::delete_file), which drops the entry whole.
#[derive(Default)]
pub struct MemoryKeyRegistry {
    files: DashMap<String, FileEntry>,
    closed: AtomicBool,
}

impl MemoryKeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> RegistryResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RegistryError::Closed);
        }
        Ok(())
    }

    fn key_not_found(file_id: &str, identity: &str) -> RegistryError {
        RegistryError::KeyNotFound {
            file_id: file_id.to_string(),
            identity: identity.to_string(),
        }
    }
}

#[async_trait]
impl KeyRegistry for MemoryKeyRegistry {
    async fn register_file(
        &self,
        file_id: &str,
        metadata: &EncryptionMetadata,
        owner_record: &WrappedKeyRecord,
    ) -> RegistryResult<()> {
        self.ensure_open()?;
        check_record_file(file_id, owner_record)?;

        match self.files.entry(file_id.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::FileExists(file_id.to_string())),
            Entry::Vacant(slot) => {
                let records = DashMap::new();
                records.insert(owner_record.identity.clone(), owner_record.clone());
                slot.insert(FileEntry {
                    metadata: metadata.clone(),
                    records,
                });
                debug!("Registered file {} for {}", file_id, owner_record.identity);
                Ok(())
            }
        }
    }

    async fn put(&self, record: &WrappedKeyRecord) -> RegistryResult<()> {
        self.ensure_open()?;

        let Some(file) = self.files.get(&record.file_id) else {
            return Err(RegistryError::MetadataMissing(record.file_id.clone()));
        };
        file.records.insert(record.identity.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, file_id: &str, identity: &str) -> RegistryResult<WrappedKeyRecord> {
        self.ensure_open()?;
        let file = self
            .files
            .get(file_id)
            .ok_or_else(|| Self::key_not_found(file_id, identity))?;
        file.records
            .get(identity)
            .map(|r| r.value().clone())
            .ok_or_else(|| Self::key_not_found(file_id, identity))
    }

    async fn delete(&self, file_id: &str, identity: &str) -> RegistryResult<bool> {
        self.ensure_open()?;
        Ok(self
            .files
            .get(file_id)
            .is_some_and(|file| file.records.remove(identity).is_some()))
    }

    async fn delete_file(&self, file_id: &str) -> RegistryResult<usize> {
        self.ensure_open()?;

        let removed = self
            .files
            .remove(file_id)
            .map_or(0, |(_, file)| file.records.len());
        debug!("Deleted file {} ({} records)", file_id, removed);
        Ok(removed)
    }

    async fn get_metadata(&self, file_id: &str) -> RegistryResult<EncryptionMetadata> {
        self.ensure_open()?;
        self.files
            .get(file_id)
            .map(|file| file.metadata.clone())
            .ok_or_else(|| RegistryError::MetadataMissing(file_id.to_string()))
    }

    async fn list(&self, file_id: &str) -> RegistryResult<FileKeys> {
        self.ensure_open()?;

        let file = self
            .files
            .get(file_id)
            .ok_or_else(|| RegistryError::MetadataMissing(file_id.to_string()))?;
        let metadata = file.metadata.clone();
        let mut records: Vec<WrappedKeyRecord> = file
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        drop(file);
        records.sort_by(|a, b| a.identity.cmp(&b.identity));

        Ok(FileKeys { metadata, records })
    }

    async fn close(&self) -> RegistryResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.files.clear();
            debug!("Closed in-memory key registry");
        }
        Ok(())
    }
}
