//! SQLite registry backend.
//!
//! Records are stored whole as JSON, so a reader always sees a complete
//! record. Every write runs inside a transaction on the single connection.

mod schema;

use crate::error::{RegistryError, RegistryResult};
use crate::{check_record_file, FileKeys, KeyRegistry};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use sealshare_crypto::{EncryptionMetadata, WrappedKeyRecord};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Key registry backed by SQLite.
#[derive(Clone)]
pub struct SqliteKeyRegistry {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteKeyRegistry {
    /// Opens or creates a registry database at `path`, in WAL mode.
    pub fn open(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RegistryError::Storage(e.to_string()))?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("SQLite journal mode: {}", mode);
        schema::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Opens an in-memory registry (for testing).
    pub fn open_in_memory() -> RegistryResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    fn lock(&self) -> RegistryResult<MutexGuard<'_, Option<Connection>>> {
        self.conn
            .lock()
            .map_err(|e| RegistryError::Storage(format!("connection lock poisoned: {e}")))
    }
}

fn open_conn(guard: &mut Option<Connection>) -> RegistryResult<&mut Connection> {
    guard.as_mut().ok_or(RegistryError::Closed)
}

fn file_exists(conn: &Connection, file_id: &str) -> RegistryResult<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM files WHERE file_id = ?1",
            [file_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn upsert_record(conn: &Connection, record: &WrappedKeyRecord) -> RegistryResult<()> {
    let json = serde_json::to_string(record)?;
    conn.execute(
        "INSERT INTO wrapped_keys (file_id, identity, record_json, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (file_id, identity) DO UPDATE SET
             record_json = excluded.record_json,
             updated_at = excluded.updated_at",
        params![
            record.file_id,
            record.identity,
            json,
            Utc::now().to_rfc3339()
        ],
    )?;
    Ok(())
}

fn load_metadata(conn: &Connection, file_id: &str) -> RegistryResult<EncryptionMetadata> {
    let json: Option<String> = conn
        .query_row(
            "SELECT metadata_json FROM files WHERE file_id = ?1",
            [file_id],
            |row| row.get(0),
        )
        .optional()?;
    match json {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Err(RegistryError::MetadataMissing(file_id.to_string())),
    }
}

#[async_trait]
impl KeyRegistry for SqliteKeyRegistry {
    async fn register_file(
        &self,
        file_id: &str,
        metadata: &EncryptionMetadata,
        owner_record: &WrappedKeyRecord,
    ) -> RegistryResult<()> {
        check_record_file(file_id, owner_record)?;
        let metadata_json = serde_json::to_string(metadata)?;

        let mut guard = self.lock()?;
        let conn = open_conn(&mut guard)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if file_exists(&tx, file_id)? {
            return Err(RegistryError::FileExists(file_id.to_string()));
        }
        tx.execute(
            "INSERT INTO files (file_id, metadata_json, created_at) VALUES (?1, ?2, ?3)",
            params![file_id, metadata_json, Utc::now().to_rfc3339()],
        )?;
        upsert_record(&tx, owner_record)?;
        tx.commit()?;

        debug!("Registered file {} for {}", file_id, owner_record.identity);
        Ok(())
    }

    async fn put(&self, record: &WrappedKeyRecord) -> RegistryResult<()> {
        let mut guard = self.lock()?;
        let conn = open_conn(&mut guard)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !file_exists(&tx, &record.file_id)? {
            return Err(RegistryError::MetadataMissing(record.file_id.clone()));
        }
        upsert_record(&tx, record)?;
        tx.commit()?;
        Ok(())
    }

    async fn get(&self, file_id: &str, identity: &str) -> RegistryResult<WrappedKeyRecord> {
        let mut guard = self.lock()?;
        let conn = open_conn(&mut guard)?;

        let json: Option<String> = conn
            .query_row(
                "SELECT record_json FROM wrapped_keys WHERE file_id = ?1 AND identity = ?2",
                [file_id, identity],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Err(RegistryError::KeyNotFound {
                file_id: file_id.to_string(),
                identity: identity.to_string(),
            }),
        }
    }

    async fn delete(&self, file_id: &str, identity: &str) -> RegistryResult<bool> {
        let mut guard = self.lock()?;
        let conn = open_conn(&mut guard)?;
        let removed = conn.execute(
            "DELETE FROM wrapped_keys WHERE file_id = ?1 AND identity = ?2",
            [file_id, identity],
        )?;
        Ok(removed > 0)
    }

    async fn delete_file(&self, file_id: &str) -> RegistryResult<usize> {
        let mut guard = self.lock()?;
        let conn = open_conn(&mut guard)?;
        let tx = conn.transaction()?;

        let removed = tx.execute("DELETE FROM wrapped_keys WHERE file_id = ?1", [file_id])?;
        tx.execute("DELETE FROM files WHERE file_id = ?1", [file_id])?;
        tx.commit()?;

        debug!("Deleted file {} ({} records)", file_id, removed);
        Ok(removed)
    }

    async fn get_metadata(&self, file_id: &str) -> RegistryResult<EncryptionMetadata> {
        let mut guard = self.lock()?;
        let conn = open_conn(&mut guard)?;
        load_metadata(conn, file_id)
    }

    async fn list(&self, file_id: &str) -> RegistryResult<FileKeys> {
        let mut guard = self.lock()?;
        let conn = open_conn(&mut guard)?;

        let metadata = load_metadata(conn, file_id)?;
        let mut stmt = conn.prepare(
            "SELECT record_json FROM wrapped_keys WHERE file_id = ?1 ORDER BY identity",
        )?;
        let rows = stmt.query_map([file_id], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for json in rows {
            records.push(serde_json::from_str(&json?)?);
        }
        Ok(FileKeys { metadata, records })
    }

    async fn close(&self) -> RegistryResult<()> {
        let mut guard = self.lock()?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| RegistryError::Database(e))?;
            info!("Closed SQLite key registry");
        }
        Ok(())
    }
}
