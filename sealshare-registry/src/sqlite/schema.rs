//! SQLite schema for the key registry.

use crate::error::RegistryResult;
use rusqlite::Connection;

pub const SCHEMA_VERSION: u32 = 1;

pub fn init_schema(conn: &Connection) -> RegistryResult<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        -- One row per registered file
        CREATE TABLE IF NOT EXISTS files (
            file_id TEXT PRIMARY KEY,
            metadata_json TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        -- One wrapped content key per (file, identity)
        CREATE TABLE IF NOT EXISTS wrapped_keys (
            file_id TEXT NOT NULL REFERENCES files(file_id) ON DELETE CASCADE,
            identity TEXT NOT NULL,
            record_json TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (file_id, identity)
        );
    "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [SCHEMA_VERSION],
    )?;
    Ok(())
}
