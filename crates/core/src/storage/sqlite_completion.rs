//! SQLite-backed piece completion store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use super::{Completion, PieceCompletion, PieceKey, StorageError};

/// Piece completion persisted in a `completed` table.
///
/// Can share the catalog's database file.
pub struct SqlitePieceCompletion {
    conn: Mutex<Connection>,
}

impl SqlitePieceCompletion {
    pub fn new(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|e| StorageError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StorageError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StorageError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS completed (
                infoHash TEXT NOT NULL,
                "index" INTEGER NOT NULL,
                complete INTEGER NOT NULL,
                UNIQUE(infoHash, "index") ON CONFLICT REPLACE
            );
            "#,
        )
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Database(format!("connection lock poisoned: {}", e)))
    }
}

impl PieceCompletion for SqlitePieceCompletion {
    fn get(&self, key: PieceKey) -> Result<Completion, StorageError> {
        let conn = self.conn()?;
        let complete: Option<bool> = conn
            .query_row(
                r#"SELECT complete FROM completed WHERE infoHash = ? AND "index" = ?"#,
                params![key.info_hash.to_hex(), key.index],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(match complete {
            Some(complete) => Completion { complete, ok: true },
            None => Completion::default(),
        })
    }

    fn set(&self, key: PieceKey, complete: bool) -> Result<(), StorageError> {
        let conn = self.conn()?;
        conn.execute(
            r#"INSERT INTO completed (infoHash, "index", complete) VALUES (?, ?, ?)"#,
            params![key.info_hash.to_hex(), key.index, complete],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }
}
