//! SQLite-backed torrent catalog implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Days, NaiveTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    CatalogError, CatalogStats, FileInfo, ResolutionRecord, TimelineBucket, Torrent,
    TorrentCatalog,
};
use crate::info_hash::InfoHash;
use crate::torrent_client::TorrentMetadata;

const SECONDS_PER_DAY: i64 = 86_400;

const TORRENT_COLUMNS: &str = "infoHash, name, length, announce_count, created_at, resolved_at";

/// SQLite-backed torrent catalog.
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    /// Open (or create) the catalog database at `path`.
    ///
    /// File databases run in WAL mode so CLI readers in another process do
    /// not block a running listener.
    pub fn new(path: &Path) -> Result<Self, CatalogError> {
        let conn = Connection::open(path).map_err(|e| CatalogError::Database(e.to_string()))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(|e| CatalogError::Database(e.to_string()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| CatalogError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite catalog (useful for testing).
    pub fn in_memory() -> Result<Self, CatalogError> {
        let conn =
            Connection::open_in_memory().map_err(|e| CatalogError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CatalogError> {
        conn.execute_batch(
            r#"
            -- One row per info-hash ever observed
            CREATE TABLE IF NOT EXISTS torrent (
                infoHash TEXT NOT NULL UNIQUE ON CONFLICT IGNORE,
                name TEXT,
                length INTEGER NOT NULL DEFAULT 0,
                resolved_at INTEGER,
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
                announce_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_torrent_announce_count ON torrent(announce_count);
            CREATE INDEX IF NOT EXISTS idx_torrent_created_at ON torrent(created_at);

            -- One row per distinct (hash, peer) pair
            CREATE TABLE IF NOT EXISTS announce (
                infoHash TEXT NOT NULL,
                peerID TEXT NOT NULL,
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
                UNIQUE(infoHash, peerID) ON CONFLICT IGNORE
            );

            -- Full-text index over resolved names; docid is the torrent rowid
            CREATE VIRTUAL TABLE IF NOT EXISTS search_torrent USING fts4(infoHash, name);

            -- Files of multi-file torrents
            CREATE TABLE IF NOT EXISTS file_info (
                infoHash TEXT NOT NULL,
                length INTEGER NOT NULL,
                position INTEGER NOT NULL,
                path TEXT NOT NULL,
                UNIQUE(infoHash, position) ON CONFLICT IGNORE
            );

            CREATE INDEX IF NOT EXISTS idx_file_info_hash ON file_info(infoHash);
            "#,
        )
        .map_err(|e| CatalogError::Database(e.to_string()))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CatalogError> {
        self.conn
            .lock()
            .map_err(|e| CatalogError::Database(format!("connection lock poisoned: {}", e)))
    }

    /// Timeline relative to an explicit `now`.
    pub fn timeline_at(
        &self,
        days: u32,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<TimelineBucket>, CatalogError> {
        let conn = self.conn()?;
        let today = now.date_naive();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM torrent
                 WHERE created_at >= ?1 AND created_at < ?2
                 ORDER BY announce_count DESC, rowid ASC
                 LIMIT ?3",
                TORRENT_COLUMNS
            ))
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        let mut buckets = Vec::with_capacity(days as usize);
        for offset in 0..days {
            let Some(day) = today.checked_sub_days(Days::new(offset.into())) else {
                break;
            };
            let start = day.and_time(NaiveTime::MIN).and_utc().timestamp();
            let end = start + SECONDS_PER_DAY;

            let rows = stmt
                .query_map(params![start, end, limit], Self::row_to_torrent)
                .map_err(|e| CatalogError::Database(e.to_string()))?;

            let mut torrents = Vec::new();
            for row in rows {
                torrents.push(row.map_err(|e| CatalogError::Database(e.to_string()))?);
            }
            buckets.push(TimelineBucket { day, torrents });
        }

        Ok(buckets)
    }

    fn row_to_torrent(row: &rusqlite::Row) -> rusqlite::Result<Torrent> {
        let hash: String = row.get(0)?;
        let info_hash = InfoHash::from_hex(&hash).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let length: i64 = row.get(2)?;
        let announce_count: i64 = row.get(3)?;
        let created_at: i64 = row.get(4)?;
        let resolved_at: Option<i64> = row.get(5)?;

        Ok(Torrent {
            info_hash,
            name: row.get(1)?,
            length: length.max(0) as u64,
            announce_count: announce_count.max(0) as u64,
            created_at: from_unix(created_at),
            resolved_at: resolved_at.map(from_unix),
        })
    }

    fn insert_torrent(conn: &Connection, info_hash: &str, now: i64) -> Result<bool, CatalogError> {
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO torrent (infoHash, created_at) VALUES (?, ?)",
                params![info_hash, now],
            )
            .map_err(|e| CatalogError::Database(e.to_string()))?;
        Ok(inserted > 0)
    }

    fn update_meta(
        conn: &Connection,
        info_hash: &str,
        name: &str,
        length: u64,
        now: i64,
    ) -> Result<bool, CatalogError> {
        let updated = conn
            .execute(
                "UPDATE torrent SET name = ?, length = ?, resolved_at = ?
                 WHERE infoHash = ? AND resolved_at IS NULL",
                params![name, length as i64, now, info_hash],
            )
            .map_err(|e| CatalogError::Database(e.to_string()))?;
        Ok(updated > 0)
    }

    fn insert_search_entry(
        conn: &Connection,
        info_hash: &str,
        name: &str,
    ) -> Result<bool, CatalogError> {
        let rowid: i64 = conn
            .query_row(
                "SELECT rowid FROM torrent WHERE infoHash = ?",
                params![info_hash],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => CatalogError::NotFound(info_hash.to_string()),
                _ => CatalogError::Database(e.to_string()),
            })?;

        let exists = conn
            .query_row(
                "SELECT 1 FROM search_torrent WHERE docid = ?",
                params![rowid],
                |_| Ok(()),
            )
            .optional()
            .map_err(|e| CatalogError::Database(e.to_string()))?
            .is_some();
        if exists {
            return Ok(false);
        }

        conn.execute(
            "INSERT INTO search_torrent (docid, infoHash, name) VALUES (?, ?, ?)",
            params![rowid, info_hash, name.to_lowercase()],
        )
        .map_err(|e| CatalogError::Database(e.to_string()))?;
        Ok(true)
    }

    fn insert_file(
        conn: &Connection,
        info_hash: &str,
        path: &str,
        length: u64,
        position: u32,
    ) -> Result<bool, CatalogError> {
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO file_info (infoHash, length, position, path)
                 VALUES (?, ?, ?, ?)",
                params![info_hash, length as i64, position, path],
            )
            .map_err(|e| CatalogError::Database(e.to_string()))?;
        Ok(inserted > 0)
    }
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn map_search_error(e: rusqlite::Error) -> CatalogError {
    let message = e.to_string();
    if message.contains("MATCH") || message.contains("syntax error") {
        CatalogError::InvalidQuery(message)
    } else {
        CatalogError::Database(message)
    }
}

impl TorrentCatalog for SqliteCatalog {
    fn create_torrent(&self, info_hash: &InfoHash) -> Result<bool, CatalogError> {
        let conn = self.conn()?;
        Self::insert_torrent(&conn, &info_hash.to_hex(), Utc::now().timestamp())
    }

    fn create_announce(&self, info_hash: &InfoHash, peer_id: &str) -> Result<bool, CatalogError> {
        let mut conn = self.conn()?;
        let hash = info_hash.to_hex();
        let now = Utc::now().timestamp();

        let tx = conn
            .transaction()
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        Self::insert_torrent(&tx, &hash, now)?;

        let inserted = tx
            .execute(
                "INSERT OR IGNORE INTO announce (infoHash, peerID, created_at) VALUES (?, ?, ?)",
                params![&hash, peer_id, now],
            )
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        // Counts announce events, not distinct peers.
        tx.execute(
            "UPDATE torrent SET announce_count = announce_count + 1 WHERE infoHash = ?",
            params![&hash],
        )
        .map_err(|e| CatalogError::Database(e.to_string()))?;

        tx.commit()
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        Ok(inserted > 0)
    }

    fn set_torrent_meta(
        &self,
        info_hash: &InfoHash,
        name: &str,
        length: u64,
    ) -> Result<bool, CatalogError> {
        let conn = self.conn()?;
        Self::update_meta(
            &conn,
            &info_hash.to_hex(),
            name,
            length,
            Utc::now().timestamp(),
        )
    }

    fn create_search_entry(&self, info_hash: &InfoHash, name: &str) -> Result<bool, CatalogError> {
        let conn = self.conn()?;
        Self::insert_search_entry(&conn, &info_hash.to_hex(), name)
    }

    fn create_file_info(
        &self,
        info_hash: &InfoHash,
        path: &str,
        length: u64,
        position: u32,
    ) -> Result<bool, CatalogError> {
        let conn = self.conn()?;
        Self::insert_file(&conn, &info_hash.to_hex(), path, length, position)
    }

    fn record_resolution(
        &self,
        metadata: &TorrentMetadata,
    ) -> Result<ResolutionRecord, CatalogError> {
        let mut conn = self.conn()?;
        let hash = metadata.info_hash.to_hex();
        let name = metadata.display_name();
        let now = Utc::now().timestamp();

        let tx = conn
            .transaction()
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        Self::insert_torrent(&tx, &hash, now)?;

        if !Self::update_meta(&tx, &hash, &name, metadata.length, now)? {
            return Ok(ResolutionRecord::AlreadyResolved);
        }

        Self::insert_search_entry(&tx, &hash, &name)?;

        if metadata.is_multi_file() {
            for (position, file) in metadata.files.iter().enumerate() {
                Self::insert_file(&tx, &hash, &file.path, file.length, position as u32)?;
            }
        }

        tx.commit()
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        Ok(ResolutionRecord::Recorded)
    }

    fn get_torrent(&self, info_hash: &InfoHash) -> Result<Torrent, CatalogError> {
        let conn = self.conn()?;
        let hash = info_hash.to_hex();

        conn.query_row(
            &format!("SELECT {} FROM torrent WHERE infoHash = ?", TORRENT_COLUMNS),
            params![&hash],
            Self::row_to_torrent,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => CatalogError::NotFound(hash.clone()),
            _ => CatalogError::Database(e.to_string()),
        })
    }

    fn get_files(&self, info_hash: &InfoHash) -> Result<Vec<FileInfo>, CatalogError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT path, length, position FROM file_info
                 WHERE infoHash = ? ORDER BY position ASC",
            )
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![info_hash.to_hex()], |row| {
                let length: i64 = row.get(1)?;
                Ok(FileInfo {
                    path: row.get(0)?,
                    length: length.max(0) as u64,
                    position: row.get(2)?,
                })
            })
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row.map_err(|e| CatalogError::Database(e.to_string()))?);
        }
        Ok(files)
    }

    fn popular_torrents(&self, limit: u32) -> Result<Vec<Torrent>, CatalogError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM torrent ORDER BY announce_count DESC, rowid ASC LIMIT ?",
                TORRENT_COLUMNS
            ))
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![limit], Self::row_to_torrent)
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(|e| CatalogError::Database(e.to_string()))?);
        }
        Ok(results)
    }

    fn timeline_torrents(
        &self,
        days: u32,
        limit: u32,
    ) -> Result<Vec<TimelineBucket>, CatalogError> {
        self.timeline_at(days, limit, Utc::now())
    }

    fn search_torrents(&self, term: &str, limit: u32) -> Result<Vec<Torrent>, CatalogError> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return Err(CatalogError::InvalidQuery("empty search term".to_string()));
        }

        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT t.infoHash, t.name, t.length, t.announce_count, t.created_at, t.resolved_at
                 FROM search_torrent s
                 JOIN torrent t ON t.rowid = s.docid
                 WHERE s.name MATCH ?
                 ORDER BY t.announce_count DESC, t.rowid ASC
                 LIMIT ?",
            )
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![&term, limit], Self::row_to_torrent)
            .map_err(map_search_error)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(map_search_error)?);
        }
        Ok(results)
    }

    fn stats(&self) -> Result<CatalogStats, CatalogError> {
        let conn = self.conn()?;

        let total_torrents: i64 = conn
            .query_row("SELECT COUNT(*) FROM torrent", [], |row| row.get(0))
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        let total_resolved: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM torrent WHERE resolved_at IS NOT NULL",
                [],
                |row| row.get(0),
            )
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        let total_announces: i64 = conn
            .query_row("SELECT COUNT(*) FROM announce", [], |row| row.get(0))
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        Ok(CatalogStats {
            total_torrents: total_torrents as u64,
            total_resolved: total_resolved as u64,
            total_announces: total_announces as u64,
        })
    }
}
