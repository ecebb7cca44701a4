//! Types for the torrent catalog.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::info_hash::InfoHash;

/// One row per distinct info-hash ever observed on the DHT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Torrent {
    /// Info hash (serialized as lowercase hex).
    pub info_hash: InfoHash,
    /// Display name, absent until resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Total size in bytes (0 until resolved).
    pub length: u64,
    /// Number of announce events observed for this hash.
    pub announce_count: u64,
    /// First observation.
    pub created_at: DateTime<Utc>,
    /// First successful metadata resolution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Torrent {
    /// Whether metadata has been resolved for this torrent.
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

/// A file within a multi-file torrent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Path within the torrent, components joined with `/`.
    pub path: String,
    /// File size in bytes.
    pub length: u64,
    /// Position in the torrent's file list.
    pub position: u32,
}

/// Torrents first seen on one UTC day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineBucket {
    /// The UTC calendar day.
    pub day: NaiveDate,
    /// Torrents created that day, most announced first.
    pub torrents: Vec<Torrent>,
}

/// Catalog statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub total_torrents: u64,
    pub total_resolved: u64,
    pub total_announces: u64,
}

/// Result of recording a metadata resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionRecord {
    /// Name, length, search entry and files were written.
    Recorded,
    /// The torrent was already resolved; nothing changed.
    AlreadyResolved,
}

/// Errors from catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Torrent not found: {0}")]
    NotFound(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}
