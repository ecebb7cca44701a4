//! Torrent catalog - every info-hash seen on the DHT and what we know about it.
//!
//! Rows are created on first sighting and filled in once metadata has been
//! resolved. Nothing is ever deleted.

mod sqlite;
mod types;

pub use sqlite::SqliteCatalog;
pub use types::*;

use crate::info_hash::InfoHash;
use crate::torrent_client::TorrentMetadata;

/// Trait for torrent catalog storage.
///
/// Every write is idempotent: repeating it never produces an error or a
/// duplicate row. Methods returning `bool` report whether anything changed.
pub trait TorrentCatalog: Send + Sync {
    /// Create the torrent row for a hash unless it already exists.
    fn create_torrent(&self, info_hash: &InfoHash) -> Result<bool, CatalogError>;

    /// Record an announce from a peer and bump the torrent's announce count.
    ///
    /// The count is incremented on every call, even when the
    /// (hash, peer) row already exists. Returns whether a new announce row
    /// was stored.
    fn create_announce(&self, info_hash: &InfoHash, peer_id: &str) -> Result<bool, CatalogError>;

    /// Set name and length and mark the torrent resolved.
    ///
    /// No-op once the torrent is resolved.
    fn set_torrent_meta(
        &self,
        info_hash: &InfoHash,
        name: &str,
        length: u64,
    ) -> Result<bool, CatalogError>;

    /// Add the lower-cased name to the full-text index. Created at most once per hash.
    fn create_search_entry(&self, info_hash: &InfoHash, name: &str) -> Result<bool, CatalogError>;

    /// Record one file of a multi-file torrent.
    fn create_file_info(
        &self,
        info_hash: &InfoHash,
        path: &str,
        length: u64,
        position: u32,
    ) -> Result<bool, CatalogError>;

    /// Apply a whole resolution in one transaction.
    fn record_resolution(
        &self,
        metadata: &TorrentMetadata,
    ) -> Result<ResolutionRecord, CatalogError>;

    /// Get a torrent by hash.
    fn get_torrent(&self, info_hash: &InfoHash) -> Result<Torrent, CatalogError>;

    /// Files of a torrent ordered by position. Empty for single-file or
    /// unresolved torrents.
    fn get_files(&self, info_hash: &InfoHash) -> Result<Vec<FileInfo>, CatalogError>;

    /// Most announced torrents first.
    fn popular_torrents(&self, limit: u32) -> Result<Vec<Torrent>, CatalogError>;

    /// One bucket per UTC day, today first, each limited independently.
    fn timeline_torrents(&self, days: u32, limit: u32)
        -> Result<Vec<TimelineBucket>, CatalogError>;

    /// Full-text search over resolved names, most announced first.
    fn search_torrents(&self, term: &str, limit: u32) -> Result<Vec<Torrent>, CatalogError>;

    /// Row counts.
    fn stats(&self) -> Result<CatalogStats, CatalogError>;
}
