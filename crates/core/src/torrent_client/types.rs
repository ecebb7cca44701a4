//! Types for metadata-only torrent client operations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::info_hash::InfoHash;
use crate::storage::StorageBackend;

/// Errors that can occur during torrent client operations.
#[derive(Debug, Clone, Error)]
pub enum TorrentClientError {
    #[error("Client startup failed: {0}")]
    Startup(String),

    #[error("Torrent not found: {0}")]
    TorrentNotFound(String),

    #[error("Invalid torrent data: {0}")]
    InvalidTorrent(String),

    #[error("Unsupported storage backend: {0}")]
    UnsupportedStorage(String),

    /// The fetch was dropped by its owner before metadata arrived.
    #[error("Fetch cancelled: {0}")]
    Cancelled(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A file listed in a torrent's info dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path components joined with `/`.
    pub path: String,
    /// File size in bytes.
    pub length: u64,
}

/// Metadata obtained from the swarm for one info-hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentMetadata {
    pub info_hash: InfoHash,
    /// Display name from the info dictionary, if present.
    pub name: Option<String>,
    /// Total length in bytes.
    pub length: u64,
    /// Files of a multi-file torrent. Empty for single-file torrents.
    pub files: Vec<FileEntry>,
}

impl TorrentMetadata {
    /// The name to record, falling back to the hex info-hash.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => self.info_hash.to_hex(),
        }
    }

    /// Whether the torrent lists more than one file.
    pub fn is_multi_file(&self) -> bool {
        !self.files.is_empty()
    }
}

/// Outcome of asking the client for a handle on an info-hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new metadata fetch was started.
    Added,
    /// The client already holds a live handle for this hash.
    AlreadyManaged,
}

/// Trait for torrent clients able to fetch metadata without content.
///
/// Mirrors the add-or-get / wait-for-info / drop lifecycle of a torrent
/// handle. Implementations must collapse concurrent adds of the same hash
/// onto one in-flight fetch.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Add the hash with the given storage backend unless a handle already exists.
    async fn add_torrent(
        &self,
        info_hash: &InfoHash,
        storage: StorageBackend,
    ) -> Result<AddOutcome, TorrentClientError>;

    /// Wait until the info dictionary for a managed hash has arrived.
    ///
    /// Not bounded by a timeout; callers wrap it. Fails with
    /// [`TorrentClientError::Cancelled`] when the handle is dropped first.
    async fn wait_for_metadata(
        &self,
        info_hash: &InfoHash,
    ) -> Result<TorrentMetadata, TorrentClientError>;

    /// Release the handle for a hash. Dropping an unknown hash is not an error.
    async fn drop_torrent(&self, info_hash: &InfoHash) -> Result<(), TorrentClientError>;
}
