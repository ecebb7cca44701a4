//! Piece storage handed to the torrent client.
//!
//! Resolution only needs the info dictionary. Every backend here is built on
//! [`ZeroContentStorage`], which holds no payload: reads fail, writes are
//! discarded and no piece ever verifies, so a torrent added with it only
//! takes part in metadata exchange. The database completion backend also
//! persists piece completion in the `completed` table.

mod sqlite_completion;
mod zero_content;

pub use sqlite_completion::SqlitePieceCompletion;
pub use zero_content::{ZeroContentStorage, ZeroContentStorageFactory};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::info_hash::InfoHash;

/// Storage backend selection when adding a torrent to the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Nothing is stored; only metadata is exchanged.
    #[default]
    ZeroContent,
    /// Zero content, with piece completion tracked in the catalog database.
    DatabaseCompletion,
}

impl StorageBackend {
    /// Whether this backend needs a [`PieceCompletion`] store.
    pub fn needs_completion(&self) -> bool {
        matches!(self, StorageBackend::DatabaseCompletion)
    }

    /// Build the storage factory handed to the torrent client.
    pub fn storage_factory(
        &self,
        completion: Option<Arc<dyn PieceCompletion>>,
    ) -> Result<ZeroContentStorageFactory, StorageError> {
        match (self, completion) {
            (StorageBackend::ZeroContent, _) => Ok(ZeroContentStorageFactory::new()),
            (StorageBackend::DatabaseCompletion, Some(completion)) => {
                Ok(ZeroContentStorageFactory::with_completion(completion))
            }
            (StorageBackend::DatabaseCompletion, None) => Err(StorageError::Unavailable(
                "no piece completion store configured".to_string(),
            )),
        }
    }
}

/// Identifies one piece of one torrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PieceKey {
    pub info_hash: InfoHash,
    pub index: u32,
}

impl PieceKey {
    pub fn new(info_hash: InfoHash, index: u32) -> Self {
        Self { info_hash, index }
    }
}

/// Completion state of a piece.
///
/// `ok == false` means the backend has no knowledge of the piece, which the
/// client must treat as "not complete".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Completion {
    pub complete: bool,
    pub ok: bool,
}

/// Errors from piece storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Persistent record of which pieces are complete.
pub trait PieceCompletion: Send + Sync {
    fn get(&self, key: PieceKey) -> Result<Completion, StorageError>;

    fn set(&self, key: PieceKey, complete: bool) -> Result<(), StorageError>;
}
