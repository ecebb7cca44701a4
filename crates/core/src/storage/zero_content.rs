use std::path::Path;
use std::sync::Arc;

use anyhow::bail;
use librqbit::storage::{BoxStorageFactory, StorageFactory, StorageFactoryExt, TorrentStorage};
use librqbit::{ManagedTorrentShared, TorrentMetadata as RqbitTorrentMetadata};
use librqbit_core::lengths::ValidPieceIndex;
use tracing::trace;

use super::{PieceCompletion, PieceKey};
use crate::info_hash::InfoHash;

/// Storage that holds no content.
///
/// Reads fail, so the client's initial check finds no pieces and never
/// verifies one. Writes are accepted and thrown away.
pub struct ZeroContentStorage {
    info_hash: InfoHash,
    completion: Option<Arc<dyn PieceCompletion>>,
}

impl ZeroContentStorage {
    pub fn new(info_hash: InfoHash, completion: Option<Arc<dyn PieceCompletion>>) -> Self {
        Self {
            info_hash,
            completion,
        }
    }

    fn record_completed(&self, index: u32) -> anyhow::Result<()> {
        if let Some(completion) = &self.completion {
            completion.set(PieceKey::new(self.info_hash, index), true)?;
        }
        Ok(())
    }
}

impl TorrentStorage for ZeroContentStorage {
    fn init(
        &mut self,
        _shared: &ManagedTorrentShared,
        metadata: &RqbitTorrentMetadata,
    ) -> anyhow::Result<()> {
        trace!(
            info_hash = %self.info_hash,
            files = metadata.file_infos.len(),
            "Zero-content storage attached"
        );
        Ok(())
    }

    fn pread_exact(&self, file_id: usize, offset: u64, _buf: &mut [u8]) -> anyhow::Result<()> {
        bail!(
            "zero-content storage holds no data (file {}, offset {})",
            file_id,
            offset
        )
    }

    fn pwrite_all(&self, _file_id: usize, _offset: u64, _buf: &[u8]) -> anyhow::Result<()> {
        Ok(())
    }

    fn remove_file(&self, _file_id: usize, _filename: &Path) -> anyhow::Result<()> {
        Ok(())
    }

    fn remove_directory_if_empty(&self, _path: &Path) -> anyhow::Result<()> {
        Ok(())
    }

    fn ensure_file_length(&self, _file_id: usize, _length: u64) -> anyhow::Result<()> {
        Ok(())
    }

    fn take(&self) -> anyhow::Result<Box<dyn TorrentStorage>> {
        Ok(Box::new(Self::new(self.info_hash, self.completion.clone())))
    }

    fn on_piece_completed(&self, piece_index: ValidPieceIndex) -> anyhow::Result<()> {
        self.record_completed(piece_index.get())
    }
}

/// Hands a [`ZeroContentStorage`] to every torrent the client adds.
#[derive(Clone, Default)]
pub struct ZeroContentStorageFactory {
    completion: Option<Arc<dyn PieceCompletion>>,
}

impl ZeroContentStorageFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record piece completion in `completion`.
    pub fn with_completion(completion: Arc<dyn PieceCompletion>) -> Self {
        Self {
            completion: Some(completion),
        }
    }

    pub fn records_completion(&self) -> bool {
        self.completion.is_some()
    }

    /// Storage for one torrent.
    pub fn storage_for(&self, info_hash: InfoHash) -> ZeroContentStorage {
        ZeroContentStorage::new(info_hash, self.completion.clone())
    }
}

impl StorageFactory for ZeroContentStorageFactory {
    type Storage = ZeroContentStorage;

    fn create(
        &self,
        shared: &ManagedTorrentShared,
        _metadata: &RqbitTorrentMetadata,
    ) -> anyhow::Result<ZeroContentStorage> {
        Ok(self.storage_for(InfoHash::new(shared.info_hash.0)))
    }

    fn clone_box(&self) -> BoxStorageFactory {
        self.clone().boxed()
    }
}
