//! Mock metadata client for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};

use crate::info_hash::InfoHash;
use crate::storage::StorageBackend;
use crate::torrent_client::{AddOutcome, MetadataClient, TorrentClientError, TorrentMetadata};

/// A recorded add_torrent call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAdd {
    pub info_hash: InfoHash,
    pub storage: StorageBackend,
}

/// Mock implementation of the MetadataClient trait.
///
/// Provides controllable behavior for testing:
/// - Metadata arrives only for hashes given to `set_metadata`; for any other
///   hash `wait_for_metadata` completes only when the handle is dropped
/// - Optional delay before metadata arrives
/// - Track added and dropped handles for assertions
/// - Simulate failures
///
/// # Example
///
/// ```rust,ignore
/// let client = MockMetadataClient::new();
/// client.set_metadata(fixtures::metadata(hash, "example.iso", 734003200)).await;
///
/// client.add_torrent(&hash, StorageBackend::ZeroContent).await?;
/// let meta = client.wait_for_metadata(&hash).await?;
/// client.drop_torrent(&hash).await?;
///
/// assert_eq!(client.dropped_torrents().await, vec![hash]);
/// ```
#[derive(Debug, Default)]
pub struct MockMetadataClient {
    /// Metadata served per hash.
    metadata: Arc<RwLock<HashMap<InfoHash, TorrentMetadata>>>,
    /// Hashes with a live handle.
    managed: Arc<RwLock<HashSet<InfoHash>>>,
    /// Recorded add_torrent calls.
    added: Arc<RwLock<Vec<RecordedAdd>>>,
    /// Recorded drop_torrent calls.
    dropped: Arc<RwLock<Vec<InfoHash>>>,
    /// If set, the next add_torrent call fails with this error.
    next_error: Arc<RwLock<Option<TorrentClientError>>>,
    /// Errors returned from wait_for_metadata per hash.
    wait_errors: Arc<RwLock<HashMap<InfoHash, TorrentClientError>>>,
    /// Delay before metadata is returned.
    delay: Arc<RwLock<Option<Duration>>>,
    /// Waits currently in progress.
    active: Arc<AtomicUsize>,
    /// Highest number of simultaneous waits.
    peak: Arc<AtomicUsize>,
    /// Wakes pending waits when a handle is dropped.
    drop_notify: Arc<Notify>,
}

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockMetadataClient {
    /// Create a new mock client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve this metadata for its hash.
    pub async fn set_metadata(&self, metadata: TorrentMetadata) {
        self.metadata
            .write()
            .await
            .insert(metadata.info_hash, metadata);
    }

    /// Delay every metadata response.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// Make the next add_torrent call fail.
    pub async fn set_next_error(&self, error: TorrentClientError) {
        *self.next_error.write().await = Some(error);
    }

    /// Make waits for this hash fail.
    pub async fn set_wait_error(&self, info_hash: InfoHash, error: TorrentClientError) {
        self.wait_errors.write().await.insert(info_hash, error);
    }

    /// Pretend another owner already holds a handle for this hash.
    pub async fn mark_managed(&self, info_hash: InfoHash) {
        self.managed.write().await.insert(info_hash);
    }

    /// Get all recorded add_torrent calls.
    pub async fn added_torrents(&self) -> Vec<RecordedAdd> {
        self.added.read().await.clone()
    }

    /// Get all recorded drop_torrent calls.
    pub async fn dropped_torrents(&self) -> Vec<InfoHash> {
        self.dropped.read().await.clone()
    }

    /// Number of live handles.
    pub async fn managed_count(&self) -> usize {
        self.managed.read().await.len()
    }

    /// Highest number of waits that were in progress at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataClient for MockMetadataClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn add_torrent(
        &self,
        info_hash: &InfoHash,
        storage: StorageBackend,
    ) -> Result<AddOutcome, TorrentClientError> {
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        self.added.write().await.push(RecordedAdd {
            info_hash: *info_hash,
            storage,
        });

        if self.managed.write().await.insert(*info_hash) {
            Ok(AddOutcome::Added)
        } else {
            Ok(AddOutcome::AlreadyManaged)
        }
    }

    async fn wait_for_metadata(
        &self,
        info_hash: &InfoHash,
    ) -> Result<TorrentMetadata, TorrentClientError> {
        if !self.managed.read().await.contains(info_hash) {
            return Err(TorrentClientError::TorrentNotFound(info_hash.to_hex()));
        }

        if let Some(error) = self.wait_errors.read().await.get(info_hash).cloned() {
            return Err(error);
        }

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);
        let _guard = ActiveGuard(self.active.clone());

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let metadata = self.metadata.read().await.get(info_hash).cloned();
        if let Some(metadata) = metadata {
            return Ok(metadata);
        }

        loop {
            let dropped = self.drop_notify.notified();
            if !self.managed.read().await.contains(info_hash) {
                return Err(TorrentClientError::Cancelled(info_hash.to_hex()));
            }
            dropped.await;
        }
    }

    async fn drop_torrent(&self, info_hash: &InfoHash) -> Result<(), TorrentClientError> {
        self.managed.write().await.remove(info_hash);
        self.dropped.write().await.push(*info_hash);
        self.drop_notify.notify_waiters();
        Ok(())
    }
}
