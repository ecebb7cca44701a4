//! Resolution of a single info-hash.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::types::{ResolveError, ResolveOutcome};
use crate::catalog::{CatalogError, ResolutionRecord, TorrentCatalog};
use crate::info_hash::InfoHash;
use crate::metrics;
use crate::storage::StorageBackend;
use crate::torrent_client::{AddOutcome, MetadataClient, TorrentClientError, TorrentMetadata};

enum Fetched {
    Metadata(TorrentMetadata),
    InFlight,
    TimedOut,
}

/// Fetches metadata for hashes and writes it to the catalog.
pub struct Resolver {
    catalog: Arc<dyn TorrentCatalog>,
    client: Arc<dyn MetadataClient>,
    timeout: Duration,
    storage: StorageBackend,
}

impl Resolver {
    pub fn new(
        catalog: Arc<dyn TorrentCatalog>,
        client: Arc<dyn MetadataClient>,
        timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            client,
            timeout,
            storage: StorageBackend::ZeroContent,
        }
    }

    /// Use a different storage backend when adding torrents.
    pub fn with_storage(mut self, storage: StorageBackend) -> Self {
        self.storage = storage;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// One worker iteration for a dequeued hash.
    ///
    /// Never fails: errors become [`ResolveOutcome::Failed`] and are logged.
    pub async fn resolve_one(&self, info_hash: InfoHash) -> ResolveOutcome {
        let outcome = self.try_resolve(info_hash).await;

        if let ResolveOutcome::Failed(ref reason) = outcome {
            warn!(info_hash = %info_hash, error = %reason, "Resolution failed");
        }

        metrics::RESOLUTIONS
            .with_label_values(&[outcome.as_str()])
            .inc();
        outcome
    }

    async fn try_resolve(&self, info_hash: InfoHash) -> ResolveOutcome {
        match self.catalog.get_torrent(&info_hash) {
            Ok(torrent) if torrent.is_resolved() => {
                debug!(info_hash = %info_hash, "Already resolved, skipping");
                return ResolveOutcome::AlreadyResolved;
            }
            Ok(_) | Err(CatalogError::NotFound(_)) => {}
            Err(e) => return ResolveOutcome::Failed(e.to_string()),
        }

        let started = Instant::now();
        let fetched = self.fetch_with_timeout(&info_hash, self.timeout).await;

        let metadata = match fetched {
            Ok(Fetched::Metadata(metadata)) => metadata,
            Ok(Fetched::InFlight) => {
                debug!(info_hash = %info_hash, "Fetch already in flight");
                return ResolveOutcome::InFlight;
            }
            Ok(Fetched::TimedOut) => {
                metrics::RESOLVE_DURATION
                    .with_label_values(&["timeout"])
                    .observe(started.elapsed().as_secs_f64());
                debug!(info_hash = %info_hash, timeout_secs = self.timeout.as_secs(), "Resolve timeout");
                return ResolveOutcome::TimedOut;
            }
            Err(e) => return ResolveOutcome::Failed(e.to_string()),
        };

        metrics::RESOLVE_DURATION
            .with_label_values(&["resolved"])
            .observe(started.elapsed().as_secs_f64());

        match self.catalog.record_resolution(&metadata) {
            Ok(ResolutionRecord::Recorded) => {
                info!(
                    info_hash = %info_hash,
                    name = %metadata.display_name(),
                    length = metadata.length,
                    files = metadata.files.len(),
                    "Resolved torrent"
                );
                ResolveOutcome::Resolved
            }
            Ok(ResolutionRecord::AlreadyResolved) => ResolveOutcome::AlreadyResolved,
            Err(e) => ResolveOutcome::Failed(e.to_string()),
        }
    }

    /// One-shot fetch with an explicit timeout, recording the result.
    ///
    /// Returns `Ok(None)` when metadata does not arrive in time.
    pub async fn fetch(
        &self,
        info_hash: &InfoHash,
        timeout: Duration,
    ) -> Result<Option<TorrentMetadata>, ResolveError> {
        let metadata = match self.fetch_with_timeout(info_hash, timeout).await? {
            Fetched::Metadata(metadata) => metadata,
            Fetched::TimedOut => return Ok(None),
            Fetched::InFlight => {
                // Join the existing fetch without taking over its handle. An
                // owner that gives up first ends the join like a timeout.
                match tokio::time::timeout(timeout, self.client.wait_for_metadata(info_hash))
                    .await
                {
                    Ok(Ok(metadata)) => metadata,
                    Ok(Err(TorrentClientError::Cancelled(_)))
                    | Ok(Err(TorrentClientError::TorrentNotFound(_))) => {
                        debug!(info_hash = %info_hash, "Joined fetch was dropped by its owner");
                        return Ok(None);
                    }
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => return Ok(None),
                }
            }
        };

        self.catalog.record_resolution(&metadata)?;
        Ok(Some(metadata))
    }

    async fn fetch_with_timeout(
        &self,
        info_hash: &InfoHash,
        timeout: Duration,
    ) -> Result<Fetched, ResolveError> {
        match self.client.add_torrent(info_hash, self.storage).await? {
            AddOutcome::AlreadyManaged => return Ok(Fetched::InFlight),
            AddOutcome::Added => {}
        }

        let result = tokio::time::timeout(timeout, self.client.wait_for_metadata(info_hash)).await;

        if let Err(e) = self.client.drop_torrent(info_hash).await {
            warn!(info_hash = %info_hash, error = %e, "Failed to drop torrent handle");
        }

        match result {
            Ok(Ok(metadata)) => Ok(Fetched::Metadata(metadata)),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(Fetched::TimedOut),
        }
    }
}
