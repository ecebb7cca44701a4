//! librqbit embedded metadata client.
//!
//! Torrents are added paused on [`ZeroContentStorageFactory`] storage:
//! librqbit resolves the magnet over the DHT and peer wire protocol, creates
//! the storage from the info dictionary and never downloads a piece. The
//! session handle is deleted when the resolver drops the hash.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use librqbit::api::TorrentIdOrHash;
use librqbit::storage::StorageFactoryExt;
use librqbit::{
    AddTorrent as RqbitAddTorrent, AddTorrentOptions, AddTorrentResponse, Session, SessionOptions,
};
use librqbit_core::torrent_metainfo::TorrentMetaV1Info;
use librqbit_core::Id20;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use super::{AddOutcome, FileEntry, MetadataClient, TorrentClientError, TorrentMetadata};
use crate::config::TorrentClientConfig;
use crate::info_hash::InfoHash;
use crate::storage::{PieceCompletion, StorageBackend, ZeroContentStorageFactory};

type MetadataFuture = Shared<BoxFuture<'static, Result<TorrentMetadata, TorrentClientError>>>;

struct InFlight {
    future: MetadataFuture,
    abort: AbortHandle,
}

/// Embedded librqbit session used only for metadata exchange.
pub struct LibrqbitMetadataClient {
    session: Arc<Session>,
    in_flight: Mutex<HashMap<InfoHash, InFlight>>,
    completion: Option<Arc<dyn PieceCompletion>>,
}

impl LibrqbitMetadataClient {
    /// Start a librqbit session from configuration.
    pub async fn new(config: &TorrentClientConfig) -> Result<Self, TorrentClientError> {
        let download_path = PathBuf::from(&config.download_path);

        if !download_path.exists() {
            std::fs::create_dir_all(&download_path).map_err(|e| {
                TorrentClientError::Startup(format!(
                    "Failed to create download directory: {}",
                    e
                ))
            })?;
        }

        let mut opts = SessionOptions::default();

        if !config.enable_dht {
            opts.disable_dht = true;
        }

        if let Some(port) = config.listen_port {
            opts.listen_port_range = Some(port..(port + 1));
        }

        opts.enable_upnp_port_forwarding = config.enable_upnp;

        info!(
            download_path = %download_path.display(),
            dht_enabled = !opts.disable_dht,
            upnp = config.enable_upnp,
            "Initializing librqbit session"
        );

        let session = Session::new_with_opts(download_path, opts)
            .await
            .map_err(|e| {
                TorrentClientError::Startup(format!(
                    "Failed to initialize librqbit session: {}",
                    e
                ))
            })?;

        if let Some(port) = session.tcp_listen_port() {
            info!(port = port, "librqbit listening on TCP port");
        }

        Ok(Self {
            session,
            in_flight: Mutex::new(HashMap::new()),
            completion: None,
        })
    }

    /// Piece completion store for [`StorageBackend::DatabaseCompletion`].
    pub fn with_completion(mut self, completion: Arc<dyn PieceCompletion>) -> Self {
        self.completion = Some(completion);
        self
    }

    /// Abort every in-flight fetch and stop the session.
    pub async fn shutdown(&self) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            for (_, entry) in in_flight.drain() {
                entry.abort.abort();
            }
        }
        self.session.stop().await;
        info!("librqbit session stopped");
    }

    /// Number of hashes with a live handle.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().map(|m| m.len()).unwrap_or(0)
    }

    fn lock_in_flight(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<InfoHash, InFlight>>, TorrentClientError> {
        self.in_flight
            .lock()
            .map_err(|e| TorrentClientError::Internal(format!("in-flight map poisoned: {}", e)))
    }

    fn start_fetch(
        &self,
        info_hash: &InfoHash,
        storage: ZeroContentStorageFactory,
    ) -> Result<AddOutcome, TorrentClientError> {
        let mut in_flight = self.lock_in_flight()?;
        if in_flight.contains_key(info_hash) {
            return Ok(AddOutcome::AlreadyManaged);
        }

        let session = self.session.clone();
        let hash = *info_hash;
        let task = tokio::spawn(fetch_metadata(session, hash, storage));
        let abort = task.abort_handle();

        let future = async move {
            match task.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(TorrentClientError::Cancelled(hash.to_hex())),
                Err(e) => Err(TorrentClientError::Internal(format!(
                    "metadata task ended: {}",
                    e
                ))),
            }
        }
        .boxed()
        .shared();

        in_flight.insert(hash, InFlight { future, abort });
        debug!(info_hash = %hash, "Started metadata fetch");

        Ok(AddOutcome::Added)
    }

    /// Remove the session's torrent for a hash, if one was added.
    async fn release(&self, info_hash: &InfoHash) {
        let id = TorrentIdOrHash::Hash(Id20::new(*info_hash.as_bytes()));
        if self.session.get(id).is_none() {
            return;
        }
        if let Err(e) = self.session.delete(id, false).await {
            warn!(info_hash = %info_hash, error = %e, "Failed to delete torrent from session");
        }
    }
}

async fn fetch_metadata(
    session: Arc<Session>,
    info_hash: InfoHash,
    storage: ZeroContentStorageFactory,
) -> Result<TorrentMetadata, TorrentClientError> {
    let opts = AddTorrentOptions {
        paused: true,
        storage_factory: Some(storage.boxed()),
        ..Default::default()
    };

    let response = session
        .add_torrent(RqbitAddTorrent::from_url(info_hash.magnet_uri()), Some(opts))
        .await
        .map_err(|e| TorrentClientError::ApiError(format!("Failed to fetch metadata: {}", e)))?;

    let handle = match response {
        AddTorrentResponse::Added(_, handle) | AddTorrentResponse::AlreadyManaged(_, handle) => {
            handle
        }
        AddTorrentResponse::ListOnly(_) => {
            return Err(TorrentClientError::ApiError(
                "Torrent was listed instead of added".to_string(),
            ));
        }
    };

    handle
        .with_metadata(|metadata| metadata_from_info(info_hash, &metadata.info))
        .map_err(|e| TorrentClientError::InvalidTorrent(e.to_string()))
}

/// Convert a parsed info dictionary. File paths are prefixed with the name.
fn metadata_from_info<B: AsRef<[u8]>>(
    info_hash: InfoHash,
    info: &TorrentMetaV1Info<B>,
) -> TorrentMetadata {
    let name = info.name.as_ref().map(|b| bytes_to_string(b.as_ref()));

    let files = match info.files {
        Some(ref files) => {
            let mut entries = Vec::with_capacity(files.len());
            for file in files {
                let mut parts: Vec<String> = name.iter().cloned().collect();
                for part in &file.path {
                    parts.push(bytes_to_string(part.as_ref()));
                }
                entries.push(FileEntry {
                    path: parts.join("/"),
                    length: file.length,
                });
            }
            entries
        }
        None => Vec::new(),
    };

    assemble_metadata(info_hash, name, files, info.length)
}

/// Build metadata from info dictionary fields.
///
/// Length is the single-file length or the sum of the files.
fn assemble_metadata(
    info_hash: InfoHash,
    name: Option<String>,
    files: Vec<FileEntry>,
    single_file_length: Option<u64>,
) -> TorrentMetadata {
    let length = single_file_length.unwrap_or_else(|| files.iter().map(|f| f.length).sum());
    TorrentMetadata {
        info_hash,
        name,
        length,
        files,
    }
}

/// Convert bytes to a UTF-8 string, replacing invalid sequences.
fn bytes_to_string(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

#[async_trait]
impl MetadataClient for LibrqbitMetadataClient {
    fn name(&self) -> &str {
        "librqbit"
    }

    async fn add_torrent(
        &self,
        info_hash: &InfoHash,
        storage: StorageBackend,
    ) -> Result<AddOutcome, TorrentClientError> {
        let factory = storage
            .storage_factory(self.completion.clone())
            .map_err(|e| TorrentClientError::UnsupportedStorage(format!("{:?}: {}", storage, e)))?;
        self.start_fetch(info_hash, factory)
    }

    async fn wait_for_metadata(
        &self,
        info_hash: &InfoHash,
    ) -> Result<TorrentMetadata, TorrentClientError> {
        let future = {
            let in_flight = self.lock_in_flight()?;
            in_flight.get(info_hash).map(|entry| entry.future.clone())
        };

        match future {
            Some(future) => future.await,
            None => Err(TorrentClientError::TorrentNotFound(info_hash.to_hex())),
        }
    }

    async fn drop_torrent(&self, info_hash: &InfoHash) -> Result<(), TorrentClientError> {
        let removed = self.lock_in_flight()?.remove(info_hash);
        if let Some(entry) = removed {
            entry.abort.abort();
            self.release(info_hash).await;
            debug!(info_hash = %info_hash, "Dropped metadata handle");
        }
        Ok(())
    }
}
