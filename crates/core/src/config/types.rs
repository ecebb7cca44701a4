use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use crate::queue::QueueFullPolicy;
use crate::storage::StorageBackend;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub torrent_client: TorrentClientConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("det.db")
}

/// Intake and resolver pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrawlerConfig {
    /// Capacity of the queue between intake and the resolvers.
    #[serde(default = "default_hash_queue_length")]
    pub hash_queue_length: usize,
    /// Number of concurrent resolver workers.
    #[serde(default = "default_num_resolvers")]
    pub num_resolvers: usize,
    /// Upper bound on one metadata fetch.
    #[serde(default = "default_resolve_timeout_secs")]
    pub resolve_timeout_secs: u64,
    /// How long a hash is suppressed after being enqueued.
    #[serde(default = "default_resolve_window_secs")]
    pub resolve_window_secs: u64,
    /// What intake does when the queue is full.
    #[serde(default)]
    pub queue_full_policy: QueueFullPolicy,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            hash_queue_length: default_hash_queue_length(),
            num_resolvers: default_num_resolvers(),
            resolve_timeout_secs: default_resolve_timeout_secs(),
            resolve_window_secs: default_resolve_window_secs(),
            queue_full_policy: QueueFullPolicy::default(),
        }
    }
}

impl CrawlerConfig {
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    pub fn resolve_window(&self) -> Duration {
        Duration::from_secs(self.resolve_window_secs)
    }
}

fn default_hash_queue_length() -> usize {
    500
}

fn default_num_resolvers() -> usize {
    5
}

fn default_resolve_timeout_secs() -> u64 {
    30
}

fn default_resolve_window_secs() -> u64 {
    600
}

/// Embedded torrent client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TorrentClientConfig {
    /// Session working directory. Nothing is downloaded into it.
    #[serde(default = "default_download_path")]
    pub download_path: String,
    /// Fixed TCP listen port. Picked by the client when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<u16>,
    #[serde(default = "default_true")]
    pub enable_dht: bool,
    #[serde(default = "default_true")]
    pub enable_upnp: bool,
    /// Storage handed to each added torrent.
    #[serde(default)]
    pub storage: StorageBackend,
}

impl Default for TorrentClientConfig {
    fn default() -> Self {
        Self {
            download_path: default_download_path(),
            listen_port: None,
            enable_dht: true,
            enable_upnp: true,
            storage: StorageBackend::default(),
        }
    }
}

fn default_download_path() -> String {
    "./downloads".to_string()
}

fn default_true() -> bool {
    true
}

/// Status server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Serve the status API while listening.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8888
}
