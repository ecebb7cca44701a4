//! Types for the resolver pool.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::torrent_client::TorrentClientError;

/// Errors that can occur while resolving one hash.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("torrent client error: {0}")]
    TorrentClient(#[from] TorrentClientError),
}

/// Terminal outcome of one resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Metadata was fetched and written to the catalog.
    Resolved,
    /// The catalog row was already resolved; nothing was fetched.
    AlreadyResolved,
    /// Another owner holds a live fetch for this hash.
    InFlight,
    /// Metadata did not arrive within the timeout. The row stays unresolved.
    TimedOut,
    /// The client or the catalog failed.
    Failed(String),
}

impl ResolveOutcome {
    /// Metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolveOutcome::Resolved => "resolved",
            ResolveOutcome::AlreadyResolved => "already_resolved",
            ResolveOutcome::InFlight => "in_flight",
            ResolveOutcome::TimedOut => "timeout",
            ResolveOutcome::Failed(_) => "failed",
        }
    }
}

/// Counters and state of a resolver pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub running: bool,
    pub workers: usize,
    pub resolved: u64,
    pub already_resolved: u64,
    pub in_flight: u64,
    pub timed_out: u64,
    pub failed: u64,
}
