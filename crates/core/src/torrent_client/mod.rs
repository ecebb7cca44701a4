//! Torrent client abstraction.
//!
//! This module provides a `MetadataClient` trait for fetching a torrent's
//! info dictionary from the swarm without downloading content, and an
//! embedded librqbit implementation.

mod librqbit;
mod types;

pub use librqbit::LibrqbitMetadataClient;
pub use types::*;
