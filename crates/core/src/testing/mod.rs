//! Testing utilities and mock implementations.
//!
//! Lets the resolver pool and the full intake-to-catalog path run in tests
//! without a live swarm.
//!
//! # Example
//!
//! ```rust,ignore
//! use detergent_core::testing::{fixtures, MockMetadataClient};
//!
//! let client = MockMetadataClient::new();
//! client.set_metadata(fixtures::metadata(hash, "example.iso", 734003200)).await;
//!
//! // Hand Arc::new(client) to a Resolver...
//! ```

mod mock_metadata_client;

pub use mock_metadata_client::{MockMetadataClient, RecordedAdd};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::info_hash::InfoHash;
    use crate::torrent_client::{FileEntry, TorrentMetadata};

    /// An info-hash made of one repeated byte.
    pub fn info_hash(byte: u8) -> InfoHash {
        InfoHash::new([byte; 20])
    }

    /// Single-file torrent metadata.
    pub fn metadata(info_hash: InfoHash, name: &str, length: u64) -> TorrentMetadata {
        TorrentMetadata {
            info_hash,
            name: Some(name.to_string()),
            length,
            files: Vec::new(),
        }
    }

    /// Multi-file torrent metadata with files `name/<file>`.
    pub fn multi_file_metadata(
        info_hash: InfoHash,
        name: &str,
        files: &[(&str, u64)],
    ) -> TorrentMetadata {
        let files: Vec<FileEntry> = files
            .iter()
            .map(|(path, length)| FileEntry {
                path: format!("{}/{}", name, path),
                length: *length,
            })
            .collect();
        TorrentMetadata {
            info_hash,
            name: Some(name.to_string()),
            length: files.iter().map(|f| f.length).sum(),
            files,
        }
    }
}
