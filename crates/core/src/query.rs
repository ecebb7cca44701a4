//! Read-only access to the catalog for the CLI and the status server.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{CatalogError, CatalogStats, FileInfo, TimelineBucket, Torrent, TorrentCatalog};
use crate::info_hash::{InfoHash, InfoHashError};

/// Largest `limit` accepted by any listing.
pub const MAX_LIMIT: u32 = 1000;

/// Largest number of timeline days.
pub const MAX_DAYS: u32 = 365;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid info-hash: {0}")]
    InvalidHash(#[from] InfoHashError),

    #[error("torrent not found: {0}")]
    NotFound(String),

    #[error("catalog error: {0}")]
    Catalog(CatalogError),
}

impl From<CatalogError> for QueryError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::NotFound(hash) => QueryError::NotFound(hash),
            CatalogError::InvalidQuery(msg) => QueryError::InvalidArgument(msg),
            other => QueryError::Catalog(other),
        }
    }
}

/// A torrent together with its file list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentDetail {
    #[serde(flatten)]
    pub torrent: Torrent,
    pub files: Vec<FileInfo>,
}

/// Stateless read layer over a [`TorrentCatalog`].
#[derive(Clone)]
pub struct QueryService {
    catalog: Arc<dyn TorrentCatalog>,
}

impl QueryService {
    pub fn new(catalog: Arc<dyn TorrentCatalog>) -> Self {
        Self { catalog }
    }

    pub fn popular(&self, limit: u32) -> Result<Vec<Torrent>, QueryError> {
        check_limit(limit)?;
        Ok(self.catalog.popular_torrents(limit)?)
    }

    pub fn timeline(&self, days: u32, limit: u32) -> Result<Vec<TimelineBucket>, QueryError> {
        check_limit(limit)?;
        if days == 0 || days > MAX_DAYS {
            return Err(QueryError::InvalidArgument(format!(
                "days must be between 1 and {}",
                MAX_DAYS
            )));
        }
        Ok(self.catalog.timeline_torrents(days, limit)?)
    }

    pub fn search(&self, term: &str, limit: u32) -> Result<Vec<Torrent>, QueryError> {
        check_limit(limit)?;
        if term.trim().is_empty() {
            return Err(QueryError::InvalidArgument(
                "search term cannot be empty".to_string(),
            ));
        }
        Ok(self.catalog.search_torrents(term, limit)?)
    }

    /// Look up one torrent by hex hash or magnet URI.
    pub fn torrent(&self, hash: &str) -> Result<TorrentDetail, QueryError> {
        let info_hash = InfoHash::parse_user_input(hash)?;
        let torrent = self.catalog.get_torrent(&info_hash)?;
        let files = self.catalog.get_files(&info_hash)?;
        Ok(TorrentDetail { torrent, files })
    }

    pub fn stats(&self) -> Result<CatalogStats, QueryError> {
        Ok(self.catalog.stats()?)
    }
}

fn check_limit(limit: u32) -> Result<(), QueryError> {
    if limit == 0 || limit > MAX_LIMIT {
        return Err(QueryError::InvalidArgument(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;
    use crate::testing::fixtures;

    fn service() -> (QueryService, Arc<SqliteCatalog>) {
        let catalog = Arc::new(SqliteCatalog::in_memory().unwrap());
        (QueryService::new(catalog.clone()), catalog)
    }

    #[test]
    fn test_limit_bounds() {
        let (service, _) = service();
        assert!(matches!(
            service.popular(0),
            Err(QueryError::InvalidArgument(_))
        ));
        assert!(service.popular(MAX_LIMIT + 1).is_err());
        assert!(service.popular(MAX_LIMIT).unwrap().is_empty());
    }

    #[test]
    fn test_timeline_days_bounds() {
        let (service, _) = service();
        assert!(service.timeline(0, 10).is_err());
        assert!(service.timeline(MAX_DAYS + 1, 10).is_err());
        assert_eq!(service.timeline(3, 10).unwrap().len(), 3);
    }

    #[test]
    fn test_search_rejects_blank_term() {
        let (service, _) = service();
        assert!(matches!(
            service.search("   ", 10),
            Err(QueryError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let (service, catalog) = service();
        let hash = fixtures::info_hash(1);
        catalog
            .record_resolution(&fixtures::metadata(hash, "Ubuntu ISO", 10))
            .unwrap();

        let found = service.search("UBUNTU", 10).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].info_hash, hash);
    }

    #[test]
    fn test_torrent_detail_by_hex_and_magnet() {
        let (service, catalog) = service();
        let hash = fixtures::info_hash(0xab);
        catalog
            .record_resolution(&fixtures::multi_file_metadata(
                hash,
                "Pack",
                &[("a.txt", 1), ("b.txt", 2)],
            ))
            .unwrap();

        let detail = service.torrent(&hash.to_hex().to_uppercase()).unwrap();
        assert_eq!(detail.torrent.name.as_deref(), Some("Pack"));
        assert_eq!(detail.files.len(), 2);

        let detail = service.torrent(&hash.magnet_uri()).unwrap();
        assert_eq!(detail.torrent.info_hash, hash);
    }

    #[test]
    fn test_torrent_not_found_and_bad_hash() {
        let (service, _) = service();
        assert!(matches!(
            service.torrent(&fixtures::info_hash(9).to_hex()),
            Err(QueryError::NotFound(_))
        ));
        assert!(matches!(
            service.torrent("not-a-hash"),
            Err(QueryError::InvalidHash(_))
        ));
    }

    #[test]
    fn test_stats() {
        let (service, catalog) = service();
        catalog.create_announce(&fixtures::info_hash(1), "peer").unwrap();
        let stats = service.stats().unwrap();
        assert_eq!(stats.total_torrents, 1);
        assert_eq!(stats.total_announces, 1);
    }
}
