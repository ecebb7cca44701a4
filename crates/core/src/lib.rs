pub mod cache;
pub mod catalog;
pub mod config;
pub mod events;
pub mod info_hash;
pub mod intake;
pub mod metrics;
pub mod query;
pub mod queue;
pub mod resolver;
pub mod storage;
pub mod testing;
pub mod torrent_client;

pub use cache::{ResolveCache, DEFAULT_RESOLVE_WINDOW};
pub use catalog::{
    CatalogError, CatalogStats, FileInfo, ResolutionRecord, SqliteCatalog, TimelineBucket,
    Torrent, TorrentCatalog,
};
pub use config::{
    load_config, load_config_from_str, load_config_or_default, validate_config, Config,
    ConfigError, CrawlerConfig, DatabaseConfig, ServerConfig, TorrentClientConfig,
};
pub use events::{read_events, DhtEvent, DhtEventHandler, EventError, EventStats, KrpcQuery};
pub use info_hash::{InfoHash, InfoHashError};
pub use intake::{EventKind, Intake, IntakeOutcome};
pub use query::{QueryError, QueryService, TorrentDetail};
pub use queue::{resolve_queue, PushResult, QueueFullPolicy, QueueReceiver, QueueSender};
pub use resolver::{PoolStatus, ResolveError, ResolveOutcome, Resolver, ResolverPool};
pub use storage::{
    PieceCompletion, SqlitePieceCompletion, StorageBackend, StorageError, ZeroContentStorage,
    ZeroContentStorageFactory,
};
pub use torrent_client::{
    AddOutcome, FileEntry, LibrqbitMetadataClient, MetadataClient, TorrentClientError,
    TorrentMetadata,
};
