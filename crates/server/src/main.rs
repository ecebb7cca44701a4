mod api;
mod listen;
mod metrics;
mod output;
mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use detergent_core::{
    load_config_or_default, validate_config, Config, InfoHash, LibrqbitMetadataClient,
    QueryService, Resolver, SqliteCatalog, SqlitePieceCompletion,
};

/// Exit status when a one-shot resolve runs out of time.
const EXIT_TIMEOUT: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "det", version, about = "BitTorrent DHT crawler and torrent index")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "DET_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Index info-hashes from DHT traffic and resolve their metadata
    Listen {
        /// JSON-lines DHT event stream, `-` for stdin
        #[arg(long, default_value = "-")]
        events: String,
    },
    /// Fetch metadata for one info-hash or magnet link
    Resolve {
        hash: String,
        /// Seconds to wait for metadata
        #[arg(long, default_value_t = 120)]
        timeout: u64,
    },
    /// Full-text search over resolved torrent names
    Search {
        #[arg(required = true)]
        term: Vec<String>,
        #[arg(long, default_value_t = 25)]
        limit: u32,
    },
    /// Most announced torrents
    Popular {
        #[arg(long, default_value_t = 25)]
        limit: u32,
    },
    /// Most announced torrents per day
    Timeline {
        #[arg(long, default_value_t = 7)]
        days: u32,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Catalog counters
    Info,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("Fatal error: {:#}", e);
            1
        }
    };

    // Exit without waiting on a blocking event reader still parked on stdin.
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let default_filter = if cli.verbose {
        "debug,librqbit=info"
    } else {
        "info,librqbit=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config_or_default(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("Failed to load config from {:?}", path),
        None => "Failed to load config from environment".to_string(),
    })?;
    validate_config(&config).context("Configuration validation failed")?;

    match cli.command {
        Command::Listen { events } => listen::run(config, &events).await.map(|()| 0),
        Command::Resolve { hash, timeout } => {
            resolve(config, &hash, Duration::from_secs(timeout)).await
        }
        Command::Search { term, limit } => {
            let torrents = open_query(&config)?.search(&term.join(" "), limit)?;
            print!("{}", output::torrent_list(&torrents));
            Ok(0)
        }
        Command::Popular { limit } => {
            let torrents = open_query(&config)?.popular(limit)?;
            print!("{}", output::torrent_list(&torrents));
            Ok(0)
        }
        Command::Timeline { days, limit } => {
            let buckets = open_query(&config)?.timeline(days, limit)?;
            print!("{}", output::timeline(&buckets));
            Ok(0)
        }
        Command::Info => {
            let stats = open_query(&config)?.stats()?;
            print!("{}", output::stats(&stats));
            Ok(0)
        }
    }
}

fn open_catalog(config: &Config) -> Result<Arc<SqliteCatalog>> {
    let catalog = SqliteCatalog::new(&config.database.path).with_context(|| {
        format!("Failed to open catalog at {:?}", config.database.path)
    })?;
    Ok(Arc::new(catalog))
}

fn open_query(config: &Config) -> Result<QueryService> {
    Ok(QueryService::new(open_catalog(config)?))
}

/// Start the torrent client, with a completion store if the storage backend needs one.
async fn open_client(config: &Config) -> Result<Arc<LibrqbitMetadataClient>> {
    let mut client = LibrqbitMetadataClient::new(&config.torrent_client)
        .await
        .context("Failed to start torrent client")?;

    let storage = config.torrent_client.storage;
    if storage.needs_completion() {
        let completion = SqlitePieceCompletion::new(&config.database.path).with_context(|| {
            format!("Failed to open piece completion at {:?}", config.database.path)
        })?;
        client = client.with_completion(Arc::new(completion));
    }
    info!(storage = ?storage, "Torrent client started");

    Ok(Arc::new(client))
}

async fn resolve(config: Config, input: &str, timeout: Duration) -> Result<i32> {
    let info_hash = InfoHash::parse_user_input(input)
        .with_context(|| format!("Not an info-hash or magnet link: {}", input))?;

    let catalog = open_catalog(&config)?;
    let client = open_client(&config).await?;
    let resolver =
        Resolver::new(catalog, client.clone(), timeout).with_storage(config.torrent_client.storage);

    info!(info_hash = %info_hash, timeout_secs = timeout.as_secs(), "Resolving");
    let result = resolver.fetch(&info_hash, timeout).await;
    client.shutdown().await;

    match result.context("Resolve failed")? {
        Some(metadata) => {
            print!("{}", output::metadata(&metadata));
            Ok(0)
        }
        None => {
            println!("Resolve timeout");
            Ok(EXIT_TIMEOUT)
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
