//! The `listen` command: intake, resolver pool and status server.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use detergent_core::{
    read_events, resolve_queue, Config, Intake, QueryService, ResolveCache, Resolver,
    ResolverPool,
};

use crate::api::create_router;
use crate::state::AppState;

/// How often expired entries are swept from the resolve cache.
const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub async fn run(config: Config, events: &str) -> Result<()> {
    let input = open_events(events)?;

    let catalog = crate::open_catalog(&config)?;
    info!("Catalog opened at {:?}", config.database.path);

    let client = crate::open_client(&config).await?;

    let crawler = &config.crawler;
    let cache = Arc::new(ResolveCache::new(crawler.resolve_window()));
    let (sender, receiver) = resolve_queue(crawler.hash_queue_length, crawler.queue_full_policy);

    let resolver = Arc::new(
        Resolver::new(catalog.clone(), client.clone(), crawler.resolve_timeout())
            .with_storage(config.torrent_client.storage),
    );
    let pool = Arc::new(ResolverPool::new(resolver, receiver, crawler.num_resolvers));
    pool.start().await;

    let intake = Arc::new(Intake::new(catalog.clone(), cache.clone(), sender.clone()));
    info!(
        queue = crawler.hash_queue_length,
        policy = ?crawler.queue_full_policy,
        window_secs = crawler.resolve_window_secs,
        "Intake ready"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    spawn_cache_sweeper(cache.clone(), shutdown_tx.subscribe());

    // The reader blocks its thread, like an engine callback would.
    let reader = tokio::task::spawn_blocking(move || read_events(input, intake.as_ref()));
    tokio::spawn(async move {
        match reader.await {
            Ok(Ok(stats)) => info!(
                dispatched = stats.dispatched,
                malformed = stats.malformed,
                "DHT event stream ended"
            ),
            Ok(Err(e)) => error!("DHT event stream failed: {}", e),
            Err(e) => error!("DHT event reader panicked: {}", e),
        }
    });

    let state = Arc::new(
        AppState::new(QueryService::new(catalog)).with_crawler(pool.clone(), sender, cache),
    );

    if config.server.enabled {
        let addr = SocketAddr::new(config.server.host, config.server.port);
        info!("Starting status server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;

        axum::serve(listener, create_router(state))
            .with_graceful_shutdown(crate::shutdown_signal())
            .await
            .context("Server error")?;
    } else {
        info!("Status server disabled");
        crate::shutdown_signal().await;
    }

    info!("Shutting down...");
    let _ = shutdown_tx.send(());

    pool.stop().await;
    client.shutdown().await;
    info!("Torrent client stopped");

    Ok(())
}

fn open_events(events: &str) -> Result<Box<dyn BufRead + Send>> {
    if events == "-" {
        info!("Reading DHT events from stdin");
        return Ok(Box::new(BufReader::new(io::stdin())));
    }

    let file = File::open(events).with_context(|| format!("Failed to open {}", events))?;
    info!("Reading DHT events from {}", events);
    Ok(Box::new(BufReader::new(file)))
}

fn spawn_cache_sweeper(cache: Arc<ResolveCache>, mut shutdown_rx: broadcast::Receiver<()>) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(CACHE_SWEEP_INTERVAL) => {
                    let purged = cache.purge_expired();
                    if purged > 0 {
                        debug!(purged, remaining = cache.len(), "Swept resolve cache");
                    }
                }
            }
        }
    });
}
