//! Fixed-size pool of resolver workers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::resolve::Resolver;
use super::types::{PoolStatus, ResolveOutcome};
use crate::queue::QueueReceiver;

#[derive(Debug, Default)]
struct PoolCounters {
    resolved: AtomicU64,
    already_resolved: AtomicU64,
    in_flight: AtomicU64,
    timed_out: AtomicU64,
    failed: AtomicU64,
}

impl PoolCounters {
    fn record(&self, outcome: &ResolveOutcome) {
        let counter = match outcome {
            ResolveOutcome::Resolved => &self.resolved,
            ResolveOutcome::AlreadyResolved => &self.already_resolved,
            ResolveOutcome::InFlight => &self.in_flight,
            ResolveOutcome::TimedOut => &self.timed_out,
            ResolveOutcome::Failed(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// N workers pulling hashes from the intake queue.
///
/// Workers stop when `stop` is called or when every queue sender is gone.
/// A worker that is mid-resolution finishes that attempt first; attempts are
/// bounded by the resolver timeout.
pub struct ResolverPool {
    resolver: Arc<Resolver>,
    queue: QueueReceiver,
    workers: usize,

    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<PoolCounters>,
}

impl ResolverPool {
    pub fn new(resolver: Arc<Resolver>, queue: QueueReceiver, workers: usize) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            resolver,
            queue,
            workers,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
            counters: Arc::new(PoolCounters::default()),
        }
    }

    /// Spawn the workers.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Resolver pool already running");
            return;
        }

        info!(workers = self.workers, "Starting resolver pool");

        let mut handles = self.handles.lock().await;
        for id in 0..self.workers {
            handles.push(self.spawn_worker(id));
        }
    }

    /// Signal shutdown and wait for every worker to exit.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Resolver pool not running");
            return;
        }

        info!("Stopping resolver pool");

        let _ = self.shutdown_tx.send(());

        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Resolver worker panicked");
            }
        }

        info!("Resolver pool stopped");
    }

    /// Wait until all workers have exited on their own (queue closed).
    pub async fn join(&self) {
        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Resolver worker panicked");
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            running: self.running.load(Ordering::Relaxed),
            workers: self.workers,
            resolved: self.counters.resolved.load(Ordering::Relaxed),
            already_resolved: self.counters.already_resolved.load(Ordering::Relaxed),
            in_flight: self.counters.in_flight.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    fn spawn_worker(&self, id: usize) -> JoinHandle<()> {
        let resolver = Arc::clone(&self.resolver);
        let queue = self.queue.clone();
        let counters = Arc::clone(&self.counters);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            debug!(worker = id, "Resolver worker started");
            loop {
                let info_hash = tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        debug!(worker = id, "Resolver worker received shutdown signal");
                        break;
                    }
                    next = queue.recv() => match next {
                        Some(info_hash) => info_hash,
                        None => {
                            debug!(worker = id, "Resolve queue closed");
                            break;
                        }
                    },
                };

                let outcome = resolver.resolve_one(info_hash).await;
                counters.record(&outcome);
            }
            debug!(worker = id, "Resolver worker stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{SqliteCatalog, TorrentCatalog};
    use crate::queue::{resolve_queue, QueueFullPolicy};
    use crate::testing::{fixtures, MockMetadataClient};
    use std::time::Duration;

    fn pool_with(
        workers: usize,
        timeout: Duration,
    ) -> (
        ResolverPool,
        crate::queue::QueueSender,
        Arc<SqliteCatalog>,
        Arc<MockMetadataClient>,
    ) {
        let catalog = Arc::new(SqliteCatalog::in_memory().unwrap());
        let client = Arc::new(MockMetadataClient::new());
        let resolver = Arc::new(Resolver::new(catalog.clone(), client.clone(), timeout));
        let (tx, rx) = resolve_queue(16, QueueFullPolicy::Block);
        (ResolverPool::new(resolver, rx, workers), tx, catalog, client)
    }

    #[tokio::test]
    async fn test_pool_resolves_queued_hashes() {
        let (pool, tx, catalog, client) = pool_with(3, Duration::from_secs(5));
        for n in 1..=4u8 {
            let hash = fixtures::info_hash(n);
            catalog.create_torrent(&hash).unwrap();
            client
                .set_metadata(fixtures::metadata(hash, &format!("torrent {}", n), n as u64))
                .await;
            tx.push_async(hash).await;
        }
        drop(tx);

        pool.start().await;
        pool.join().await;

        let status = pool.status();
        assert_eq!(status.resolved, 4);
        assert!(!status.running);
        assert_eq!(catalog.stats().unwrap().total_resolved, 4);
    }

    #[tokio::test]
    async fn test_worker_survives_failures() {
        let (pool, tx, catalog, client) = pool_with(1, Duration::from_millis(30));
        let slow = fixtures::info_hash(1);
        let good = fixtures::info_hash(2);
        client
            .set_metadata(fixtures::metadata(good, "good", 1))
            .await;

        tx.push_async(slow).await;
        tx.push_async(good).await;
        drop(tx);

        pool.start().await;
        pool.join().await;

        let status = pool.status();
        assert_eq!(status.timed_out, 1);
        assert_eq!(status.resolved, 1);
        assert!(catalog.get_torrent(&good).unwrap().is_resolved());
    }

    #[tokio::test]
    async fn test_concurrency_bounded_by_worker_count() {
        let (pool, tx, _catalog, client) = pool_with(2, Duration::from_secs(5));
        client.set_delay(Duration::from_millis(40)).await;
        for n in 1..=6u8 {
            let hash = fixtures::info_hash(n);
            client.set_metadata(fixtures::metadata(hash, "x", 1)).await;
            tx.push_async(hash).await;
        }
        drop(tx);

        pool.start().await;
        pool.join().await;

        assert_eq!(pool.status().resolved, 6);
        assert!(client.peak_concurrency() <= 2);
    }

    #[tokio::test]
    async fn test_stop_exits_idle_workers() {
        let (pool, _tx, _catalog, _client) = pool_with(4, Duration::from_secs(5));
        pool.start().await;
        assert!(pool.status().running);

        tokio::time::timeout(Duration::from_secs(2), pool.stop())
            .await
            .expect("idle workers should exit promptly");
        assert!(!pool.status().running);
    }

    #[tokio::test]
    async fn test_start_twice_does_not_double_workers() {
        let (pool, _tx, _catalog, _client) = pool_with(2, Duration::from_secs(5));
        pool.start().await;
        pool.start().await;
        assert_eq!(pool.handles.lock().await.len(), 2);
        pool.stop().await;
    }
}
