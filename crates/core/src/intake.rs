//! Intake - turns DHT events into catalog rows and resolution work.
//!
//! Runs on threads owned by the DHT engine. It never fails back into the
//! engine: bad hashes and store errors are logged and the event is dropped
//! or partially applied.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::cache::ResolveCache;
use crate::catalog::TorrentCatalog;
use crate::events::{DhtEventHandler, KrpcQuery};
use crate::info_hash::{InfoHash, INFO_HASH_HEX_LEN, INFO_HASH_LEN};
use crate::metrics;
use crate::queue::{PushResult, QueueSender};

/// Kind of DHT event reaching intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Someone asked about the hash (`get_peers`).
    Query,
    /// Someone announced they have the hash.
    Announce,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Query => "query",
            EventKind::Announce => "announce",
        }
    }
}

/// What intake did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// The hash failed the length check.
    Rejected,
    /// Pushed onto the resolve queue.
    Enqueued,
    /// Seen within the cache window; not enqueued.
    Suppressed,
    /// Queue full under the drop policy.
    Dropped,
    /// Resolver side has shut down.
    QueueClosed,
}

impl IntakeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntakeOutcome::Rejected => "rejected",
            IntakeOutcome::Enqueued => "enqueued",
            IntakeOutcome::Suppressed => "suppressed",
            IntakeOutcome::Dropped => "dropped",
            IntakeOutcome::QueueClosed => "closed",
        }
    }
}

/// Handler for DHT engine callbacks.
pub struct Intake {
    catalog: Arc<dyn TorrentCatalog>,
    cache: Arc<ResolveCache>,
    queue: QueueSender,
    window: Duration,
    // Serializes create/check/mark/push so two near-simultaneous events for
    // one hash cannot both pass the cache check.
    lock: Mutex<()>,
}

impl Intake {
    pub fn new(
        catalog: Arc<dyn TorrentCatalog>,
        cache: Arc<ResolveCache>,
        queue: QueueSender,
    ) -> Self {
        let window = cache.window();
        Self {
            catalog,
            cache,
            queue,
            window,
            lock: Mutex::new(()),
        }
    }

    /// Override the suppression window used when marking hashes seen.
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Process one event.
    ///
    /// `info_hash` is either the raw 20 bytes or 40 hex characters.
    /// `peer_id` identifies the announcing peer and is only used for
    /// announce events. May block on a full queue under the block policy.
    pub fn handle_event(&self, kind: EventKind, info_hash: &[u8], peer_id: &str) -> IntakeOutcome {
        let Some(hash) = parse_event_hash(info_hash) else {
            debug!(
                kind = kind.as_str(),
                len = info_hash.len(),
                "Rejecting malformed info hash"
            );
            return self.finish(kind, IntakeOutcome::Rejected);
        };

        let _guard = match self.lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Err(e) = self.catalog.create_torrent(&hash) {
            warn!(info_hash = %hash, error = %e, "Failed to create torrent");
        }

        if kind == EventKind::Announce {
            if let Err(e) = self.catalog.create_announce(&hash, peer_id) {
                warn!(info_hash = %hash, peer = peer_id, error = %e, "Failed to record announce");
            }
        }

        if !self.cache.should_enqueue(&hash) {
            trace!(info_hash = %hash, "Hash seen recently, not enqueueing");
            return self.finish(kind, IntakeOutcome::Suppressed);
        }

        self.cache.mark_seen(&hash, self.window);

        let outcome = match self.queue.push(hash) {
            PushResult::Queued => {
                debug!(info_hash = %hash, kind = kind.as_str(), "Enqueued for resolution");
                IntakeOutcome::Enqueued
            }
            PushResult::Dropped => {
                metrics::QUEUE_DROPPED.inc();
                debug!(info_hash = %hash, "Resolve queue full, dropping hash");
                IntakeOutcome::Dropped
            }
            PushResult::Closed => {
                warn!(info_hash = %hash, "Resolve queue closed");
                IntakeOutcome::QueueClosed
            }
        };

        self.finish(kind, outcome)
    }

    fn finish(&self, kind: EventKind, outcome: IntakeOutcome) -> IntakeOutcome {
        metrics::INTAKE_EVENTS
            .with_label_values(&[kind.as_str(), outcome.as_str()])
            .inc();
        outcome
    }
}

impl DhtEventHandler for Intake {
    fn on_query(&self, query: &KrpcQuery, source: SocketAddr) -> bool {
        // Announces are counted in on_announce_peer, which the engine calls after this.
        if !matches!(query.method.as_str(), "get_peers" | "announce_peer") {
            return true;
        }

        match &query.info_hash {
            Some(info_hash) => {
                let peer_id = hex::encode(&query.node_id);
                self.handle_event(EventKind::Query, info_hash, &peer_id);
            }
            None => {
                debug!(method = %query.method, source = %source, "Query without info hash");
            }
        }

        true
    }

    fn on_announce_peer(&self, info_hash: &[u8], peer: SocketAddr) {
        self.handle_event(EventKind::Announce, info_hash, &peer.to_string());
    }
}

fn parse_event_hash(bytes: &[u8]) -> Option<InfoHash> {
    match bytes.len() {
        INFO_HASH_LEN => InfoHash::from_bytes(bytes).ok(),
        INFO_HASH_HEX_LEN => std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| InfoHash::from_hex(s).ok()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;
    use crate::queue::{resolve_queue, QueueFullPolicy, QueueReceiver};
    use std::thread;

    struct Fixture {
        intake: Intake,
        catalog: Arc<SqliteCatalog>,
        rx: QueueReceiver,
    }

    fn fixture(window: Duration, capacity: usize, policy: QueueFullPolicy) -> Fixture {
        let catalog = Arc::new(SqliteCatalog::in_memory().unwrap());
        let cache = Arc::new(ResolveCache::new(window));
        let (tx, rx) = resolve_queue(capacity, policy);
        let intake = Intake::new(catalog.clone(), cache, tx);
        Fixture {
            intake,
            catalog,
            rx,
        }
    }

    fn drain(rx: &QueueReceiver) -> Vec<InfoHash> {
        std::iter::from_fn(|| rx.try_recv()).collect()
    }

    const H1: [u8; 20] = [0x11; 20];

    #[test]
    fn test_rejects_bad_length() {
        let f = fixture(Duration::from_secs(60), 8, QueueFullPolicy::Block);

        assert_eq!(
            f.intake.handle_event(EventKind::Announce, &[1u8; 19], "p1"),
            IntakeOutcome::Rejected
        );
        assert_eq!(
            f.intake.handle_event(EventKind::Query, b"not-hex-not-hex-not-hex-not-hex-not-hex!", "p1"),
            IntakeOutcome::Rejected
        );
        assert_eq!(f.catalog.stats().unwrap().total_torrents, 0);
        assert!(drain(&f.rx).is_empty());
    }

    #[test]
    fn test_accepts_hex_hash() {
        let f = fixture(Duration::from_secs(60), 8, QueueFullPolicy::Block);
        let hex = hex::encode(H1);

        assert_eq!(
            f.intake.handle_event(EventKind::Query, hex.as_bytes(), ""),
            IntakeOutcome::Enqueued
        );
        assert_eq!(drain(&f.rx), vec![InfoHash::from_bytes(&H1).unwrap()]);
    }

    #[test]
    fn test_announce_creates_rows_and_enqueues_once() {
        let f = fixture(Duration::from_secs(60), 8, QueueFullPolicy::Block);
        let hash = InfoHash::from_bytes(&H1).unwrap();

        assert_eq!(
            f.intake.handle_event(EventKind::Announce, &H1, "p1"),
            IntakeOutcome::Enqueued
        );
        let torrent = f.catalog.get_torrent(&hash).unwrap();
        assert_eq!(torrent.announce_count, 1);
        assert!(torrent.resolved_at.is_none());

        assert_eq!(
            f.intake.handle_event(EventKind::Announce, &H1, "p2"),
            IntakeOutcome::Suppressed
        );
        assert_eq!(f.catalog.get_torrent(&hash).unwrap().announce_count, 2);
        assert_eq!(f.catalog.stats().unwrap().total_announces, 2);

        assert_eq!(drain(&f.rx), vec![hash]);
    }

    #[test]
    fn test_query_creates_torrent_without_announce() {
        let f = fixture(Duration::from_secs(60), 8, QueueFullPolicy::Block);
        let hash = InfoHash::from_bytes(&H1).unwrap();

        f.intake.handle_event(EventKind::Query, &H1, "ignored");

        let torrent = f.catalog.get_torrent(&hash).unwrap();
        assert_eq!(torrent.announce_count, 0);
        assert_eq!(f.catalog.stats().unwrap().total_announces, 0);
    }

    #[test]
    fn test_reenqueues_after_window() {
        let f = fixture(Duration::from_millis(40), 8, QueueFullPolicy::Block);

        f.intake.handle_event(EventKind::Announce, &H1, "p1");
        thread::sleep(Duration::from_millis(70));
        assert_eq!(
            f.intake.handle_event(EventKind::Announce, &H1, "p1"),
            IntakeOutcome::Enqueued
        );

        assert_eq!(drain(&f.rx).len(), 2);
    }

    #[test]
    fn test_drop_policy_still_records_rows() {
        let f = fixture(Duration::from_secs(60), 1, QueueFullPolicy::Drop);

        assert_eq!(
            f.intake.handle_event(EventKind::Announce, &[1u8; 20], "p1"),
            IntakeOutcome::Enqueued
        );
        assert_eq!(
            f.intake.handle_event(EventKind::Announce, &[2u8; 20], "p1"),
            IntakeOutcome::Dropped
        );

        assert_eq!(f.catalog.stats().unwrap().total_torrents, 2);
        assert_eq!(drain(&f.rx).len(), 1);
    }

    #[test]
    fn test_concurrent_events_enqueue_once() {
        let f = fixture(Duration::from_secs(60), 64, QueueFullPolicy::Block);
        let intake = Arc::new(f.intake);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let intake = intake.clone();
                thread::spawn(move || {
                    intake.handle_event(EventKind::Announce, &H1, &format!("peer-{}", i))
                })
            })
            .collect();

        let enqueued = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| *o == IntakeOutcome::Enqueued)
            .count();

        assert_eq!(enqueued, 1);
        assert_eq!(drain(&f.rx).len(), 1);
        let hash = InfoHash::from_bytes(&H1).unwrap();
        assert_eq!(f.catalog.get_torrent(&hash).unwrap().announce_count, 8);
    }

    #[test]
    fn test_on_query_dispatch() {
        let f = fixture(Duration::from_secs(60), 8, QueueFullPolicy::Block);
        let source: SocketAddr = "10.0.0.1:6881".parse().unwrap();
        let hash = InfoHash::from_bytes(&H1).unwrap();

        let ping = KrpcQuery {
            method: "ping".to_string(),
            info_hash: None,
            node_id: vec![0xaa; 20],
        };
        assert!(f.intake.on_query(&ping, source));
        assert_eq!(f.catalog.stats().unwrap().total_torrents, 0);

        let announce = KrpcQuery {
            method: "announce_peer".to_string(),
            info_hash: Some(H1.to_vec()),
            node_id: vec![0xaa; 20],
        };
        assert!(f.intake.on_query(&announce, source));
        assert_eq!(f.catalog.get_torrent(&hash).unwrap().announce_count, 0);
        assert_eq!(drain(&f.rx), vec![hash]);
    }

    #[test]
    fn test_announce_query_then_callback_counts_once() {
        let f = fixture(Duration::from_secs(60), 8, QueueFullPolicy::Block);
        let hash = InfoHash::from_bytes(&H1).unwrap();
        let peers: [SocketAddr; 2] = [
            "10.0.0.1:6881".parse().unwrap(),
            "10.0.0.2:6881".parse().unwrap(),
        ];

        for (i, peer) in peers.iter().enumerate() {
            let announce = KrpcQuery {
                method: "announce_peer".to_string(),
                info_hash: Some(H1.to_vec()),
                node_id: vec![i as u8; 20],
            };
            assert!(f.intake.on_query(&announce, *peer));
            f.intake.on_announce_peer(&H1, *peer);
        }

        assert_eq!(f.catalog.get_torrent(&hash).unwrap().announce_count, 2);
        assert_eq!(f.catalog.stats().unwrap().total_announces, 2);
        assert_eq!(drain(&f.rx), vec![hash]);
    }
}
