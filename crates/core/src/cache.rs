//! Dedup / rate-limit cache for resolution work.
//!
//! A hash marked seen is suppressed until its window expires, after which it
//! may be enqueued again. Only the intake path mutates the cache.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::info_hash::InfoHash;

/// Default suppression window.
pub const DEFAULT_RESOLVE_WINDOW: Duration = Duration::from_secs(600);

/// TTL map from info-hash to the instant its suppression ends.
#[derive(Debug)]
pub struct ResolveCache {
    window: Duration,
    entries: Mutex<HashMap<InfoHash, Instant>>,
}

impl Default for ResolveCache {
    fn default() -> Self {
        Self::new(DEFAULT_RESOLVE_WINDOW)
    }
}

impl ResolveCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The window applied by [`ResolveCache::mark_seen_default`].
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether the hash may be enqueued now.
    pub fn should_enqueue(&self, info_hash: &InfoHash) -> bool {
        let entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        match entries.get(info_hash) {
            Some(expires_at) => Instant::now() >= *expires_at,
            None => true,
        }
    }

    /// Suppress the hash for `window` from now.
    pub fn mark_seen(&self, info_hash: &InfoHash, window: Duration) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.insert(*info_hash, Instant::now() + window);
    }

    /// Suppress the hash for the cache's configured window.
    pub fn mark_seen_default(&self, info_hash: &InfoHash) {
        self.mark_seen(info_hash, self.window);
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        before - entries.len()
    }

    /// Number of tracked hashes, expired or not.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
