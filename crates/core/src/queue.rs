//! Bounded queue carrying info-hashes from intake to the resolver workers.
//!
//! Producers are the DHT engine's threads, consumers are the resolver pool
//! workers. What happens when the queue is full is an explicit policy.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

use crate::info_hash::InfoHash;

/// Behaviour of a push when the queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueFullPolicy {
    /// Wait for room. Slow resolution throttles intake.
    #[default]
    Block,
    /// Discard the hash. The cache window still allows a later retry.
    Drop,
}

/// Result of pushing a hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushResult {
    Queued,
    /// Queue full under [`QueueFullPolicy::Drop`].
    Dropped,
    /// All receivers are gone.
    Closed,
}

/// Create a queue holding at most `capacity` pending hashes.
pub fn resolve_queue(capacity: usize, policy: QueueFullPolicy) -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        QueueSender { tx, policy },
        QueueReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Producer side. Cheap to clone.
#[derive(Debug, Clone)]
pub struct QueueSender {
    tx: mpsc::Sender<InfoHash>,
    policy: QueueFullPolicy,
}

impl QueueSender {
    pub fn policy(&self) -> QueueFullPolicy {
        self.policy
    }

    /// Push from a synchronous thread.
    ///
    /// Under the block policy this parks the calling thread until there is
    /// room, so it must not be called from inside the async runtime.
    pub fn push(&self, info_hash: InfoHash) -> PushResult {
        match self.policy {
            QueueFullPolicy::Block => match self.tx.blocking_send(info_hash) {
                Ok(()) => PushResult::Queued,
                Err(_) => PushResult::Closed,
            },
            QueueFullPolicy::Drop => self.try_push(info_hash),
        }
    }

    /// Push from async code.
    pub async fn push_async(&self, info_hash: InfoHash) -> PushResult {
        match self.policy {
            QueueFullPolicy::Block => match self.tx.send(info_hash).await {
                Ok(()) => PushResult::Queued,
                Err(_) => PushResult::Closed,
            },
            QueueFullPolicy::Drop => self.try_push(info_hash),
        }
    }

    fn try_push(&self, info_hash: InfoHash) -> PushResult {
        match self.tx.try_send(info_hash) {
            Ok(()) => PushResult::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => PushResult::Dropped,
            Err(mpsc::error::TrySendError::Closed(_)) => PushResult::Closed,
        }
    }

    /// Hashes currently waiting.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// Consumer side, shared by all workers.
#[derive(Debug, Clone)]
pub struct QueueReceiver {
    rx: Arc<Mutex<mpsc::Receiver<InfoHash>>>,
}

impl QueueReceiver {
    /// Wait for the next hash. `None` once every sender is gone and the
    /// queue is drained.
    pub async fn recv(&self) -> Option<InfoHash> {
        self.rx.lock().await.recv().await
    }

    /// Take a hash if one is ready and no worker is currently waiting.
    pub fn try_recv(&self) -> Option<InfoHash> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }
}
