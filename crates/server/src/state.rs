use std::sync::Arc;

use detergent_core::{PoolStatus, QueryService, QueueSender, ResolveCache, ResolverPool};

/// Shared application state
pub struct AppState {
    query: QueryService,
    pool: Option<Arc<ResolverPool>>,
    queue: Option<QueueSender>,
    cache: Option<Arc<ResolveCache>>,
}

impl AppState {
    pub fn new(query: QueryService) -> Self {
        Self {
            query,
            pool: None,
            queue: None,
            cache: None,
        }
    }

    /// Attach the running crawler so status endpoints can report on it.
    pub fn with_crawler(
        mut self,
        pool: Arc<ResolverPool>,
        queue: QueueSender,
        cache: Arc<ResolveCache>,
    ) -> Self {
        self.pool = Some(pool);
        self.queue = Some(queue);
        self.cache = Some(cache);
        self
    }

    pub fn query(&self) -> &QueryService {
        &self.query
    }

    pub fn pool_status(&self) -> Option<PoolStatus> {
        self.pool.as_ref().map(|pool| pool.status())
    }

    pub fn queue_pending(&self) -> Option<usize> {
        self.queue.as_ref().map(|queue| queue.pending())
    }

    pub fn cache_entries(&self) -> Option<usize> {
        self.cache.as_ref().map(|cache| cache.len())
    }
}
