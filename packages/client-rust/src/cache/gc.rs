//! Periodic eviction of idle query cache entries.

use std::sync::Arc;

use async_trait::async_trait;
use backoffice_core::QueryKey;
use tracing::debug;

use super::QueryCache;
use crate::invalidation::InvalidationTarget;
use crate::worker::{BackgroundRunnable, BackgroundWorker};

/// On-demand work for the cache sweeper.
#[derive(Debug)]
pub enum CacheTask {
    /// Run a sweep now instead of waiting for the next tick.
    Sweep,
    /// Mark every entry under the prefix stale.
    Invalidate(QueryKey),
}

/// Runs [`QueryCache::gc`] on every tick.
pub struct CacheSweeper<V> {
    cache: Arc<QueryCache<V>>,
    evicted: usize,
}

impl<V: Send + Sync + 'static> CacheSweeper<V> {
    #[must_use]
    pub fn new(cache: Arc<QueryCache<V>>) -> Self {
        Self { cache, evicted: 0 }
    }

    /// Starts a worker that sweeps `cache` every `interval`.
    #[must_use]
    pub fn spawn(cache: Arc<QueryCache<V>>, interval: std::time::Duration) -> BackgroundWorker<Self> {
        BackgroundWorker::start(Self::new(cache), interval)
    }

    fn sweep(&mut self) {
        self.evicted += self.cache.gc();
    }
}

#[async_trait]
impl<V: Send + Sync + 'static> BackgroundRunnable for CacheSweeper<V> {
    type Task = CacheTask;

    async fn run(&mut self, task: CacheTask) {
        match task {
            CacheTask::Sweep => self.sweep(),
            CacheTask::Invalidate(prefix) => {
                self.cache.invalidate(&prefix);
            }
        }
    }

    async fn on_tick(&mut self) {
        self.sweep();
    }

    async fn shutdown(&mut self) {
        debug!(evicted = self.evicted, "cache sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use backoffice_core::ManualClock;

    use super::*;
    use crate::config::CacheConfig;

    #[tokio::test]
    async fn sweep_task_evicts_idle_entries() {
        let clock = Arc::new(ManualClock::new(0));
        let config = CacheConfig {
            gc_time: Duration::from_millis(100),
            ..CacheConfig::default()
        };
        let cache = Arc::new(QueryCache::<u32>::with_clock(&config, clock.clone()));
        cache
            .fetch(&QueryKey::new("users"), || async { Ok(1) })
            .await
            .unwrap();

        let mut worker = CacheSweeper::spawn(Arc::clone(&cache), Duration::from_secs(60));
        clock.advance(150);
        worker.submit(CacheTask::Sweep).await.unwrap();
        worker.stop().await;

        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn invalidate_task_marks_entries() {
        let cache = Arc::new(QueryCache::<u32>::new(&CacheConfig::default()));
        let key = QueryKey::new("deposits").with("list");
        cache.fetch(&key, || async { Ok(7) }).await.unwrap();

        let mut worker = CacheSweeper::spawn(Arc::clone(&cache), Duration::from_secs(60));
        worker
            .submit(CacheTask::Invalidate(QueryKey::new("deposits")))
            .await
            .unwrap();
        worker.stop().await;

        assert!(cache.get(&key).unwrap().invalidated);
    }
}
