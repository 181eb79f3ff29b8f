//! Remote query cache with request coalescing.
//!
//! [`QueryCache`] stores one [`QueryEntry`] per [`QueryKey`]. An entry only
//! changes through the load lifecycle (`begin` → `settle`) and through
//! invalidation. At most one loader runs per key; concurrent callers wait on
//! the same result through a `watch` channel. A failed load records its error
//! and keeps whatever data the entry already had.
//!
//! Eviction is driven by [`QueryCache::gc`], usually from the background
//! sweeper in [`gc`].

pub mod gc;

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use ahash::RandomState;
use backoffice_core::{ClockSource, ListEnvelope, QueryKey, SystemClock};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::FetchError;
use crate::invalidation::InvalidationTarget;

pub use gc::{CacheSweeper, CacheTask};

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// Lifecycle status of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Created but never loaded.
    Idle,
    /// A loader is running.
    Loading,
    /// The last load succeeded.
    Success,
    /// The last load failed. Earlier data, if any, is still present.
    Error,
}

/// Snapshot of one cached query.
#[derive(Debug)]
pub struct QueryEntry<V> {
    pub key: QueryKey,
    pub status: QueryStatus,
    pub data: Option<Arc<V>>,
    pub error: Option<FetchError>,
    /// Clock reading of the last successful load.
    pub fetched_at: Option<u64>,
    /// Set by invalidation; cleared by a successful load that started after it.
    pub invalidated: bool,
}

impl<V> Clone for QueryEntry<V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            fetched_at: self.fetched_at,
            invalidated: self.invalidated,
        }
    }
}

impl<V> QueryEntry<V> {
    fn new(key: QueryKey) -> Self {
        Self {
            key,
            status: QueryStatus::Idle,
            data: None,
            error: None,
            fetched_at: None,
            invalidated: false,
        }
    }

    /// Whether the entry must be reloaded before its data is served.
    #[must_use]
    pub fn is_stale(&self, now: u64, stale_ms: u64) -> bool {
        match (self.fetched_at, &self.data) {
            (Some(at), Some(_)) => self.invalidated || now.saturating_sub(at) >= stale_ms,
            _ => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

type Settled<V> = Option<Result<Arc<V>, FetchError>>;

enum Role<V> {
    Fresh(Arc<V>),
    Follower(watch::Receiver<Settled<V>>),
    Leader(watch::Sender<Settled<V>>),
}

/// Per-key storage: the entry, the in-flight load (if any), and subscriber
/// bookkeeping.
struct Slot<V> {
    entry: Mutex<QueryEntry<V>>,
    inflight: Mutex<Option<watch::Receiver<Settled<V>>>>,
    /// Bumped on every invalidation; subscribers watch it.
    invalidations: watch::Sender<u64>,
    subscribers: AtomicUsize,
    /// Running `fetch` calls holding this slot.
    pins: AtomicUsize,
    last_used: AtomicU64,
}

impl<V> Slot<V> {
    fn new(key: QueryKey, now: u64) -> Self {
        let (invalidations, _) = watch::channel(0);
        Self {
            entry: Mutex::new(QueryEntry::new(key)),
            inflight: Mutex::new(None),
            invalidations,
            subscribers: AtomicUsize::new(0),
            pins: AtomicUsize::new(0),
            last_used: AtomicU64::new(now),
        }
    }

    fn touch(&self, now: u64) {
        self.last_used.store(now, Ordering::Relaxed);
    }

    fn fresh_data(&self, now: u64, stale_ms: u64) -> Option<Arc<V>> {
        let entry = self.entry.lock();
        if entry.is_stale(now, stale_ms) {
            None
        } else {
            entry.data.clone()
        }
    }

    /// Decides, under the in-flight lock, whether this caller serves fresh
    /// data, waits for a running load, or starts one.
    fn join_or_lead(&self, now: u64, stale_ms: u64) -> Role<V> {
        let mut inflight = self.inflight.lock();
        if let Some(rx) = inflight.as_ref() {
            return Role::Follower(rx.clone());
        }
        if let Some(data) = self.fresh_data(now, stale_ms) {
            return Role::Fresh(data);
        }
        let (tx, rx) = watch::channel(None);
        *inflight = Some(rx);
        Role::Leader(tx)
    }

    /// `idle|success|error → loading`. Returns the invalidation generation
    /// the load started under.
    fn begin(&self) -> u64 {
        self.entry.lock().status = QueryStatus::Loading;
        *self.invalidations.borrow()
    }

    /// `loading → success|error`.
    fn settle(&self, result: &Result<Arc<V>, FetchError>, generation: u64, now: u64) {
        let invalidated_meanwhile = *self.invalidations.borrow() != generation;
        let mut entry = self.entry.lock();
        match result {
            Ok(data) => {
                entry.status = QueryStatus::Success;
                entry.data = Some(Arc::clone(data));
                entry.error = None;
                entry.fetched_at = Some(now);
                entry.invalidated = invalidated_meanwhile;
            }
            Err(e) => {
                entry.status = QueryStatus::Error;
                entry.error = Some(e.clone());
            }
        }
    }

    fn is_loading(&self) -> bool {
        self.inflight.lock().is_some()
    }

    fn is_held(&self) -> bool {
        self.subscribers.load(Ordering::SeqCst) > 0 || self.pins.load(Ordering::SeqCst) > 0
    }
}

/// Keeps a slot out of `gc` for the length of one `fetch`.
struct SlotPin<'a, V> {
    slot: Arc<Slot<V>>,
    clock: &'a dyn ClockSource,
}

impl<V> std::ops::Deref for SlotPin<'_, V> {
    type Target = Slot<V>;

    fn deref(&self) -> &Slot<V> {
        &self.slot
    }
}

impl<V> Drop for SlotPin<'_, V> {
    fn drop(&mut self) {
        self.slot.touch(self.clock.now());
        self.slot.pins.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Clears the in-flight marker when the leading load ends, including when its
/// future is dropped before settling.
struct LoadGuard<'a, V> {
    slot: &'a Slot<V>,
}

impl<V> Drop for LoadGuard<'_, V> {
    fn drop(&mut self) {
        self.slot.inflight.lock().take();
        let mut entry = self.slot.entry.lock();
        if entry.status == QueryStatus::Loading {
            entry.status = if entry.error.is_some() {
                QueryStatus::Error
            } else if entry.data.is_some() {
                QueryStatus::Success
            } else {
                QueryStatus::Idle
            };
        }
    }
}

// ---------------------------------------------------------------------------
// QueryCache
// ---------------------------------------------------------------------------

/// Process-wide cache of remote query results.
///
/// Constructed once at the application root and shared as `Arc<QueryCache>`.
/// Tests build fresh instances.
pub struct QueryCache<V = ListEnvelope> {
    slots: DashMap<QueryKey, Arc<Slot<V>>, RandomState>,
    stale_ms: u64,
    gc_ms: u64,
    clock: Arc<dyn ClockSource>,
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl<V: Send + Sync + 'static> QueryCache<V> {
    /// Creates an empty cache reading the system clock.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates an empty cache with an injected clock.
    #[must_use]
    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn ClockSource>) -> Self {
        Self {
            slots: DashMap::with_hasher(RandomState::new()),
            stale_ms: millis(config.stale_time),
            gc_ms: millis(config.gc_time),
            clock,
        }
    }

    /// Returns the slot for `key`, creating it if needed. `hold` runs while
    /// the map shard is still locked, so `gc` sees its effect or never sees
    /// the slot.
    fn slot(&self, key: &QueryKey, hold: impl FnOnce(&Slot<V>)) -> Arc<Slot<V>> {
        let now = self.clock.now();
        let entry = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Slot::new(key.clone(), now)));
        entry.touch(now);
        hold(entry.value().as_ref());
        Arc::clone(entry.value())
    }

    fn pin(&self, key: &QueryKey) -> SlotPin<'_, V> {
        let slot = self.slot(key, |slot| {
            slot.pins.fetch_add(1, Ordering::SeqCst);
        });
        SlotPin {
            slot,
            clock: self.clock.as_ref(),
        }
    }

    /// Snapshot of the entry for `key`, if one exists.
    #[must_use]
    pub fn get(&self, key: &QueryKey) -> Option<QueryEntry<V>> {
        self.slots.get(key).map(|slot| slot.entry.lock().clone())
    }

    /// Returns cached data for `key`, or runs `loader` to get it.
    ///
    /// Fresh data is returned without calling `loader`. When a load for the
    /// same key is already running, this call waits for it and shares its
    /// result instead of starting another. If that load is abandoned before
    /// it settles, one of the waiting callers starts a new one.
    ///
    /// # Errors
    ///
    /// Returns the loader's error. The entry keeps its previous data.
    pub async fn fetch<F, Fut>(&self, key: &QueryKey, loader: F) -> Result<Arc<V>, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, FetchError>>,
    {
        let slot = self.pin(key);
        let mut loader = Some(loader);

        loop {
            let now = self.clock.now();
            slot.touch(now);

            match slot.join_or_lead(now, self.stale_ms) {
                Role::Fresh(data) => {
                    debug!(key = %key, "query cache hit");
                    metrics::counter!("backoffice_query_cache_hits_total").increment(1);
                    return Ok(data);
                }
                Role::Follower(mut rx) => {
                    debug!(key = %key, "joining in-flight load");
                    let settled = match rx.wait_for(Option::is_some).await {
                        Ok(value) => value.clone(),
                        Err(_) => None,
                    };
                    if let Some(result) = settled {
                        return result;
                    }
                    debug!(key = %key, "in-flight load was abandoned, retrying");
                }
                Role::Leader(tx) => {
                    let Some(load) = loader.take() else {
                        return Err(FetchError::Cancelled);
                    };
                    metrics::counter!("backoffice_query_cache_misses_total").increment(1);
                    return self.lead(&slot, key, tx, load).await;
                }
            }
        }
    }

    async fn lead<F, Fut>(
        &self,
        slot: &Slot<V>,
        key: &QueryKey,
        tx: watch::Sender<Settled<V>>,
        load: F,
    ) -> Result<Arc<V>, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, FetchError>>,
    {
        let generation = slot.begin();
        let guard = LoadGuard { slot };

        let result = load().await.map(Arc::new);
        slot.settle(&result, generation, self.clock.now());
        if let Err(e) = &result {
            warn!(key = %key, error = %e, "query load failed");
        }

        drop(guard);
        // No receivers simply means nobody else was waiting.
        let _ = tx.send(Some(result.clone()));
        result
    }

    /// Registers a mounted subscriber for `key`.
    ///
    /// The entry is never evicted while a subscription is alive, and the
    /// subscription is told about every invalidation that touches the key.
    #[must_use]
    pub fn subscribe(&self, key: &QueryKey) -> QuerySubscription<V> {
        let slot = self.slot(key, |slot| {
            slot.subscribers.fetch_add(1, Ordering::SeqCst);
        });
        let rx = slot.invalidations.subscribe();
        QuerySubscription {
            slot,
            rx,
            clock: Arc::clone(&self.clock),
        }
    }

    /// Number of live subscriptions for `key`.
    #[must_use]
    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        self.slots
            .get(key)
            .map_or(0, |slot| slot.subscribers.load(Ordering::SeqCst))
    }

    /// Evicts entries that nobody subscribes to or is fetching, and that have
    /// been unused for at least the GC time. Returns how many were removed.
    pub fn gc(&self) -> usize {
        let now = self.clock.now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| {
            let idle = now.saturating_sub(slot.last_used.load(Ordering::Relaxed));
            slot.is_held() || slot.is_loading() || idle < self.gc_ms
        });
        let evicted = before.saturating_sub(self.slots.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.slots.len(), "query cache sweep");
            metrics::counter!("backoffice_query_cache_evictions_total").increment(evicted as u64);
        }
        evicted
    }

    /// Removes one entry regardless of subscribers.
    pub fn remove(&self, key: &QueryKey) -> bool {
        self.slots.remove(key).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<V: Send + Sync + 'static> InvalidationTarget for QueryCache<V> {
    fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut count = 0;
        for slot in self.slots.iter() {
            if slot.key().starts_with(prefix) {
                slot.entry.lock().invalidated = true;
                slot.invalidations.send_modify(|generation| *generation += 1);
                count += 1;
            }
        }
        debug!(prefix = %prefix, count, "invalidated queries");
        count
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A mounted view's interest in one key.
///
/// Dropping it releases the key for eviction.
pub struct QuerySubscription<V> {
    slot: Arc<Slot<V>>,
    rx: watch::Receiver<u64>,
    clock: Arc<dyn ClockSource>,
}

impl<V> QuerySubscription<V> {
    /// Waits for the next invalidation of this key.
    pub async fn invalidated(&mut self) {
        // The sender lives in the slot this subscription holds.
        self.rx.changed().await.ok();
    }

    /// The key this subscription watches.
    #[must_use]
    pub fn key(&self) -> QueryKey {
        self.slot.entry.lock().key.clone()
    }
}

impl<V> Drop for QuerySubscription<V> {
    fn drop(&mut self) {
        self.slot.subscribers.fetch_sub(1, Ordering::SeqCst);
        self.slot.touch(self.clock.now());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
