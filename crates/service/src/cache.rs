//! Time-bounded in-memory cache.
//!
//! Entries expire a fixed TTL after insertion. Expired entries are never
//! returned; they are evicted lazily on read and periodically by a sweeper
//! task. The clock is injectable so expiry can be driven by tests.
//!
//! A miss is refilled by the caller outside the lock. To keep a refill from
//! undoing an invalidation that landed while the caller was fetching, take
//! an [`Epoch`] before the fetch and store through
//! [`TtlCache::insert_if_current`]; the write is dropped if anything was
//! invalidated in between.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

/// Invalidation counter observed before a refill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Epoch(u64);

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

pub struct TtlCache<K, V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<K, Entry<V>>>,
    // bumped under the write lock on every invalidation
    epoch: AtomicU64,
}

impl<K, V> std::fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("ttl", &self.ttl)
            .field("len", &self.entries.read().len())
            .finish()
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, entry: &Entry<V>, now: Instant) -> bool {
        now.saturating_duration_since(entry.inserted_at) < self.ttl
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if self.is_fresh(entry, now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // expired; re-check under the write lock since an insert may have raced us
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(key) {
            if self.is_fresh(entry, now) {
                return Some(entry.value.clone());
            }
            entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        let inserted_at = self.clock.now();
        self.entries.write().insert(key, Entry { value, inserted_at });
    }

    /// Take before fetching the value for a miss.
    pub fn epoch(&self) -> Epoch {
        Epoch(self.epoch.load(Ordering::SeqCst))
    }

    /// Insert unless an invalidation happened since `epoch` was taken.
    /// Returns whether the value was stored.
    pub fn insert_if_current(&self, key: K, epoch: Epoch, value: V) -> bool {
        let inserted_at = self.clock.now();
        let mut entries = self.entries.write();
        if self.epoch.load(Ordering::SeqCst) != epoch.0 {
            return false;
        }
        entries.insert(key, Entry { value, inserted_at });
        true
    }

    pub fn invalidate(&self, key: &K) {
        let mut entries = self.entries.write();
        entries.remove(key);
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.clear();
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.ttl;
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| now.saturating_duration_since(entry.inserted_at) < ttl);
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Periodically purge expired entries until `shutdown` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        name: &'static str,
        interval: Duration,
        mut shutdown: watch::Receiver<()>,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let purged = cache.purge_expired();
                        if purged > 0 {
                            tracing::debug!(cache = name, purged, "swept expired cache entries");
                        }
                    }
                    _ = shutdown.changed() => {
                        tracing::debug!(cache = name, "cache sweeper shutting down");
                        break;
                    }
                }
            }
        })
    }
}
