//! SELECT result cache keyed by fully substituted SQL.

use crate::config::ResultCacheConfig;
use crate::error::BridgeResult;
use crate::row::ResultSet;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

type Slot = Arc<OnceCell<Arc<ResultSet>>>;

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Single-flight result cache.
///
/// Each key owns a slot that is filled at most once. Concurrent callers that
/// miss on the same key wait for the first one's execution instead of
/// running the statement again. Failed executions leave the slot empty and
/// drop it, so a later call retries.
#[derive(Debug)]
pub(crate) struct ResultCache {
    inner: Mutex<ResultCacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug)]
struct ResultCacheInner {
    capacity: Option<usize>,
    map: HashMap<String, Slot>,
    order: VecDeque<String>,
}

/// Whether a lookup was served from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Probe {
    Hit,
    Miss,
}

impl ResultCache {
    pub(crate) fn new(config: ResultCacheConfig) -> Self {
        Self {
            inner: Mutex::new(ResultCacheInner {
                capacity: config.capacity,
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the cached result for `key`, or run `exec` once to produce it.
    pub(crate) async fn get_or_execute<F, Fut>(
        &self,
        key: &str,
        exec: F,
    ) -> (BridgeResult<Arc<ResultSet>>, Probe)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BridgeResult<Arc<ResultSet>>>,
    {
        let slot = self.slot(key);

        if let Some(result) = slot.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return (Ok(Arc::clone(result)), Probe::Hit);
        }

        let mut executed = false;
        let outcome = slot
            .get_or_try_init(|| {
                executed = true;
                exec()
            })
            .await
            .map(Arc::clone);

        let probe = if executed { Probe::Miss } else { Probe::Hit };
        match probe {
            Probe::Miss => self.misses.fetch_add(1, Ordering::Relaxed),
            Probe::Hit => self.hits.fetch_add(1, Ordering::Relaxed),
        };

        if outcome.is_err() {
            self.discard_if_empty(key, &slot);
        }

        (outcome, probe)
    }

    pub(crate) fn clear(&self) {
        let mut inner = self.lock();
        inner.map.clear();
        inner.order.clear();
    }

    pub(crate) fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.lock().map.len(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ResultCacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, key: &str) -> Slot {
        let mut inner = self.lock();

        if let Some(existing) = inner.map.get(key).cloned() {
            inner.touch(key);
            return existing;
        }

        let slot: Slot = Arc::new(OnceCell::new());
        inner.map.insert(key.to_string(), Arc::clone(&slot));
        inner.order.push_back(key.to_string());
        inner.evict_if_needed();
        slot
    }

    fn discard_if_empty(&self, key: &str, slot: &Slot) {
        let mut inner = self.lock();
        let same = inner
            .map
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && !current.initialized());
        if same {
            inner.map.remove(key);
            inner.remove_from_order(key);
        }
    }
}

impl ResultCacheInner {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k.as_str() == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }

    fn remove_from_order(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k.as_str() == key) {
            let _ = self.order.remove(pos);
        }
    }

    fn evict_if_needed(&mut self) {
        let Some(capacity) = self.capacity else {
            return;
        };

        while self.map.len() > capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            let _ = self.map.remove(&oldest);
        }
    }
}
