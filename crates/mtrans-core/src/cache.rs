//! Cache Manager (C7): pair-key → [`EngineCacheEntry`] map with idle-timeout
//! eviction, keep-alive rate-limited rearming, and per-pair single-flight
//! builds.
//!
//! Generalizes the teacher's `BytecodeCache`: both wrap a keyed map in a
//! single `Mutex` and expose a small, fully-tested operation set (`get`,
//! `insert`/`get_or_create`, `clear`/`remove`). The teacher evicts by LRU
//! capacity; this cache evicts by idle deadline, so the single `Mutex` is
//! paired with a periodic sweeper thread instead of evicting synchronously
//! on insert. Unlike `BytecodeCache::global()`, this cache is not a process
//! singleton — spec's own design notes call for the coordinator to own this
//! state directly, since two independent engines in one process must not
//! share translation caches.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::TranslateError;
use crate::pool::EnginePool;

/// A cached pool of workers for one language pair (§3).
pub struct EngineCacheEntry {
    pub pair_key: String,
    pub pool: EnginePool,
    last_used: Mutex<Instant>,
    last_rearm: Mutex<Instant>,
    use_count: AtomicU64,
}

impl EngineCacheEntry {
    fn new(pair_key: String, pool: EnginePool) -> Self {
        let now = Instant::now();
        Self {
            pair_key,
            pool,
            last_used: Mutex::new(now),
            last_rearm: Mutex::new(now),
            use_count: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        *self.last_used.lock().expect("entry mutex poisoned") = Instant::now();
        self.use_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn use_count(&self) -> u64 {
        self.use_count.load(Ordering::Relaxed)
    }
}

struct PerPairLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PerPairLocks {
    fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("per-pair lock map poisoned");
        Arc::clone(locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))))
    }
}

/// Pair-key → pool map with idle eviction and keep-alive.
pub struct CacheManager {
    entries: Mutex<HashMap<String, Arc<EngineCacheEntry>>>,
    build_locks: PerPairLocks,
    idle_timeout: Option<Duration>,
    memory_check_interval: Duration,
    timeout_reset_threshold: Duration,
    sweeper_running: Arc<AtomicBool>,
    sweeper_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CacheManager {
    /// `idle_timeout = None` disables eviction entirely (§4.6: `<= 0`).
    pub fn new(
        idle_timeout: Option<Duration>,
        memory_check_interval: Duration,
        timeout_reset_threshold: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            build_locks: PerPairLocks::new(),
            idle_timeout,
            memory_check_interval,
            timeout_reset_threshold,
            sweeper_running: Arc::new(AtomicBool::new(false)),
            sweeper_handle: Mutex::new(None),
        })
    }

    /// Returns the existing entry for `pair_key` and refreshes its idle
    /// deadline, or `None` on a miss.
    pub fn get(&self, pair_key: &str) -> Option<Arc<EngineCacheEntry>> {
        let entries = self.entries.lock().expect("cache entries mutex poisoned");
        let entry = entries.get(pair_key).cloned()?;
        drop(entries);
        entry.touch();
        Some(entry)
    }

    /// Returns the existing entry, or builds one via `build` (serialized
    /// per-pair so concurrent callers for the same new pair share a single
    /// build — property 6). `self_arc` must be the same `Arc` this
    /// `CacheManager` is held behind, so the sweeper thread can be started
    /// lazily on first insert.
    pub fn get_or_create(
        self: &Arc<Self>,
        pair_key: &str,
        build: impl FnOnce() -> Result<EnginePool, TranslateError>,
    ) -> Result<Arc<EngineCacheEntry>, TranslateError> {
        if let Some(entry) = self.get(pair_key) {
            return Ok(entry);
        }

        let pair_lock = self.build_locks.lock_for(pair_key);
        let _guard = pair_lock.lock().expect("per-pair build lock poisoned");

        if let Some(entry) = self.get(pair_key) {
            return Ok(entry);
        }

        let pool = build().inspect_err(|e| {
            tracing::warn!(pair_key = %pair_key, error = %e, "failed to build translation engine");
        })?;
        tracing::debug!(pair_key = %pair_key, "translation engine built and cached");
        let entry = Arc::new(EngineCacheEntry::new(pair_key.to_string(), pool));
        entry.touch();

        let mut entries = self.entries.lock().expect("cache entries mutex poisoned");
        entries.insert(pair_key.to_string(), Arc::clone(&entry));
        let was_empty_before_insert = entries.len() == 1;
        drop(entries);

        if was_empty_before_insert {
            self.start_sweeper_if_needed();
        }

        Ok(entry)
    }

    /// Bumps `lastUsed`; rearms the idle deadline only if more than
    /// `timeout_reset_threshold` has elapsed since the last rearm, trading a
    /// bounded extra lifetime for avoiding timer churn under sustained
    /// load (§9).
    pub fn keep_alive(&self, pair_key: &str) {
        let entries = self.entries.lock().expect("cache entries mutex poisoned");
        let Some(entry) = entries.get(pair_key).cloned() else {
            return;
        };
        drop(entries);

        entry.touch();
        let mut last_rearm = entry.last_rearm.lock().expect("entry mutex poisoned");
        if last_rearm.elapsed() >= self.timeout_reset_threshold {
            *last_rearm = Instant::now();
        }
    }

    /// Removes and terminates the pool for `pair_key`, if present.
    pub fn remove(&self, pair_key: &str) {
        let mut entries = self.entries.lock().expect("cache entries mutex poisoned");
        if let Some(entry) = entries.remove(pair_key) {
            drop(entries);
            if let Ok(entry) = Arc::try_unwrap(entry) {
                entry.pool.shutdown();
            }
        }
    }

    /// Number of cached pairs.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache entries mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A snapshot of every currently cached entry, used by the coordinator's
    /// response-collection pump to poll every live pool's worker channels.
    pub fn entries_snapshot(&self) -> Vec<Arc<EngineCacheEntry>> {
        self.entries
            .lock()
            .expect("cache entries mutex poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Removes every entry and terminates every pool. Stops the sweeper.
    pub fn clear(&self) {
        self.sweeper_running.store(false, Ordering::SeqCst);
        let mut entries = self.entries.lock().expect("cache entries mutex poisoned");
        let drained: Vec<_> = entries.drain().map(|(_, v)| v).collect();
        drop(entries);
        for entry in drained {
            if let Ok(entry) = Arc::try_unwrap(entry) {
                entry.pool.shutdown();
            }
        }
    }

    fn start_sweeper_if_needed(self: &Arc<Self>) {
        let Some(idle_timeout) = self.idle_timeout else {
            return;
        };
        let mut handle_slot = self.sweeper_handle.lock().expect("sweeper handle mutex poisoned");
        if handle_slot.is_some() {
            return;
        }
        self.sweeper_running.store(true, Ordering::SeqCst);
        let this = Arc::clone(self);
        let interval = self.memory_check_interval;
        let handle = thread::Builder::new()
            .name("mtrans-cache-sweeper".to_string())
            .spawn(move || {
                while this.sweeper_running.load(Ordering::SeqCst) {
                    thread::sleep(interval);
                    if !this.sweeper_running.load(Ordering::SeqCst) {
                        break;
                    }
                    this.sweep(idle_timeout);
                }
            })
            .expect("failed to spawn cache sweeper thread");
        *handle_slot = Some(handle);
    }

    fn sweep(&self, idle_timeout: Duration) {
        let stale: Vec<String> = {
            let entries = self.entries.lock().expect("cache entries mutex poisoned");
            entries
                .iter()
                .filter(|(_, entry)| {
                    entry.last_used.lock().expect("entry mutex poisoned").elapsed() >= idle_timeout
                })
                .map(|(key, _)| key.clone())
                .collect()
        };
        for key in stale {
            tracing::debug!(pair_key = %key, "evicting idle translation engine");
            self.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::null_backend_factory;

    fn build_test_pool() -> Result<EnginePool, TranslateError> {
        EnginePool::build(1, "en", "zh-Hans", vec![], null_backend_factory(), Duration::from_secs(5))
    }

    #[test]
    fn test_get_or_create_builds_once_and_caches() {
        let cache = CacheManager::new(None, Duration::from_secs(60), Duration::from_secs(300));
        let entry1 = cache.get_or_create("en_zh-Hans", build_test_pool).unwrap();
        let entry2 = cache.get_or_create("en_zh-Hans", build_test_pool).unwrap();
        assert!(Arc::ptr_eq(&entry1, &entry2), "second call must return the same entry");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_on_miss_returns_none() {
        let cache = CacheManager::new(None, Duration::from_secs(60), Duration::from_secs(300));
        assert!(cache.get("nope").is_none());
    }

    #[test]
    fn test_keep_alive_touches_use_count() {
        let cache = CacheManager::new(None, Duration::from_secs(60), Duration::from_secs(300));
        let entry = cache.get_or_create("en_ja", build_test_pool).unwrap();
        let before = entry.use_count();
        cache.keep_alive("en_ja");
        assert!(entry.use_count() > before);
    }

    #[test]
    fn test_remove_evicts_entry() {
        let cache = CacheManager::new(None, Duration::from_secs(60), Duration::from_secs(300));
        cache.get_or_create("en_ja", build_test_pool).unwrap();
        assert_eq!(cache.len(), 1);
        cache.remove("en_ja");
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_clear_empties_cache_and_stops_sweeper() {
        let cache = CacheManager::new(Some(Duration::from_secs(1)), Duration::from_millis(50), Duration::from_secs(300));
        cache.get_or_create("en_ja", build_test_pool).unwrap();
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert_eq!(cache.len(), 0);
        assert!(!cache.sweeper_running.load(Ordering::SeqCst));
    }

    #[test]
    fn test_concurrent_get_or_create_builds_exactly_once() {
        let cache = CacheManager::new(None, Duration::from_secs(60), Duration::from_secs(300));
        let build_count = Arc::new(AtomicU64::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let build_count = Arc::clone(&build_count);
                thread::spawn(move || {
                    cache
                        .get_or_create("en_fr", || {
                            build_count.fetch_add(1, Ordering::SeqCst);
                            build_test_pool()
                        })
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(build_count.load(Ordering::SeqCst), 1, "exactly one build for 8 concurrent callers");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_idle_eviction_removes_stale_entry() {
        let cache = CacheManager::new(
            Some(Duration::from_millis(50)),
            Duration::from_millis(20),
            Duration::from_secs(300),
        );
        cache.get_or_create("en_de", build_test_pool).unwrap();
        assert_eq!(cache.len(), 1);
        thread::sleep(Duration::from_millis(300));
        assert_eq!(cache.len(), 0, "idle entry should have been swept");
    }
}
