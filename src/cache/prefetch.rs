//! Per-key prefetch cache with background refill.
//!
//! [`PrefetchCache`] masks upstream latency by keeping a small queue of
//! ready-made completions per cache key. First access to a key primes the
//! queue synchronously; from then on requests dequeue instantly and a
//! detached background task refills the queue when it drains.
//!
//! # Locking discipline
//!
//! No global lock serializes unrelated requests. Each entry owns a
//! `tokio::sync::Mutex` gate guarding its queue / hash-set / primed flag;
//! the outer key map and the LRU access map are `std::sync::Mutex`es held
//! only for map operations, never across an await. Refill exclusivity and
//! the eviction sweep each use an atomic flag — contention means "skip this
//! round", never blocking.
//!
//! # Cancellation
//!
//! Dropping the calling future aborts the synchronous prime loop at its
//! next await point. Refill tasks are `tokio::spawn`ed and deliberately
//! detached: a cancelled request still leaves the cache warmer for the
//! next one.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{CacheKey, content_hash};
use crate::Result;
use crate::telemetry;

/// Pause between failed fetch attempts during background refill.
const REFILL_RETRY_PAUSE: Duration = Duration::from_millis(200);

/// Multiplier on the target count bounding total refill fetch attempts,
/// so a failing upstream cannot keep a refill task spinning forever.
const REFILL_ATTEMPT_FACTOR: usize = 5;

#[derive(Debug, Default)]
struct EntryState {
    queue: VecDeque<String>,
    hashes: HashSet<u64>,
    primed: bool,
}

impl EntryState {
    /// Insert content unless an identical completion is already queued.
    fn push_unique(&mut self, content: String) -> bool {
        let hash = content_hash(&content);
        if !self.hashes.insert(hash) {
            return false;
        }
        self.queue.push_back(content);
        true
    }

    /// Dequeue the oldest completion, removing its fingerprint in lockstep.
    fn pop(&mut self) -> Option<String> {
        let content = self.queue.pop_front()?;
        self.hashes.remove(&content_hash(&content));
        Some(content)
    }
}

struct CacheEntry {
    state: Mutex<EntryState>,
    refilling: AtomicBool,
}

impl CacheEntry {
    fn new() -> Self {
        Self {
            state: Mutex::new(EntryState::default()),
            refilling: AtomicBool::new(false),
        }
    }
}

/// Bounded per-key completion cache with prime-on-first-access,
/// detached background refill, and global LRU eviction.
pub struct PrefetchCache {
    entries: StdMutex<HashMap<CacheKey, Arc<CacheEntry>>>,
    access: StdMutex<HashMap<CacheKey, Instant>>,
    evicting: AtomicBool,
    max_keys: usize,
    max_items_per_key: usize,
}

impl PrefetchCache {
    /// Create a cache bounded to `max_keys` distinct keys and
    /// `max_items_per_key` queued completions per key.
    pub fn new(max_keys: usize, max_items_per_key: usize) -> Self {
        Self {
            entries: StdMutex::new(HashMap::new()),
            access: StdMutex::new(HashMap::new()),
            evicting: AtomicBool::new(false),
            max_keys: max_keys.max(1),
            max_items_per_key: max_items_per_key.max(1),
        }
    }

    /// Serve one completion for `key`, fetching through `fetch` as needed.
    ///
    /// `target_count` is how many completions the entry should hold; zero
    /// bypasses the cache entirely and proxies a single direct fetch. The
    /// first access to a key primes its queue synchronously (individual
    /// prime failures are logged and skipped, so the entry may start
    /// under-filled). Draining the queue schedules at most one background
    /// refill per key; if nothing can be served synchronously the caller
    /// gets a direct fetch rather than waiting on the refill.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: CacheKey,
        target_count: usize,
        fetch: F,
    ) -> Result<String>
    where
        F: Fn() -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        if target_count == 0 {
            return fetch().await;
        }
        let target = target_count.min(self.max_items_per_key);

        let entry = self.entry_for(key);
        let mut state = entry.state.lock().await;

        if !state.primed {
            self.prime(&mut state, target, &fetch).await;
        }

        match state.pop() {
            Some(content) => {
                if state.queue.is_empty() {
                    self.schedule_refill(&entry, target, fetch.clone());
                }
                drop(state);
                metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
                Ok(content)
            }
            None => {
                // Queue is empty (failed or fully-deduped prime, or drained
                // by a concurrent caller). Never block on the refill; serve
                // this request directly.
                self.schedule_refill(&entry, target, fetch.clone());
                drop(state);
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
                fetch().await
            }
        }
    }

    /// Number of distinct keys currently held.
    pub fn key_count(&self) -> usize {
        self.entries.lock().expect("cache map lock poisoned").len()
    }

    /// Whether a key currently has an entry (primed or not).
    pub fn contains(&self, key: CacheKey) -> bool {
        self.entries
            .lock()
            .expect("cache map lock poisoned")
            .contains_key(&key)
    }

    /// Queued completions currently held for `key`.
    pub async fn queued_len(&self, key: CacheKey) -> usize {
        let entry = {
            let entries = self.entries.lock().expect("cache map lock poisoned");
            entries.get(&key).cloned()
        };
        match entry {
            Some(entry) => entry.state.lock().await.queue.len(),
            None => 0,
        }
    }

    /// Look up or create the entry for `key`, updating its access time.
    ///
    /// Creation of a new key first gives eviction a chance to run, so the
    /// key count stays under the configured bound.
    fn entry_for(&self, key: CacheKey) -> Arc<CacheEntry> {
        let mut entries = self.entries.lock().expect("cache map lock poisoned");
        if !entries.contains_key(&key) && entries.len() >= self.max_keys * 9 / 10 {
            self.evict_oldest(&mut entries, key);
        }
        let entry = Arc::clone(
            entries
                .entry(key)
                .or_insert_with(|| Arc::new(CacheEntry::new())),
        );
        drop(entries);
        self.access
            .lock()
            .expect("cache access lock poisoned")
            .insert(key, Instant::now());
        entry
    }

    /// Remove ~20% of keys by oldest access time.
    ///
    /// Non-blocking: if another sweep is in flight this round is skipped
    /// and bound enforcement is retried on a later insert. The key being
    /// served right now is never evicted.
    fn evict_oldest(&self, entries: &mut HashMap<CacheKey, Arc<CacheEntry>>, serving: CacheKey) {
        if self
            .evicting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let mut by_age: Vec<(CacheKey, Instant)> = {
            let access = self.access.lock().expect("cache access lock poisoned");
            access.iter().map(|(k, t)| (*k, *t)).collect()
        };
        by_age.sort_by_key(|(_, touched)| *touched);

        let quota = (self.max_keys / 5).max(1);
        let mut removed = 0usize;
        {
            let mut access = self.access.lock().expect("cache access lock poisoned");
            for (key, _) in by_age {
                if removed >= quota {
                    break;
                }
                if key == serving {
                    continue;
                }
                entries.remove(&key);
                access.remove(&key);
                removed += 1;
            }
        }
        debug!(removed, remaining = entries.len(), "evicted LRU cache keys");
        metrics::counter!(telemetry::EVICTIONS_TOTAL).increment(removed as u64);

        self.evicting.store(false, Ordering::Release);
    }

    /// Fill a fresh entry with up to `target` unique completions.
    ///
    /// Individual fetch failures are logged and skipped — an under-primed
    /// entry degrades to direct fetches, it does not fail the request.
    async fn prime<F, Fut>(&self, state: &mut EntryState, target: usize, fetch: &F)
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<String>> + Send,
    {
        for attempt in 0..target {
            match fetch().await {
                Ok(content) => {
                    if !state.push_unique(content) {
                        debug!(attempt, "skipped duplicate completion while priming");
                    }
                }
                Err(e) => {
                    warn!(attempt, error = %e, "prime fetch failed, skipping");
                }
            }
        }
        state.primed = true;
        debug!(queued = state.queue.len(), target, "primed cache entry");
    }

    /// Launch a detached refill task unless one is already running for
    /// this entry.
    fn schedule_refill<F, Fut>(&self, entry: &Arc<CacheEntry>, target: usize, fetch: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        if entry
            .refilling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        metrics::counter!(telemetry::REFILLS_TOTAL).increment(1);

        let entry = Arc::clone(entry);
        tokio::spawn(async move {
            let max_attempts = target * REFILL_ATTEMPT_FACTOR;
            let mut attempts = 0usize;
            loop {
                let filled = entry.state.lock().await.queue.len();
                if filled >= target || attempts >= max_attempts {
                    break;
                }
                attempts += 1;
                match fetch().await {
                    Ok(content) => {
                        entry.state.lock().await.push_unique(content);
                    }
                    Err(e) => {
                        warn!(attempts, error = %e, "refill fetch failed, retrying");
                        tokio::time::sleep(REFILL_RETRY_PAUSE).await;
                    }
                }
            }
            entry.refilling.store(false, Ordering::Release);
            debug!(attempts, "background refill finished");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_unique_rejects_duplicates() {
        let mut state = EntryState::default();
        assert!(state.push_unique("a".into()));
        assert!(!state.push_unique("a".into()));
        assert!(state.push_unique("b".into()));
        assert_eq!(state.queue.len(), 2);
        assert_eq!(state.hashes.len(), 2);
    }

    #[test]
    fn pop_removes_hash_in_lockstep() {
        let mut state = EntryState::default();
        state.push_unique("a".into());
        assert_eq!(state.pop().as_deref(), Some("a"));
        assert!(state.queue.is_empty());
        assert!(state.hashes.is_empty());
        // same content is admissible again once dequeued
        assert!(state.push_unique("a".into()));
    }
}
