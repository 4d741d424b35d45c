//! Bounded memo table.
//!
//! A fixed-capacity LRU map behind a single short-held mutex. Every cache in
//! this crate is built from one of these (or, for identities, from the same
//! pieces assembled by hand).
//!
//! Besides the usual get/put/remove/purge, each table carries a generation
//! number that moves forward on every removal, purge and in-place update. A
//! read-through miss records the generation before it goes to the store and
//! stores its result with [`BoundedMemo::put_if_current`]; if anything was
//! invalidated in the meantime the result is handed back to the caller but not
//! memoized.
//!
//! Removals and in-place updates fence only the keys they touch, so unrelated
//! misses in flight still land. A purge fences the whole table.

use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use metrics::counter;
use tracing::debug;

use super::lock::mutex_lock;

pub(super) const METRIC_HIT: &str = "parlor_cache_hit_total";
pub(super) const METRIC_MISS: &str = "parlor_cache_miss_total";
pub(super) const METRIC_EVICT: &str = "parlor_cache_evict_total";
pub(super) const METRIC_STALE_PUT: &str = "parlor_cache_stale_put_rejected_total";

/// Opaque token identifying the invalidation state of one table.
pub type Generation = u64;

struct MemoState<K: Hash + Eq, V> {
    entries: LruCache<K, V>,
    generation: Generation,
    /// Puts captured before this generation are stale for every key.
    fence: Generation,
    /// Per-key fences newer than `fence`.
    key_fences: HashMap<K, Generation>,
}

impl<K: Hash + Eq, V> MemoState<K, V> {
    fn advance(&mut self) {
        self.generation += 1;
        self.fence = self.generation;
        self.key_fences.clear();
    }

    fn advance_key(&mut self, key: K) {
        if !self.key_fences.contains_key(&key)
            && self.key_fences.len() >= self.entries.cap().get()
        {
            self.advance();
            return;
        }
        self.generation += 1;
        self.key_fences.insert(key, self.generation);
    }

    fn is_current(&self, key: &K, seen: Generation) -> bool {
        self.fence <= seen
            && self
                .key_fences
                .get(key)
                .is_none_or(|&fenced| fenced <= seen)
    }
}

pub struct BoundedMemo<K: Hash + Eq, V> {
    name: &'static str,
    state: Mutex<MemoState<K, V>>,
}

impl<K, V> BoundedMemo<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a table labelled `name` in logs and metrics.
    pub fn new(name: &'static str, capacity: NonZeroUsize) -> Self {
        Self {
            name,
            state: Mutex::new(MemoState {
                entries: LruCache::new(capacity),
                generation: 0,
                fence: 0,
                key_fences: HashMap::new(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Look up a key, marking it most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        let value = mutex_lock(&self.state, self.name, "get")
            .entries
            .get(key)
            .cloned();
        if value.is_some() {
            counter!(METRIC_HIT, "cache" => self.name).increment(1);
        } else {
            counter!(METRIC_MISS, "cache" => self.name).increment(1);
        }
        value
    }

    /// Insert unconditionally. Returns the key pushed out by capacity, if any.
    pub fn put(&self, key: K, value: V) -> Option<K> {
        let mut state = mutex_lock(&self.state, self.name, "put");
        self.push(&mut state, key, value)
    }

    /// Current generation, to be captured before a read-through query.
    pub fn generation(&self) -> Generation {
        mutex_lock(&self.state, self.name, "generation").generation
    }

    /// Insert only if nothing was invalidated since `seen` was captured.
    ///
    /// Returns whether the value was stored.
    pub fn put_if_current(&self, key: K, value: V, seen: Generation) -> bool {
        let mut state = mutex_lock(&self.state, self.name, "put_if_current");
        if !state.is_current(&key, seen) {
            debug!(
                cache = self.name,
                outcome = "stale_put_rejected",
                "Invalidation raced a read-through; result not memoized"
            );
            counter!(METRIC_STALE_PUT, "cache" => self.name).increment(1);
            return false;
        }
        self.push(&mut state, key, value);
        true
    }

    /// Apply `f` to a cached value in place. Absent keys stay absent, and a
    /// miss for the same key already in flight will not be memoized.
    ///
    /// Returns whether the key was present.
    pub fn update<F>(&self, key: &K, f: F) -> bool
    where
        F: FnOnce(&mut V),
    {
        let mut state = mutex_lock(&self.state, self.name, "update");
        state.advance_key(key.clone());
        match state.entries.get_mut(key) {
            Some(value) => {
                f(value);
                true
            }
            None => false,
        }
    }

    /// Remove one key. Missing keys are a no-op.
    pub fn remove(&self, key: &K) -> bool {
        let mut state = mutex_lock(&self.state, self.name, "remove");
        state.advance_key(key.clone());
        state.entries.pop(key).is_some()
    }

    /// Remove a batch of keys under a single lock acquisition.
    ///
    /// Returns how many of them were present.
    pub fn remove_many<'a, I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        let mut state = mutex_lock(&self.state, self.name, "remove_many");
        keys.into_iter()
            .filter(|key| {
                state.advance_key((*key).clone());
                state.entries.pop(*key).is_some()
            })
            .count()
    }

    /// Drop every entry.
    pub fn purge(&self) {
        let mut state = mutex_lock(&self.state, self.name, "purge");
        state.advance();
        state.entries.clear();
    }

    pub fn contains(&self, key: &K) -> bool {
        mutex_lock(&self.state, self.name, "contains")
            .entries
            .contains(key)
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.state, self.name, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        mutex_lock(&self.state, self.name, "capacity")
            .entries
            .cap()
            .get()
    }

    fn push(&self, state: &mut MemoState<K, V>, key: K, value: V) -> Option<K> {
        let replacing = state.entries.contains(&key);
        let evicted = state
            .entries
            .push(key, value)
            .filter(|_| !replacing)
            .map(|(evicted_key, _)| evicted_key);
        if evicted.is_some() {
            counter!(METRIC_EVICT, "cache" => self.name).increment(1);
        }
        evicted
    }
}
