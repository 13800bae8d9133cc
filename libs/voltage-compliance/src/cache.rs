//! Result cache
//!
//! Bounded least-recently-used cache keyed by a fingerprint of the fields
//! that rules actually read. Get, insert and eviction are O(1):
//!
//! ```text
//!   index: FxHashMap<K, slot>
//!              │
//!              ▼
//!   head ⇄ [slot] ⇄ [slot] ⇄ ... ⇄ [slot] ⇄ tail
//!   (most recent)                  (evicted first)
//! ```

use crate::types::{CircuitRecord, ValidationResult};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

const NIL: usize = usize::MAX;

struct Entry<K, V> {
    key: K,
    value: V,
    prev: usize,
    next: usize,
}

/// Arena-backed LRU map
pub struct LruCache<K, V> {
    capacity: usize,
    index: FxHashMap<K, usize>,
    slots: Vec<Entry<K, V>>,
    head: usize,
    tail: usize,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    /// A capacity of zero disables storage entirely
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            index: FxHashMap::default(),
            slots: Vec::with_capacity(capacity.min(1024)),
            head: NIL,
            tail: NIL,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up and mark as most recently used
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = *self.index.get(key)?;
        self.detach(slot);
        self.push_front(slot);
        Some(&self.slots[slot].value)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.contains_key(key)
    }

    /// Insert or refresh; returns true when an entry had to be evicted
    pub fn insert(&mut self, key: K, value: V) -> bool {
        if self.capacity == 0 {
            return false;
        }

        if let Some(&slot) = self.index.get(&key) {
            self.slots[slot].value = value;
            self.detach(slot);
            self.push_front(slot);
            return false;
        }

        if self.index.len() >= self.capacity {
            // Reuse the tail slot for the new entry
            let slot = self.tail;
            self.detach(slot);
            let old = std::mem::replace(
                &mut self.slots[slot],
                Entry {
                    key: key.clone(),
                    value,
                    prev: NIL,
                    next: NIL,
                },
            );
            self.index.remove(&old.key);
            self.index.insert(key, slot);
            self.push_front(slot);
            return true;
        }

        let slot = self.slots.len();
        self.slots.push(Entry {
            key: key.clone(),
            value,
            prev: NIL,
            next: NIL,
        });
        self.index.insert(key, slot);
        self.push_front(slot);
        false
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    fn detach(&mut self, slot: usize) {
        let (prev, next) = (self.slots[slot].prev, self.slots[slot].next);
        if prev == NIL {
            self.head = next;
        } else {
            self.slots[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.slots[next].prev = prev;
        }
        self.slots[slot].prev = NIL;
        self.slots[slot].next = NIL;
    }

    fn push_front(&mut self, slot: usize) {
        self.slots[slot].next = self.head;
        self.slots[slot].prev = NIL;
        if self.head != NIL {
            self.slots[self.head].prev = slot;
        }
        self.head = slot;
        if self.tail == NIL {
            self.tail = slot;
        }
    }
}

// ============================================================================
// Fingerprint
// ============================================================================

/// Cache key over the rule-relevant fields of a record
///
/// One `<len>:<field>=<len>:<value>;` entry per present field, in the order
/// given. Values are length-prefixed, so text holding separators cannot
/// imitate other fields. Numeric fields collapse to their number, so `"6"`
/// and `6` share a key; text fields keep the trimmed text. The circuit id
/// is not part of the key.
pub fn fingerprint(data: &CircuitRecord, fields: &[&str]) -> String {
    let mut key = String::with_capacity(fields.len() * 24);
    for field in fields {
        if let Some(value) = data.get(field).and_then(|v| v.key_form(field)) {
            key.push_str(&format!("{}:{}={}:{};", field.len(), field, value.len(), value));
        }
    }
    key
}

// ============================================================================
// Result Cache
// ============================================================================

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

/// Thread-safe LRU of validation results
pub struct ResultCache {
    inner: Mutex<LruCache<String, ValidationResult>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<ValidationResult> {
        let found = self.inner.lock().get(key).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn insert(&self, key: String, result: ValidationResult) {
        if self.inner.lock().insert(key, result) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Drop all entries; counters are kept
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        let (size, capacity) = {
            let inner = self.inner.lock();
            (inner.len(), inner.capacity())
        };
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        CacheStats {
            size,
            capacity,
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache").field("stats", &self.stats()).finish()
    }
}
