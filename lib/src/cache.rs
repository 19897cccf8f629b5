//! Shared LRU response cache.
//!
//! Entries are keyed by the raw request bytes a client sent and hold the
//! raw upstream response. Storage is a [`Slab`] indexed by a `HashMap`,
//! with an intrusive doubly-linked recency list threaded through the slots:
//! lookup, promotion to MRU and LRU eviction are all O(1).
//!
//! Bodies are handed out as `Arc<[u8]>` clones, so an entry evicted while
//! another worker is still replying from it keeps its storage alive until
//! that reply is done.

use std::collections::HashMap;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use slab::Slab;

/// Default upper bound on the summed accounted size of all entries.
pub const DEFAULT_MAX_CACHE_BYTES: usize = 200 * (1 << 20);
/// Default upper bound on the accounted size of a single entry.
pub const DEFAULT_MAX_ELEMENT_BYTES: usize = 10 * (1 << 20);

/// Per-entry bookkeeping charge. Folded into the accounted size so charge
/// and refund always use the same formula.
const ENTRY_OVERHEAD: usize = mem::size_of::<Entry>();

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InsertError {
    #[error("entry of {size} bytes exceeds the {limit} bytes per-element limit")]
    EntryTooLarge { size: usize, limit: usize },
    #[error("entry of {size} bytes cannot fit in a cache of {limit} bytes")]
    CacheTooSmall { size: usize, limit: usize },
}

struct Entry {
    key: Arc<[u8]>,
    body: Arc<[u8]>,
    /// Accounted size: `body.len() + key.len() + ENTRY_OVERHEAD`.
    size: usize,
    last_used: u64,
    prev: Option<usize>,
    next: Option<usize>,
}

/// The cache structure itself, without locking. [`Cache`] wraps it for
/// cross-thread use.
pub struct LruCache {
    entries: Slab<Entry>,
    index: HashMap<Arc<[u8]>, usize>,
    /// Most recently used slot.
    head: Option<usize>,
    /// Least recently used slot, evicted first.
    tail: Option<usize>,
    current_size: usize,
    tick: u64,
    max_bytes: usize,
    max_element_bytes: usize,
}

impl LruCache {
    pub fn new(max_bytes: usize, max_element_bytes: usize) -> LruCache {
        LruCache {
            entries: Slab::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
            current_size: 0,
            tick: 0,
            max_bytes,
            max_element_bytes,
        }
    }

    /// Returns the body stored under `key` and promotes the entry to MRU.
    pub fn lookup(&mut self, key: &[u8]) -> Option<Arc<[u8]>> {
        let slot = *self.index.get(key)?;
        self.unlink(slot);
        self.push_front(slot);
        self.tick += 1;
        let entry = &mut self.entries[slot];
        entry.last_used = self.tick;
        Some(entry.body.clone())
    }

    /// Stores `body` under `key` as the MRU entry, evicting LRU entries
    /// until it fits. A key already present is replaced. Entries larger
    /// than the per-element limit are rejected and the cache is left
    /// untouched.
    pub fn insert(&mut self, key: &[u8], body: &[u8]) -> Result<(), InsertError> {
        let size = body.len() + key.len() + ENTRY_OVERHEAD;
        if size > self.max_element_bytes {
            return Err(InsertError::EntryTooLarge {
                size,
                limit: self.max_element_bytes,
            });
        }

        if let Some(slot) = self.index.get(key).copied() {
            self.remove(slot);
        }
        while self.current_size + size > self.max_bytes {
            match self.tail {
                Some(slot) => self.remove(slot),
                None => {
                    return Err(InsertError::CacheTooSmall {
                        size,
                        limit: self.max_bytes,
                    })
                }
            }
        }

        let key: Arc<[u8]> = Arc::from(key);
        self.tick += 1;
        let slot = self.entries.insert(Entry {
            key: key.clone(),
            body: Arc::from(body),
            size,
            last_used: self.tick,
            prev: None,
            next: None,
        });
        self.index.insert(key, slot);
        self.push_front(slot);
        self.current_size += size;
        Ok(())
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Summed accounted size of all entries.
    pub fn current_size(&self) -> usize {
        self.current_size
    }

    fn remove(&mut self, slot: usize) {
        self.unlink(slot);
        let entry = self.entries.remove(slot);
        self.index.remove(&entry.key);
        self.current_size -= entry.size;
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = {
            let entry = &self.entries[slot];
            (entry.prev, entry.next)
        };
        match prev {
            Some(prev) => self.entries[prev].next = next,
            None => {
                if self.head == Some(slot) {
                    self.head = next;
                }
            }
        }
        match next {
            Some(next) => self.entries[next].prev = prev,
            None => {
                if self.tail == Some(slot) {
                    self.tail = prev;
                }
            }
        }
        let entry = &mut self.entries[slot];
        entry.prev = None;
        entry.next = None;
    }

    fn push_front(&mut self, slot: usize) {
        let old_head = self.head;
        {
            let entry = &mut self.entries[slot];
            entry.prev = None;
            entry.next = old_head;
        }
        if let Some(old_head) = old_head {
            self.entries[old_head].prev = Some(slot);
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }

    /// Keys from MRU to LRU, for recency assertions.
    #[cfg(test)]
    fn keys_by_recency(&self) -> Vec<Vec<u8>> {
        let mut keys = Vec::with_capacity(self.entries.len());
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            let entry = &self.entries[slot];
            keys.push(entry.key.to_vec());
            cursor = entry.next;
        }
        keys
    }
}

/// Cloneable, thread-safe handle over an [`LruCache`].
///
/// Every operation takes the single cache lock for its whole duration,
/// body-handle clone included. The lock is never held across upstream I/O.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<Mutex<LruCache>>,
}

impl Cache {
    pub fn new(max_bytes: usize, max_element_bytes: usize) -> Cache {
        Cache {
            inner: Arc::new(Mutex::new(LruCache::new(max_bytes, max_element_bytes))),
        }
    }

    pub fn lookup(&self, key: &[u8]) -> Option<Arc<[u8]>> {
        self.lock().lookup(key)
    }

    pub fn insert(&self, key: &[u8], body: &[u8]) -> Result<(), InsertError> {
        self.lock().insert(key, body)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn current_size(&self) -> usize {
        self.lock().current_size()
    }

    fn lock(&self) -> MutexGuard<LruCache> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
