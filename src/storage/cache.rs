//! # LRU Page Cache
//!
//! A bounded map with least-recently-used eviction. Entries live in a
//! slab `Vec` threaded into a doubly-linked recency list by index, with a
//! `HashMap` from key to slot. Every `get` hit and `put` update moves the
//! touched entry to the front; inserting at capacity evicts the back.
//!
//! Each list node stores the key alongside the value so the eviction path
//! can erase the victim from the index. The list length and the index
//! size are equal at all times.
//!
//! Eviction does not write anything back: a dirty page evicted here stays
//! reachable through the `Arc` any in-flight caller holds, and is
//! persisted by an explicit write.

use eyre::{ensure, Result};
use hashbrown::HashMap;
use std::hash::Hash;

const NIL: usize = usize::MAX;

#[derive(Debug)]
struct Entry<K, V> {
    key: K,
    value: V,
    prev: usize,
    next: usize,
}

#[derive(Debug)]
pub struct LruCache<K, V> {
    capacity: usize,
    entries: Vec<Entry<K, V>>,
    index: HashMap<K, usize>,
    head: usize,
    tail: usize,
}

impl<K: Eq + Hash + Copy, V> LruCache<K, V> {
    pub fn new(capacity: usize) -> Result<Self> {
        ensure!(capacity > 0, "cache capacity must be positive");

        Ok(Self {
            capacity,
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            head: NIL,
            tail: NIL,
        })
    }

    /// Looks up `key`, promoting the entry to most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.detach(idx);
        self.attach_front(idx);
        Some(&self.entries[idx].value)
    }

    /// Inserts or updates `key`, promoting it to most recently used.
    /// At capacity the least recently used entry is evicted first.
    pub fn put(&mut self, key: K, value: V) {
        if let Some(&idx) = self.index.get(&key) {
            self.entries[idx].value = value;
            self.detach(idx);
            self.attach_front(idx);
            return;
        }

        if self.entries.len() >= self.capacity {
            let victim = self.tail;
            debug_assert_ne!(victim, NIL);
            self.detach(victim);
            self.index.remove(&self.entries[victim].key);

            self.entries[victim].key = key;
            self.entries[victim].value = value;
            self.index.insert(key, victim);
            self.attach_front(victim);
            return;
        }

        let idx = self.entries.len();
        self.entries.push(Entry {
            key,
            value,
            prev: NIL,
            next: NIL,
        });
        self.index.insert(key, idx);
        self.attach_front(idx);
    }

    /// Looks up `key` without touching recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.index.get(key).map(|&idx| &self.entries[idx].value)
    }

    pub fn len(&self) -> usize {
        debug_assert_eq!(self.entries.len(), self.index.len());
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = (self.entries[idx].prev, self.entries[idx].next);

        if prev != NIL {
            self.entries[prev].next = next;
        } else if self.head == idx {
            self.head = next;
        }

        if next != NIL {
            self.entries[next].prev = prev;
        } else if self.tail == idx {
            self.tail = prev;
        }

        self.entries[idx].prev = NIL;
        self.entries[idx].next = NIL;
    }

    fn attach_front(&mut self, idx: usize) {
        self.entries[idx].prev = NIL;
        self.entries[idx].next = self.head;

        if self.head != NIL {
            self.entries[self.head].prev = idx;
        }
        self.head = idx;

        if self.tail == NIL {
            self.tail = idx;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_and_get_round_trip() {
        let mut cache = LruCache::new(4).unwrap();

        cache.put(10, "ten");
        cache.put(11, "eleven");

        assert_eq!(cache.get(&10), Some(&"ten"));
        assert_eq!(cache.get(&11), Some(&"eleven"));
        assert_eq!(cache.get(&12), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn put_existing_key_updates_value_and_recency() {
        let mut cache = LruCache::new(3).unwrap();

        cache.put(10, "ten");
        cache.put(11, "eleven");
        cache.put(12, "twelve");
        cache.put(10, "value");

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get(&10), Some(&"value"));

        // 11 is now the coldest entry and the next victim.
        cache.put(13, "thirteen");
        assert_eq!(cache.get(&11), None);
        assert_eq!(cache.get(&12), Some(&"twelve"));
    }

    #[test]
    fn eviction_removes_least_recently_used() {
        let mut cache = LruCache::new(2).unwrap();

        cache.put(1, 'a');
        cache.put(2, 'b');
        cache.put(3, 'c');

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(&'b'));
        assert_eq!(cache.get(&3), Some(&'c'));
    }

    #[test]
    fn get_protects_entry_from_eviction() {
        let mut cache = LruCache::new(2).unwrap();

        cache.put(1, 'a');
        cache.put(2, 'b');
        cache.get(&1);
        cache.put(3, 'c');

        assert_eq!(cache.get(&1), Some(&'a'));
        assert_eq!(cache.get(&2), None);
    }

    #[test]
    fn len_never_exceeds_capacity() {
        let mut cache = LruCache::new(5).unwrap();

        for i in 0..100 {
            cache.put(i, i * 2);
            assert!(cache.len() <= 5);
        }
        assert_eq!(cache.len(), 5);

        for i in 95..100 {
            assert_eq!(cache.get(&i), Some(&(i * 2)));
        }
    }

    #[test]
    fn most_recently_touched_key_is_never_the_next_victim() {
        let mut cache = LruCache::new(3).unwrap();

        for i in 0..3 {
            cache.put(i, i);
        }

        for round in 0..20 {
            let hot = round % 3;
            cache.put(hot, hot);
            cache.put(100 + round, round);

            assert!(cache.peek(&hot).is_some(), "hot key {hot} was evicted");
        }
    }

    #[test]
    fn peek_does_not_promote() {
        let mut cache = LruCache::new(2).unwrap();

        cache.put(1, 'a');
        cache.put(2, 'b');
        cache.peek(&1);
        cache.put(3, 'c');

        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(LruCache::<i64, ()>::new(0).is_err());
    }

    #[test]
    fn single_slot_cache_replaces_on_every_insert() {
        let mut cache = LruCache::new(1).unwrap();

        cache.put(1, 'a');
        cache.put(2, 'b');

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.get(&2), Some(&'b'));
    }
}
