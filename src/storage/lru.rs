//! Bounded LRU map from page offset to in-memory page.
//!
//! Entries live in a slab and are threaded on a doubly-linked list (head is
//! most recently used) so promotion and eviction are O(1). Dirty values are
//! pinned: eviction walks from the tail toward the head for the oldest clean
//! entry and `set` fails when there is none.

use std::collections::HashMap;
use std::hash::Hash;

/// Values that may refuse eviction.
pub trait Evictable {
    fn is_dirty(&self) -> bool;
}

impl Evictable for crate::types::page::Page {
    fn is_dirty(&self) -> bool {
        self.is_dirty
    }
}

struct Entry<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

pub struct LruCache<K, V> {
    capacity: usize,
    map: HashMap<K, usize>,
    slab: Vec<Option<Entry<K, V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<K: Hash + Eq + Clone, V: Evictable> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            map: HashMap::with_capacity(capacity),
            slab: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Returns the value and marks it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let index = *self.map.get(key)?;
        self.move_to_front(index);
        self.slab[index].as_ref().map(|entry| &entry.value)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let index = *self.map.get(key)?;
        self.move_to_front(index);
        self.slab[index].as_mut().map(|entry| &mut entry.value)
    }

    /// Looks a value up without touching recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        let index = *self.map.get(key)?;
        self.slab[index].as_ref().map(|entry| &entry.value)
    }

    /// Inserts or replaces `key`, making it most recently used. Returns false
    /// when the cache is over capacity and every other entry is dirty; the
    /// new entry is not kept in that case.
    pub fn set(&mut self, key: K, value: V) -> bool {
        if let Some(&index) = self.map.get(&key) {
            if let Some(entry) = self.slab[index].as_mut() {
                entry.value = value;
            }
            self.move_to_front(index);
            return true;
        }

        let index = self.allocate(Entry {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        });
        self.map.insert(key, index);
        self.push_front(index);

        if self.map.len() <= self.capacity {
            return true;
        }

        let mut cursor = self.tail;
        while let Some(candidate) = cursor {
            if candidate == index {
                break;
            }
            let Some(entry) = self.slab[candidate].as_ref() else {
                break;
            };
            if !entry.value.is_dirty() {
                self.remove_index(candidate);
                return true;
            }
            cursor = entry.prev;
        }

        self.remove_index(index);
        false
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let index = *self.map.get(key)?;
        self.remove_index(index).map(|entry| entry.value)
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.map.len());
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let Some(entry) = self.slab[index].as_ref() else {
                break;
            };
            keys.push(entry.key.clone());
            cursor = entry.next;
        }
        keys
    }

    /// Mutable access to every value, in no particular order and without
    /// changing recency.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.slab
            .iter_mut()
            .filter_map(|slot| slot.as_mut().map(|entry| &mut entry.value))
    }

    fn allocate(&mut self, entry: Entry<K, V>) -> usize {
        match self.free.pop() {
            Some(index) => {
                self.slab[index] = Some(entry);
                index
            }
            None => {
                self.slab.push(Some(entry));
                self.slab.len() - 1
            }
        }
    }

    fn remove_index(&mut self, index: usize) -> Option<Entry<K, V>> {
        self.unlink(index);
        let entry = self.slab[index].take()?;
        self.map.remove(&entry.key);
        self.free.push(index);
        Some(entry)
    }

    fn move_to_front(&mut self, index: usize) {
        if self.head == Some(index) {
            return;
        }
        self.unlink(index);
        self.push_front(index);
    }

    fn push_front(&mut self, index: usize) {
        let old_head = self.head;
        if let Some(entry) = self.slab[index].as_mut() {
            entry.prev = None;
            entry.next = old_head;
        }
        if let Some(head) = old_head {
            if let Some(entry) = self.slab[head].as_mut() {
                entry.prev = Some(index);
            }
        }
        self.head = Some(index);
        if self.tail.is_none() {
            self.tail = Some(index);
        }
    }

    fn unlink(&mut self, index: usize) {
        let (prev, next) = match self.slab[index].as_mut() {
            Some(entry) => (entry.prev.take(), entry.next.take()),
            None => return,
        };
        match prev {
            Some(p) => {
                if let Some(entry) = self.slab[p].as_mut() {
                    entry.next = next;
                }
            }
            None => {
                if self.head == Some(index) {
                    self.head = next;
                }
            }
        }
        match next {
            Some(n) => {
                if let Some(entry) = self.slab[n].as_mut() {
                    entry.prev = prev;
                }
            }
            None => {
                if self.tail == Some(index) {
                    self.tail = prev;
                }
            }
        }
    }
}
