//! Write-through, bounded-size cache over any backing `KvBackend`
//! (spec.md §4.3 "KV backends: Cache").

use super::KvBackend;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashMap;

pub struct CacheBackend {
    backing: Box<dyn KvBackend>,
    capacity: usize,
    // Insertion-ordered map doubling as an LRU queue: re-inserting a key
    // moves it to the back (most-recently-used).
    hot: RefCell<IndexMap<String, Vec<u8>>>,
}

impl std::fmt::Debug for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheBackend")
            .field("capacity", &self.capacity)
            .field("hot_len", &self.hot.borrow().len())
            .finish()
    }
}

impl CacheBackend {
    pub fn new(backing: Box<dyn KvBackend>, capacity: usize) -> Self {
        Self {
            backing,
            capacity: capacity.max(1),
            hot: RefCell::new(IndexMap::new()),
        }
    }

    fn touch(&self, key: &str, value: Vec<u8>) {
        let mut hot = self.hot.borrow_mut();
        hot.shift_remove(key);
        hot.insert(key.to_string(), value);
        while hot.len() > self.capacity {
            hot.shift_remove_index(0);
        }
    }
}

impl KvBackend for CacheBackend {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        if let Some(v) = self.hot.borrow().get(key).cloned() {
            self.touch(key, v.clone());
            return Some(v);
        }
        let v = self.backing.get(key)?;
        self.touch(key, v.clone());
        Some(v)
    }

    fn set(&self, key: &str, value: Vec<u8>) {
        self.backing.set(key, value.clone());
        self.touch(key, value);
    }

    fn items(&self) -> Vec<(String, Vec<u8>)> {
        self.backing.items()
    }

    fn contains(&self, key: &str) -> bool {
        self.hot.borrow().contains_key(key) || self.backing.contains(key)
    }

    fn remove(&self, key: &str) -> bool {
        self.hot.borrow_mut().shift_remove(key);
        self.backing.remove(key)
    }

    fn get_many(&self, keys: &[String]) -> HashMap<String, Vec<u8>> {
        keys.iter().filter_map(|k| self.get(k).map(|v| (k.clone(), v))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryBackend;

    #[test]
    fn reads_are_served_from_backing_on_cold_cache() {
        let backing = MemoryBackend::new();
        backing.set("k", vec![9]);
        let cache = CacheBackend::new(Box::new(backing), 4);
        assert_eq!(cache.get("k"), Some(vec![9]));
    }

    #[test]
    fn writes_are_visible_through_the_backing_store() {
        let backing = Box::new(MemoryBackend::new());
        let cache = CacheBackend::new(backing, 4);
        cache.set("k", vec![1]);
        assert_eq!(cache.get("k"), Some(vec![1]));
    }

    #[test]
    fn eviction_respects_capacity() {
        let cache = CacheBackend::new(Box::new(MemoryBackend::new()), 2);
        cache.set("a", vec![1]);
        cache.set("b", vec![2]);
        cache.set("c", vec![3]);
        assert_eq!(cache.hot.borrow().len(), 2);
        // "a" was evicted from the hot set but is still reachable via the
        // write-through backing store.
        assert_eq!(cache.get("a"), Some(vec![1]));
    }
}
