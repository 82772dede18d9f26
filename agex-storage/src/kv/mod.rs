//! KV backend contract (spec.md §4.3 "KV backends"): interchangeable
//! byte-level storage. Serialization is the `State` layer's job; a
//! backend only ever sees raw bytes.

mod cache;
mod disk;
mod memory;

pub use cache::CacheBackend;
pub use disk::DiskBackend;
pub use memory::MemoryBackend;

use std::collections::HashMap;
use std::fmt;

/// Interchangeable byte-level KV storage. Not required to be thread-safe
/// (spec.md §5); callers sharing a backend across threads serialize
/// access externally.
pub trait KvBackend: fmt::Debug {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn set(&self, key: &str, value: Vec<u8>);
    fn set_many(&self, items: HashMap<String, Vec<u8>>) {
        for (k, v) in items {
            self.set(&k, v);
        }
    }
    fn get_many(&self, keys: &[String]) -> HashMap<String, Vec<u8>> {
        keys.iter()
            .filter_map(|k| self.get(k).map(|v| (k.clone(), v)))
            .collect()
    }
    fn items(&self) -> Vec<(String, Vec<u8>)>;
    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
    fn remove(&self, key: &str) -> bool;
}
