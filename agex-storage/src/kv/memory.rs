//! In-memory KV backend, the default for `Ephemeral`/unit tests.

use super::KvBackend;
use std::cell::RefCell;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: RefCell<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.data.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: Vec<u8>) {
        self.data.borrow_mut().insert(key.to_string(), value);
    }

    fn items(&self) -> Vec<(String, Vec<u8>)> {
        self.data
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn remove(&self, key: &str) -> bool {
        self.data.borrow_mut().remove(key).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_value() {
        let kv = MemoryBackend::new();
        kv.set("k", vec![1, 2, 3]);
        assert_eq!(kv.get("k"), Some(vec![1, 2, 3]));
        assert!(kv.contains("k"));
        assert!(!kv.contains("missing"));
    }

    #[test]
    fn remove_reports_whether_a_key_existed() {
        let kv = MemoryBackend::new();
        kv.set("k", vec![1]);
        assert!(kv.remove("k"));
        assert!(!kv.remove("k"));
    }
}
