//! On-disk KV backend, memory-mapped via `heed` (LMDB bindings), with a
//! configurable size ceiling (spec.md §4.3 "KV backends: Disk").

use super::KvBackend;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum DiskBackendError {
    #[error("failed to open LMDB environment at {path}: {reason}")]
    EnvOpen { path: String, reason: String },

    #[error("failed to open database: {0}")]
    DbOpen(String),

    #[error("transaction error: {0}")]
    Transaction(String),
}

pub struct DiskBackend {
    env: Env,
    db: Database<Bytes, Bytes>,
    max_size_bytes: u64,
}

impl std::fmt::Debug for DiskBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskBackend")
            .field("max_size_bytes", &self.max_size_bytes)
            .finish()
    }
}

impl DiskBackend {
    /// Open (creating if absent) an LMDB environment at `path`, capped at
    /// `max_size_mb` megabytes of map size.
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, DiskBackendError> {
        std::fs::create_dir_all(&path).map_err(|e| DiskBackendError::EnvOpen {
            path: path.as_ref().display().to_string(),
            reason: e.to_string(),
        })?;

        let map_size = max_size_mb * 1024 * 1024;
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| DiskBackendError::EnvOpen {
            path: path.as_ref().display().to_string(),
            reason: e.to_string(),
        })?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| DiskBackendError::Transaction(e.to_string()))?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| DiskBackendError::DbOpen(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| DiskBackendError::Transaction(e.to_string()))?;

        Ok(Self {
            env,
            db,
            max_size_bytes: map_size as u64,
        })
    }

    fn current_size(&self) -> u64 {
        let Ok(rtxn) = self.env.read_txn() else {
            return 0;
        };
        let Ok(iter) = self.db.iter(&rtxn) else {
            return 0;
        };
        iter.filter_map(Result::ok)
            .map(|(k, v)| (k.len() + v.len()) as u64)
            .sum()
    }
}

impl KvBackend for DiskBackend {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let rtxn = self.env.read_txn().ok()?;
        self.db.get(&rtxn, key.as_bytes()).ok().flatten().map(|v| v.to_vec())
    }

    fn set(&self, key: &str, value: Vec<u8>) {
        if self.current_size() + value.len() as u64 > self.max_size_bytes {
            tracing::warn!(key = %key, "disk backend at size limit, dropping write");
            return;
        }
        let Ok(mut wtxn) = self.env.write_txn() else {
            tracing::error!(key = %key, "failed to open write transaction");
            return;
        };
        if let Err(e) = self.db.put(&mut wtxn, key.as_bytes(), &value) {
            tracing::error!(key = %key, error = %e, "failed to write to disk backend");
            return;
        }
        if let Err(e) = wtxn.commit() {
            tracing::error!(key = %key, error = %e, "failed to commit disk backend write");
        }
    }

    fn items(&self) -> Vec<(String, Vec<u8>)> {
        let Ok(rtxn) = self.env.read_txn() else {
            return Vec::new();
        };
        let Ok(iter) = self.db.iter(&rtxn) else {
            return Vec::new();
        };
        iter.filter_map(Result::ok)
            .filter_map(|(k, v)| {
                std::str::from_utf8(k).ok().map(|k| (k.to_string(), v.to_vec()))
            })
            .collect()
    }

    fn remove(&self, key: &str) -> bool {
        let Ok(mut wtxn) = self.env.write_txn() else {
            return false;
        };
        let removed = self.db.delete(&mut wtxn, key.as_bytes()).unwrap_or(false);
        let _ = wtxn.commit();
        removed
    }

    fn get_many(&self, keys: &[String]) -> HashMap<String, Vec<u8>> {
        let Ok(rtxn) = self.env.read_txn() else {
            return HashMap::new();
        };
        keys.iter()
            .filter_map(|k| {
                self.db
                    .get(&rtxn, k.as_bytes())
                    .ok()
                    .flatten()
                    .map(|v| (k.clone(), v.to_vec()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_through_lmdb() {
        let dir = tempdir().unwrap();
        let backend = DiskBackend::open(dir.path(), 16).unwrap();
        backend.set("k", vec![1, 2, 3]);
        assert_eq!(backend.get("k"), Some(vec![1, 2, 3]));
    }

    #[test]
    fn oversized_write_is_dropped_not_panicked() {
        let dir = tempdir().unwrap();
        let backend = DiskBackend::open(dir.path(), 1).unwrap();
        backend.set("huge", vec![0u8; 2 * 1024 * 1024]);
        assert!(backend.get("huge").is_none());
    }
}
