use anyhow::anyhow;
use rocksdb::{Direction, IteratorMode, Options, DB};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::CacheService;
use crate::error::{GraphError, Result};

/// Thin RocksDB wrapper; errors stay in `anyhow` until they cross into the
/// cache contract.
#[derive(Clone)]
pub struct KvStore {
    db: Arc<DB>,
}

impl KvStore {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> anyhow::Result<()> {
        self.db.put(key, value)?;
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    pub fn delete(&self, key: &[u8]) -> anyhow::Result<()> {
        self.db.delete(key)?;
        Ok(())
    }

    /// All keys, in byte order.
    pub fn keys(&self) -> anyhow::Result<Vec<Vec<u8>>> {
        let mut keys = Vec::new();
        for item in self.db.iterator(IteratorMode::Start) {
            let (k, _) = item?;
            keys.push(k.to_vec());
        }
        Ok(keys)
    }

    /// Keys starting with `prefix`, in byte order.
    pub fn scan_keys(&self, prefix: &[u8]) -> anyhow::Result<Vec<Vec<u8>>> {
        // Explicit seek: prefix_iterator needs a configured prefix extractor.
        let iter = self.db.iterator(IteratorMode::From(prefix, Direction::Forward));
        let mut keys = Vec::new();
        for item in iter {
            let (k, _) = item?;
            if !k.starts_with(prefix) {
                break;
            }
            keys.push(k.to_vec());
        }
        Ok(keys)
    }
}

/// Cache persisted in RocksDB, surviving restarts.
pub struct KvCache {
    kv: KvStore,
    // Serialises check-then-write for put_if_absent and remove.
    write_lock: Mutex<()>,
}

impl KvCache {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            kv: KvStore::open(path)?,
            write_lock: Mutex::new(()),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| GraphError::from(anyhow!("cache write lock poisoned")))
    }
}

fn utf8_key(key: Vec<u8>) -> Result<String> {
    String::from_utf8(key).map_err(|e| GraphError::Cache(e.to_string()))
}

impl CacheService for KvCache {
    fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let _guard = self.lock()?;
        self.kv.put(key.as_bytes(), &value)?;
        Ok(())
    }

    fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let _guard = self.lock()?;
        if self.kv.get(key.as_bytes())?.is_some() {
            return Err(GraphError::AlreadyExists(format!("cache key {}", key)));
        }
        self.kv.put(key.as_bytes(), &value)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.kv.get(key.as_bytes())?)
    }

    fn get_all_keys(&self) -> Result<Vec<String>> {
        self.kv
            .keys()?
            .into_iter()
            .map(utf8_key)
            .collect()
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        self.kv
            .scan_keys(prefix.as_bytes())?
            .into_iter()
            .map(utf8_key)
            .collect()
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let _guard = self.lock()?;
        let existed = self.kv.get(key.as_bytes())?.is_some();
        if existed {
            self.kv.delete(key.as_bytes())?;
        }
        Ok(existed)
    }
}
