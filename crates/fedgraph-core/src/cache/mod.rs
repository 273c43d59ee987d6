//! Key/value persistence used by the graph registry and named views.

pub mod memory;
pub mod rocks;

pub use memory::MemoryCache;
pub use rocks::{KvCache, KvStore};

use fedgraph_common::config::{CacheBackend, CacheConfig};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use crate::error::{GraphError, Result};

pub trait CacheService: Send + Sync {
    fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Stores `value` only if `key` is unused; an occupied key fails with
    /// [`GraphError::AlreadyExists`].
    fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn get_all_keys(&self) -> Result<Vec<String>>;

    /// Keys starting with `prefix`, unordered.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Returns whether a value was removed.
    fn remove(&self, key: &str) -> Result<bool>;
}

/// Builds the configured backend.
pub fn open_cache(config: &CacheConfig) -> Result<Arc<dyn CacheService>> {
    match config.backend {
        CacheBackend::Memory => Ok(Arc::new(MemoryCache::new())),
        CacheBackend::Rocksdb => {
            if config.path.is_empty() {
                return Err(GraphError::Config("cache.path is required for the rocksdb backend".into()));
            }
            tracing::info!("Opening RocksDB cache at {}", config.path);
            Ok(Arc::new(KvCache::open(&config.path)?))
        }
    }
}

pub fn put_json<T: Serialize>(cache: &dyn CacheService, key: &str, value: &T) -> Result<()> {
    cache.put(key, serde_json::to_vec(value)?)
}

pub fn put_json_if_absent<T: Serialize>(cache: &dyn CacheService, key: &str, value: &T) -> Result<()> {
    cache.put_if_absent(key, serde_json::to_vec(value)?)
}

pub fn get_json<T: DeserializeOwned>(cache: &dyn CacheService, key: &str) -> Result<Option<T>> {
    match cache.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Keys under `prefix`, with the prefix stripped, in sorted order.
pub fn keys_with_prefix(cache: &dyn CacheService, prefix: &str) -> Result<Vec<String>> {
    let mut keys: Vec<String> = cache
        .scan_prefix(prefix)?
        .into_iter()
        .filter_map(|k| k.strip_prefix(prefix).map(str::to_string))
        .collect();
    keys.sort();
    Ok(keys)
}
