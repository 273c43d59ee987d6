use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::CacheService;
use crate::error::{GraphError, Result};

/// Process-local cache; contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheService for MemoryCache {
    fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<()> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(_) => Err(GraphError::AlreadyExists(format!("cache key {}", key))),
            Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(())
            }
        }
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn get_all_keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.iter().map(|e| e.key().clone()).collect())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{get_json, keys_with_prefix, put_json};

    #[test]
    fn test_put_if_absent_rejects_existing_key() {
        let cache = MemoryCache::new();
        cache.put_if_absent("a", b"1".to_vec()).unwrap();
        let err = cache.put_if_absent("a", b"2".to_vec()).unwrap_err();
        assert!(matches!(err, GraphError::AlreadyExists(_)));
        assert_eq!(cache.get("a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_json_helpers_and_prefix_listing() {
        let cache = MemoryCache::new();
        put_json(&cache, "graphs:b", &vec![1, 2]).unwrap();
        put_json(&cache, "graphs:a", &vec![3]).unwrap();
        put_json(&cache, "views:x", &"v").unwrap();

        assert_eq!(keys_with_prefix(&cache, "graphs:").unwrap(), vec!["a", "b"]);
        assert_eq!(get_json::<Vec<i32>>(&cache, "graphs:b").unwrap(), Some(vec![1, 2]));
        assert!(cache.remove("graphs:b").unwrap());
        assert!(!cache.remove("graphs:b").unwrap());
        assert_eq!(get_json::<Vec<i32>>(&cache, "graphs:b").unwrap(), None);
    }
}
