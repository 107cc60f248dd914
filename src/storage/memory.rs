// In-process cache storage. Buckets live as long as the storage value.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::traits::{CacheBucket, CacheStorage, CachedEntry};
use crate::types::{FetchRequest, RequestKey};

pub struct MemoryBucket {
    name: String,
    entries: RwLock<HashMap<RequestKey, CachedEntry>>,
}

impl MemoryBucket {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl CacheBucket for MemoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_request(&self, request: &FetchRequest) -> Result<Option<CachedEntry>> {
        let key = request.key();
        if !key.is_cacheable() {
            return Ok(None);
        }
        Ok(self.entries.read().get(&key).cloned())
    }

    async fn put(&self, entry: CachedEntry) -> Result<()> {
        entry.key.ensure_cacheable()?;
        debug!("memory bucket={} put {}", self.name, entry.key);
        self.entries.write().insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        let mut keys: Vec<RequestKey> = self.entries.read().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }
}

/// Buckets are kept in creation order, matching how the browser lists cache names.
#[derive(Default)]
pub struct MemoryCacheStorage {
    buckets: RwLock<Vec<Arc<MemoryBucket>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concrete handle to a bucket, if present.
    pub fn bucket(&self, name: &str) -> Option<Arc<MemoryBucket>> {
        self.buckets.read().iter().find(|b| b.name == name).cloned()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheBucket>> {
        if let Some(existing) = self.bucket(name) {
            return Ok(existing);
        }

        let mut buckets = self.buckets.write();
        // Double-check after acquiring the write lock.
        if let Some(existing) = buckets.iter().find(|b| b.name == name) {
            return Ok(existing.clone());
        }
        let bucket = Arc::new(MemoryBucket::new(name));
        buckets.push(bucket.clone());
        debug!("memory bucket created name={}", name);
        Ok(bucket)
    }

    async fn get(&self, name: &str) -> Result<Option<Arc<dyn CacheBucket>>> {
        Ok(self
            .bucket(name)
            .map(|bucket| bucket as Arc<dyn CacheBucket>))
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.bucket(name).is_some())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut buckets = self.buckets.write();
        let before = buckets.len();
        buckets.retain(|b| b.name != name);
        Ok(buckets.len() != before)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.buckets.read().iter().map(|b| b.name.clone()).collect())
    }
}
