use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use crate::types::{FetchRequest, FetchResponse, RequestKey, ServedFrom};

/// A stored response payload.
#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub key: RequestKey,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CachedEntry {
    pub fn from_response(key: RequestKey, response: &FetchResponse) -> Self {
        Self {
            key,
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
        }
    }

    pub fn into_response(self) -> FetchResponse {
        FetchResponse::new(self.status, self.headers, self.body).served_from(ServedFrom::Cache)
    }
}

/// One named bucket.
#[async_trait]
pub trait CacheBucket: Send + Sync {
    fn name(&self) -> &str;
    async fn match_request(&self, request: &FetchRequest) -> Result<Option<CachedEntry>>;
    async fn put(&self, entry: CachedEntry) -> Result<()>;
    async fn keys(&self) -> Result<Vec<RequestKey>>;
    async fn delete(&self, key: &RequestKey) -> Result<bool>;
}

/// The directory of buckets owned by the host.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a bucket, creating it if absent.
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheBucket>>;
    /// Look up a bucket without creating it.
    async fn get(&self, name: &str) -> Result<Option<Arc<dyn CacheBucket>>>;
    async fn has(&self, name: &str) -> Result<bool>;
    /// Remove a bucket and all its entries. Returns false if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool>;
    async fn keys(&self) -> Result<Vec<String>>;
}
