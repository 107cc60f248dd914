// Shared fixtures: a scripted network and storage wrappers that inject failures.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode};
use parking_lot::RwLock;

use offline_cache_engine::error::EngineError;
use offline_cache_engine::network::traits::Fetcher;
use offline_cache_engine::storage::traits::{CacheBucket, CacheStorage, CachedEntry};
use offline_cache_engine::types::{FetchRequest, FetchResponse, RequestKey};

pub const ORIGIN: &str = "http://app.test";

/// Body served for each precached path of the app.
pub fn app_assets() -> Vec<(&'static str, &'static str)> {
    vec![
        ("/", "<html>root</html>"),
        ("/index.html", "<html>index</html>"),
        ("/manifest.json", "{\"name\":\"OksfordOS\"}"),
        ("/sw.js", "// worker"),
        ("/logo.png", "PNG"),
    ]
}

pub fn url(path: &str) -> String {
    format!("{}{}", ORIGIN, path)
}

/// Network stand-in with a fixed route table and an on/off switch.
pub struct MockFetcher {
    routes: RwLock<HashMap<String, (StatusCode, Bytes)>>,
    online: AtomicBool,
    calls: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
            online: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    /// A fetcher serving every app asset with 200.
    pub fn with_app_assets() -> Arc<Self> {
        let fetcher = Self::new();
        for (path, body) in app_assets() {
            fetcher.route(path, StatusCode::OK, body);
        }
        Arc::new(fetcher)
    }

    pub fn route(&self, path: &str, status: StatusCode, body: &'static str) {
        self.routes
            .write()
            .insert(url(path), (status, Bytes::from_static(body.as_bytes())));
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.online.load(Ordering::SeqCst) {
            return Err(EngineError::Network {
                url: request.url.to_string(),
                reason: "offline".into(),
            }
            .into());
        }

        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        let (status, body) = self
            .routes
            .read()
            .get(request.url.as_str())
            .cloned()
            .unwrap_or((StatusCode::NOT_FOUND, Bytes::from_static(b"not found")));
        Ok(FetchResponse::new(status, headers, body))
    }
}

/// Delegates to `inner` but fails deleting the named buckets.
pub struct FlakyDeleteStorage {
    pub inner: Arc<dyn CacheStorage>,
    pub fail_on: HashSet<String>,
}

#[async_trait]
impl CacheStorage for FlakyDeleteStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheBucket>> {
        self.inner.open(name).await
    }

    async fn get(&self, name: &str) -> Result<Option<Arc<dyn CacheBucket>>> {
        self.inner.get(name).await
    }

    async fn has(&self, name: &str) -> Result<bool> {
        self.inner.has(name).await
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        if self.fail_on.contains(name) {
            return Err(EngineError::Storage(format!("delete of {} refused", name)).into());
        }
        self.inner.delete(name).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }
}

/// Delegates to `inner` but fails the `fail_at`-th put (1-based).
pub struct FlakyPutBucket {
    pub inner: Arc<dyn CacheBucket>,
    pub fail_at: usize,
    puts: AtomicUsize,
}

impl FlakyPutBucket {
    pub fn new(inner: Arc<dyn CacheBucket>, fail_at: usize) -> Self {
        Self {
            inner,
            fail_at,
            puts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CacheBucket for FlakyPutBucket {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn match_request(&self, request: &FetchRequest) -> Result<Option<CachedEntry>> {
        self.inner.match_request(request).await
    }

    async fn put(&self, entry: CachedEntry) -> Result<()> {
        let n = self.puts.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_at {
            return Err(EngineError::Storage(format!("put of {} refused", entry.key)).into());
        }
        self.inner.put(entry).await
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        self.inner.keys().await
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool> {
        self.inner.delete(key).await
    }
}

/// Delegates to `inner`, but a bucket handed out by `get` is deleted from
/// `inner` before the caller can use it, as a concurrent activation would.
pub struct DeleteAfterGetStorage {
    pub inner: Arc<dyn CacheStorage>,
}

#[async_trait]
impl CacheStorage for DeleteAfterGetStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheBucket>> {
        self.inner.open(name).await
    }

    async fn get(&self, name: &str) -> Result<Option<Arc<dyn CacheBucket>>> {
        let bucket = self.inner.get(name).await?;
        self.inner.delete(name).await?;
        Ok(bucket)
    }

    async fn has(&self, name: &str) -> Result<bool> {
        self.inner.has(name).await
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        self.inner.delete(name).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }
}
