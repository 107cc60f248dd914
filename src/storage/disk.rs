// On-disk cache storage. One directory per bucket, a metadata/body file pair per entry.
//
// Layout: <root>/<hex(bucket name)>/<sha256(key)>.json + .body
// The .json file is written last and acts as the commit marker for an entry.
// Overwriting an entry swaps the body in before the metadata, so a concurrent
// reader may briefly pair old metadata with the new body. Install is the only
// writer, and it runs before the bucket serves any fetch.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};

use super::traits::{CacheBucket, CacheStorage, CachedEntry};
use crate::error::EngineError;
use crate::types::{FetchRequest, RequestKey};

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    method: String,
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    stored_at: u64,
}

fn entry_stem(key: &RequestKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

fn headers_to_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect()
}

fn pairs_to_headers(pairs: &[(String, String)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (k, v) in pairs {
        match (HeaderName::try_from(k.as_str()), HeaderValue::try_from(v.as_str())) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!("dropping unparsable stored header {}", k),
        }
    }
    headers
}

/// Write `data` to `path` through a temp file in the same directory.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_extension(format!("{}.tmp", seq));
    fs::write(&tmp, data)
        .await
        .with_context(|| format!("write {}", tmp.display()))?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(anyhow!("rename {} -> {}: {}", tmp.display(), path.display(), e));
    }
    Ok(())
}

pub struct DiskBucket {
    name: String,
    dir: PathBuf,
}

impl DiskBucket {
    fn meta_path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{}.json", stem))
    }

    fn body_path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{}.body", stem))
    }

    async fn read_meta(path: &Path) -> Result<Option<EntryMeta>> {
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(EngineError::Storage(format!("{}: {}", path.display(), e)).into()),
        };
        let meta = serde_json::from_slice(&raw)
            .map_err(|e| EngineError::Storage(format!("corrupt entry {}: {}", path.display(), e)))?;
        Ok(Some(meta))
    }
}

#[async_trait]
impl CacheBucket for DiskBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_request(&self, request: &FetchRequest) -> Result<Option<CachedEntry>> {
        let key = request.key();
        if !key.is_cacheable() {
            return Ok(None);
        }

        let stem = entry_stem(&key);
        let meta = match Self::read_meta(&self.meta_path(&stem)).await? {
            Some(meta) => meta,
            None => return Ok(None),
        };

        let body_path = self.body_path(&stem);
        let body = fs::read(&body_path)
            .await
            .map_err(|e| EngineError::Storage(format!("{}: {}", body_path.display(), e)))?;
        let status = StatusCode::from_u16(meta.status)
            .map_err(|_| EngineError::Storage(format!("bad stored status {}", meta.status)))?;

        Ok(Some(CachedEntry {
            key,
            status,
            headers: pairs_to_headers(&meta.headers),
            body: Bytes::from(body),
        }))
    }

    async fn put(&self, entry: CachedEntry) -> Result<()> {
        entry.key.ensure_cacheable()?;

        let stem = entry_stem(&entry.key);
        let stored_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let meta = EntryMeta {
            method: entry.key.method.clone(),
            url: entry.key.url.clone(),
            status: entry.status.as_u16(),
            headers: headers_to_pairs(&entry.headers),
            stored_at,
        };
        let meta_json = serde_json::to_vec(&meta)?;

        write_atomic(&self.body_path(&stem), &entry.body).await?;
        write_atomic(&self.meta_path(&stem), &meta_json).await?;

        debug!(
            "disk bucket={} put {} bytes={}",
            self.name,
            entry.key,
            entry.body.len()
        );
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        let mut keys = Vec::new();
        let mut dir = fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("list bucket {}", self.dir.display()))?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_meta(&path).await {
                Ok(Some(meta)) => keys.push(RequestKey {
                    method: meta.method,
                    url: meta.url,
                }),
                Ok(None) => {}
                Err(e) => warn!("skipping entry {}: {}", path.display(), e),
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool> {
        let stem = entry_stem(key);
        let existed = match fs::remove_file(self.meta_path(&stem)).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        match fs::remove_file(self.body_path(&stem)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(existed)
    }
}

/// Buckets persisted under a root directory; they survive process restarts.
pub struct DiskCacheStorage {
    root: PathBuf,
}

impl DiskCacheStorage {
    /// Create (if needed) the root directory and return a storage over it.
    pub fn new(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)
            .with_context(|| format!("create cache root {}", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn bucket_dir(&self, name: &str) -> PathBuf {
        self.root.join(hex::encode(name.as_bytes()))
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheBucket>> {
        let dir = self.bucket_dir(name);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| EngineError::Storage(format!("open bucket {}: {}", name, e)))?;
        Ok(Arc::new(DiskBucket {
            name: name.to_string(),
            dir,
        }))
    }

    async fn get(&self, name: &str) -> Result<Option<Arc<dyn CacheBucket>>> {
        let dir = self.bucket_dir(name);
        if !fs::try_exists(&dir).await? {
            return Ok(None);
        }
        Ok(Some(Arc::new(DiskBucket {
            name: name.to_string(),
            dir,
        })))
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(fs::try_exists(self.bucket_dir(name)).await?)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        match fs::remove_dir_all(self.bucket_dir(name)).await {
            Ok(()) => {
                debug!("disk bucket deleted name={}", name);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(EngineError::Storage(format!("delete bucket {}: {}", name, e)).into()),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = fs::read_dir(&self.root)
            .await
            .with_context(|| format!("list cache root {}", self.root.display()))?;
        while let Some(item) = dir.next_entry().await? {
            if !item.file_type().await?.is_dir() {
                continue;
            }
            let decoded = item
                .file_name()
                .to_str()
                .and_then(|s| hex::decode(s).ok())
                .and_then(|raw| String::from_utf8(raw).ok());
            if let Some(name) = decoded {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_stem_is_stable_hex() {
        let key = RequestKey {
            method: "GET".into(),
            url: "http://app.test/".into(),
        };
        let stem = entry_stem(&key);
        assert_eq!(stem.len(), 64);
        assert_eq!(stem, entry_stem(&key.clone()));
    }

    #[test]
    fn test_header_pairs_keep_repeated_values() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/html"));
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));
        let restored = pairs_to_headers(&headers_to_pairs(&headers));
        assert_eq!(restored.get_all("set-cookie").iter().count(), 2);
        assert_eq!(restored["content-type"], "text/html");
    }
}
