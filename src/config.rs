use std::path::Path;

use anyhow::{Context, Result};
use reqwest::Url;
use serde::Deserialize;

use crate::error::EngineError;

/// Version string naming the current cache bucket.
pub const CACHE_VERSION: &str = "oksfordos-v2";

/// Static assets stored during install, in order.
pub const PRECACHE_URLS: [&str; 5] = ["/", "/index.html", "/manifest.json", "/sw.js", "/logo.png"];

/// Document served when a request misses the cache and the network is down.
pub const OFFLINE_FALLBACK_PATH: &str = "/index.html";

/// Origin assumed when none is configured.
pub const DEFAULT_ORIGIN: &str = "http://127.0.0.1:8080";

/// Response header naming where a response came from.
pub const SERVED_FROM_HEADER: &str = "x-offline-cache";

/// Controller configuration: which bucket to own and what to put in it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Bucket name for this app version. Every other bucket is stale.
    pub version: String,
    /// Paths (or absolute URLs) fetched and stored on install.
    pub precache_urls: Vec<String>,
    /// Origin that relative paths resolve against.
    pub origin: String,
    /// Path of the cached page returned when the network fails.
    pub fallback_url: String,
    /// Activate right after install instead of waiting for the old worker.
    pub skip_waiting: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION.to_string(),
            precache_urls: PRECACHE_URLS.iter().map(|s| s.to_string()).collect(),
            origin: DEFAULT_ORIGIN.to_string(),
            fallback_url: OFFLINE_FALLBACK_PATH.to_string(),
            skip_waiting: true,
        }
    }
}

impl CacheConfig {
    pub fn new(version: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            origin: origin.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_precache_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.precache_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_skip_waiting(mut self, skip_waiting: bool) -> Self {
        self.skip_waiting = skip_waiting;
        self
    }

    /// Resolve a path or absolute URL against the configured origin.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        let base = Url::parse(&self.origin)
            .map_err(|e| EngineError::InvalidUrl(format!("{}: {}", self.origin, e)))?;
        let url = base
            .join(path)
            .map_err(|e| EngineError::InvalidUrl(format!("{}: {}", path, e)))?;
        Ok(url)
    }

    /// Check the configuration before handing it to a controller.
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(EngineError::Config("version must not be empty".into()).into());
        }
        self.resolve(&self.fallback_url)?;
        for url in &self.precache_urls {
            self.resolve(url)?;
        }
        Ok(())
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read cache config {}", path.display()))?;
        Self::from_toml_str(&raw)
    }
}

/// Process-level configuration for the offline HTTP front.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Address the HTTP front binds to. Port 0 picks a free port.
    pub listen_addr: String,
    /// Directory holding persisted cache buckets.
    pub cache_dir: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:0".to_string(),
            cache_dir: String::new(),
        }
    }
}
