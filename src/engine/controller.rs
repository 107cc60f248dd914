// Cache controller: precache on install, prune stale buckets on activate, serve cache-first.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info, warn};

use super::precache::add_all;
use super::stats::{StatsCollector, StatsSnapshot};
use crate::config::CacheConfig;
use crate::error::EngineError;
use crate::host::lifecycle::{InstallEvent, WorkerHandler};
use crate::network::traits::Fetcher;
use crate::storage::traits::{CacheBucket, CacheStorage};
use crate::types::{FetchRequest, FetchResponse, ServedFrom};

/// Outcome of pruning the cache directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    pub deleted: Vec<String>,
    /// Buckets whose deletion failed, with the error text.
    pub failed: Vec<(String, String)>,
}

pub struct CacheController {
    config: CacheConfig,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    fallback: FetchRequest,
    stats: StatsCollector,
}

impl CacheController {
    pub fn new(
        config: CacheConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        config.validate()?;
        let fallback = FetchRequest::get(config.resolve(&config.fallback_url)?);
        Ok(Self {
            config,
            storage,
            fetcher,
            fallback,
            stats: StatsCollector::new(),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    async fn bucket(&self) -> Result<Arc<dyn CacheBucket>> {
        self.storage
            .open(&self.config.version)
            .await
            .with_context(|| format!("open cache bucket {}", self.config.version))
    }

    /// The version bucket if it exists. Lookups must not recreate a deleted bucket.
    async fn existing_bucket(&self) -> Result<Option<Arc<dyn CacheBucket>>> {
        self.storage
            .get(&self.config.version)
            .await
            .with_context(|| format!("look up cache bucket {}", self.config.version))
    }

    /// Whether the version bucket already holds every precache URL.
    ///
    /// Used after a restart to keep serving a bucket a previous run completed.
    pub async fn is_installed(&self) -> Result<bool> {
        let bucket = match self.existing_bucket().await? {
            Some(bucket) => bucket,
            None => return Ok(false),
        };
        for path in &self.config.precache_urls {
            let request = FetchRequest::get(self.config.resolve(path)?);
            if bucket.match_request(&request).await?.is_none() {
                debug!("{} missing {}", self.config.version, request.url);
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Open the version bucket and store every precache URL in it, all or nothing.
    pub async fn install(&self) -> Result<usize> {
        let t0 = Instant::now();
        let bucket = self.bucket().await?;
        info!("cache opened name={}", bucket.name());

        let requests = self
            .config
            .precache_urls
            .iter()
            .map(|u| self.config.resolve(u).map(FetchRequest::get))
            .collect::<Result<Vec<_>>>()?;

        let stored = add_all(bucket.as_ref(), self.fetcher.as_ref(), requests)
            .await
            .with_context(|| format!("precache into {} failed", self.config.version))?;

        info!(
            "precached {} assets into {} elapsed_ms={}",
            stored,
            self.config.version,
            t0.elapsed().as_millis()
        );
        Ok(stored)
    }

    /// Delete every bucket other than the current version.
    ///
    /// Deletions run concurrently and a failed one does not stop the rest.
    pub async fn activate(&self) -> Result<ActivationReport> {
        let names = self
            .storage
            .keys()
            .await
            .context("list cache buckets")?;

        let stale: Vec<String> = names
            .into_iter()
            .filter(|name| name != &self.config.version)
            .collect();

        let results = join_all(stale.iter().map(|name| self.storage.delete(name))).await;

        let mut report = ActivationReport::default();
        for (name, result) in stale.into_iter().zip(results) {
            match result {
                Ok(_) => {
                    info!("deleted stale cache {}", name);
                    report.deleted.push(name);
                }
                Err(e) => {
                    warn!("failed to delete stale cache {}: {:#}", name, e);
                    report.failed.push((name, format!("{:#}", e)));
                }
            }
        }
        Ok(report)
    }

    /// Cache-first lookup, then network, then the cached fallback document.
    ///
    /// Never writes to the cache.
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        let bucket = self.existing_bucket().await?;

        if let Some(bucket) = &bucket {
            if let Some(entry) = bucket.match_request(&request).await? {
                debug!("cache hit {}", entry.key);
                self.stats.record_cache_hit(entry.body.len() as u64);
                return Ok(entry.into_response());
            }
        }

        match self.fetcher.fetch(&request).await {
            Ok(resp) => {
                debug!(
                    "cache miss {} {} network status={}",
                    request.method,
                    request.url,
                    resp.status.as_u16()
                );
                self.stats.record_network(resp.body.len() as u64);
                Ok(resp.served_from(ServedFrom::Network))
            }
            Err(err) => {
                let fallback = match &bucket {
                    Some(bucket) => bucket.match_request(&self.fallback).await?,
                    None => None,
                };
                if let Some(entry) = fallback {
                    info!(
                        "network unavailable for {}, serving {}",
                        request.url, self.fallback.url
                    );
                    self.stats.record_fallback(entry.body.len() as u64);
                    return Ok(entry.into_response().served_from(ServedFrom::OfflineFallback));
                }
                let is_network = err
                    .downcast_ref::<EngineError>()
                    .is_some_and(EngineError::is_network);
                warn!(
                    "fetch failed for {} with no fallback cached (network={}): {:#}",
                    request.url, is_network, err
                );
                self.stats.record_failure();
                Err(err)
            }
        }
    }
}

#[async_trait]
impl WorkerHandler for CacheController {
    fn id(&self) -> &str {
        &self.config.version
    }

    async fn on_install(&self, event: &InstallEvent) -> Result<()> {
        if self.config.skip_waiting {
            event.skip_waiting();
        }
        self.install().await.map(|_| ())
    }

    async fn on_activate(&self) -> Result<()> {
        let report = self.activate().await?;
        debug!(
            "activate {} deleted={} failed={}",
            self.config.version,
            report.deleted.len(),
            report.failed.len()
        );
        Ok(())
    }

    async fn on_fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        self.fetch(request).await
    }
}
