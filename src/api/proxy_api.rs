use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::{info, warn};

use crate::config::{CacheConfig, EngineConfig};
use crate::engine::controller::CacheController;
use crate::engine::stats::StatsSnapshot;
use crate::host::lifecycle::WorkerState;
use crate::host::registration::Registration;
use crate::network::http_fetcher::HttpFetcher;
use crate::network::traits::Fetcher;
use crate::server::handler::OfflineServer;
use crate::storage::disk::DiskCacheStorage;
use crate::storage::traits::CacheStorage;

/// A running offline-first front: disk-backed buckets, one controller, one HTTP listener.
pub struct OfflineProxy {
    server: OfflineServer,
    controller: Arc<CacheController>,
    install_state: WorkerState,
}

impl OfflineProxy {
    /// Start the server and register a controller for `cache`.
    ///
    /// A failed install is not fatal. If a previous run left a complete bucket
    /// for this version on disk, the controller serves from it. Otherwise
    /// requests go straight to the network.
    pub async fn start(engine: EngineConfig, cache: CacheConfig) -> Result<Self> {
        Self::start_with_fetcher(engine, cache, Arc::new(HttpFetcher::new())).await
    }

    pub async fn start_with_fetcher(
        engine: EngineConfig,
        cache: CacheConfig,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        crate::api::simple::init_tracing();

        if engine.cache_dir.trim().is_empty() {
            return Err(anyhow!("cache_dir must be set"));
        }
        let storage: Arc<dyn CacheStorage> =
            Arc::new(DiskCacheStorage::new(Path::new(&engine.cache_dir))?);

        let origin = cache.origin.clone();
        let controller = Arc::new(CacheController::new(cache, storage, fetcher.clone())?);
        let registration = Arc::new(Registration::new(fetcher));

        let install_state = match registration.register(controller.clone()).await {
            Ok(state) => state,
            Err(e) => {
                warn!("{:#}", e);
                match controller.is_installed().await {
                    Ok(true) => registration.restore(controller.clone()).await,
                    Ok(false) => WorkerState::Redundant,
                    Err(e) => {
                        warn!("persisted cache check failed: {:#}", e);
                        WorkerState::Redundant
                    }
                }
            }
        };

        let server = OfflineServer::start(&engine.listen_addr, registration, &origin).await?;
        info!(
            "offline proxy listening port={} origin={} version={} worker={}",
            server.port(),
            origin,
            controller.version(),
            install_state
        );

        Ok(Self {
            server,
            controller,
            install_state,
        })
    }

    pub fn port(&self) -> u16 {
        self.server.port()
    }

    pub fn url_for(&self, path: &str) -> String {
        self.server.url_for(path)
    }

    /// State the controller reached during startup.
    pub fn install_state(&self) -> WorkerState {
        self.install_state
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.controller.stats()
    }

    /// Shut down the listener. Buckets stay on disk for the next start.
    pub fn shutdown(self) {
        self.server.shutdown();
    }
}
