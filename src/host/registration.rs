// Host-side registration. Owns the installing/waiting/active slots and drives transitions.

use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::lifecycle::{InstallEvent, WorkerHandler, WorkerState};
use crate::network::traits::Fetcher;
use crate::types::{FetchRequest, FetchResponse};

struct WorkerSlot {
    worker: Arc<dyn WorkerHandler>,
    state: RwLock<WorkerState>,
}

impl WorkerSlot {
    fn new(worker: Arc<dyn WorkerHandler>) -> Self {
        Self {
            worker,
            state: RwLock::new(WorkerState::Installing),
        }
    }

    fn set_state(&self, state: WorkerState) {
        debug!("worker {} -> {}", self.worker.id(), state);
        *self.state.write() = state;
    }

    fn state(&self) -> WorkerState {
        *self.state.read()
    }
}

/// Lifecycle transitions run one at a time; fetches run concurrently against
/// whichever worker is active when they are dispatched.
pub struct Registration {
    /// Used directly when no worker is active.
    fetcher: Arc<dyn Fetcher>,
    waiting: RwLock<Option<Arc<WorkerSlot>>>,
    active: RwLock<Option<Arc<WorkerSlot>>>,
    lifecycle: Mutex<()>,
}

impl Registration {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            waiting: RwLock::new(None),
            active: RwLock::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    /// Install `worker` and, if it asked to skip waiting or nothing is active, activate it.
    ///
    /// On install failure the worker is discarded and the current active
    /// worker keeps serving. Returns the state the new worker ended in.
    pub async fn register(&self, worker: Arc<dyn WorkerHandler>) -> Result<WorkerState> {
        let _guard = self.lifecycle.lock().await;

        let slot = Arc::new(WorkerSlot::new(worker));
        let id = slot.worker.id().to_string();
        info!("installing worker {}", id);

        let event = InstallEvent::new();
        if let Err(e) = slot.worker.on_install(&event).await {
            slot.set_state(WorkerState::Redundant);
            warn!("install of worker {} failed: {:#}", id, e);
            return Err(e.context(format!("install of worker {} failed", id)));
        }
        slot.set_state(WorkerState::Installed);

        let replaced = self.waiting.write().replace(slot.clone());
        if let Some(prev) = replaced {
            prev.set_state(WorkerState::Redundant);
        }

        let has_active = self.active.read().is_some();
        if event.skip_waiting_requested() || !has_active {
            self.activate_waiting_locked().await;
        } else {
            info!("worker {} installed, waiting for activation", id);
        }
        Ok(slot.state())
    }

    /// Make `worker` active without running its install or activate handlers.
    ///
    /// For a worker whose install completed in an earlier run and whose cache
    /// is still on disk. Does nothing if a worker is already active.
    pub async fn restore(&self, worker: Arc<dyn WorkerHandler>) -> WorkerState {
        let _guard = self.lifecycle.lock().await;

        let slot = Arc::new(WorkerSlot::new(worker));
        if self.active.read().is_some() {
            slot.set_state(WorkerState::Redundant);
            return slot.state();
        }
        slot.set_state(WorkerState::Activated);
        *self.active.write() = Some(slot.clone());
        info!("worker {} restored from persisted cache", slot.worker.id());
        slot.state()
    }

    /// Promote the waiting worker, if any. Returns whether one was activated.
    pub async fn activate_waiting(&self) -> bool {
        let _guard = self.lifecycle.lock().await;
        self.activate_waiting_locked().await
    }

    async fn activate_waiting_locked(&self) -> bool {
        let waiting = self.waiting.write().take();
        let slot = match waiting {
            Some(slot) => slot,
            None => return false,
        };

        slot.set_state(WorkerState::Activating);
        if let Err(e) = slot.worker.on_activate().await {
            // An activate failure does not stop the worker from becoming active.
            warn!("activate of worker {} failed: {:#}", slot.worker.id(), e);
        }
        slot.set_state(WorkerState::Activated);

        let previous = self.active.write().replace(slot.clone());
        if let Some(prev) = previous {
            prev.set_state(WorkerState::Redundant);
        }
        info!("worker {} activated", slot.worker.id());
        true
    }

    /// Route a request through the active worker, or straight to the network.
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        let active = self.active.read().clone();
        match active {
            Some(slot) => slot.worker.on_fetch(request).await,
            None => {
                debug!("no active worker, passing {} to network", request.url);
                self.fetcher.fetch(&request).await
            }
        }
    }

    pub fn active_id(&self) -> Option<String> {
        self.active.read().as_ref().map(|s| s.worker.id().to_string())
    }

    pub fn waiting_id(&self) -> Option<String> {
        self.waiting.read().as_ref().map(|s| s.worker.id().to_string())
    }

    pub fn active_state(&self) -> Option<WorkerState> {
        self.active.read().as_ref().map(|s| s.state())
    }
}
