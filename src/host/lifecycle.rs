// Worker lifecycle contract: what the host calls and what a worker promises back.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{FetchRequest, FetchResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    /// Installed and waiting for the previous worker to step aside.
    Installed,
    Activating,
    Activated,
    /// Failed to install, or replaced by a newer worker.
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(s)
    }
}

/// Handed to `on_install`. Lets the worker ask to be activated right away.
#[derive(Debug, Default)]
pub struct InstallEvent {
    skip_waiting: AtomicBool,
}

impl InstallEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::Relaxed);
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::Relaxed)
    }
}

/// Event handlers a worker registers with the host.
///
/// Each method's future is the completion signal: the host does not move to
/// the next phase until it resolves.
#[async_trait]
pub trait WorkerHandler: Send + Sync {
    /// Short label for logs, usually the cache version.
    fn id(&self) -> &str;

    async fn on_install(&self, event: &InstallEvent) -> Result<()>;

    async fn on_activate(&self) -> Result<()>;

    async fn on_fetch(&self, request: FetchRequest) -> Result<FetchResponse>;
}
