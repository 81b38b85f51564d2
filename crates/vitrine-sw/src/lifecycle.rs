//! Worker lifecycle: states, events, and versioned handover.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::worker::CacheWorker;
use crate::WorkerError;

/// Lifecycle states of one worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    /// Initial state, before install begins.
    Parsed,
    /// Installing (core generation being populated).
    Installing,
    /// Installed but not yet activated.
    Installed,
    /// Activating (stale generations being pruned).
    Activating,
    /// Active and answering intercepted requests.
    Activated,
    /// Replaced, or failed to install.
    Redundant,
}

impl Default for WorkerState {
    fn default() -> Self {
        Self::Parsed
    }
}

impl WorkerState {
    /// Check whether this state allows fetch interception.
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, WorkerState::Activated)
    }

    /// Check whether the worker is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Redundant)
    }
}

/// Notifications emitted as a worker moves through its lifecycle.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// The worker changed state.
    StateChange { version: String, state: WorkerState },
    /// The worker took control of open clients.
    ClientsClaimed { version: String, claimed: usize },
}

/// Tracks the installing, waiting and active worker versions.
///
/// A new version that fails to install becomes redundant and the
/// previously active version keeps serving.
#[derive(Default)]
pub struct Registration {
    installing: Option<Arc<CacheWorker>>,
    waiting: Option<Arc<CacheWorker>>,
    active: Option<Arc<CacheWorker>>,
}

impl Registration {
    pub fn new() -> Self {
        Self::default()
    }

    /// The worker currently answering intercepted requests.
    pub fn active(&self) -> Option<&Arc<CacheWorker>> {
        self.active.as_ref()
    }

    /// The installed worker waiting to take over, if any.
    pub fn waiting(&self) -> Option<&Arc<CacheWorker>> {
        self.waiting.as_ref()
    }

    /// Install a new worker version and hand control to it. The waiting
    /// period is skipped so the new version takes control without waiting
    /// for open clients to close.
    pub async fn register(&mut self, worker: Arc<CacheWorker>) -> Result<(), WorkerError> {
        info!(version = %worker.config().version, "registering worker");
        self.installing = Some(Arc::clone(&worker));

        match worker.install().await {
            Ok(()) => {
                self.installing = None;
                self.waiting = Some(worker);
                self.skip_waiting().await
            }
            Err(err) => {
                warn!(
                    version = %worker.config().version,
                    error = %err,
                    "install failed, keeping previous version"
                );
                worker.mark_redundant().await;
                self.installing = None;
                Err(err)
            }
        }
    }

    /// Promote the waiting worker immediately, retiring the previously
    /// active one.
    pub async fn skip_waiting(&mut self) -> Result<(), WorkerError> {
        if let Some(worker) = self.waiting.take() {
            if let Some(previous) = self.active.take() {
                previous.mark_redundant().await;
            }
            worker.activate().await?;
            self.active = Some(worker);
        }
        Ok(())
    }
}
