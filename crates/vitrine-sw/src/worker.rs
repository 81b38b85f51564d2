//! The cache worker: install, activate, fetch interception, and the
//! out-of-band message channel.

use std::sync::Arc;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use url::Url;
use vitrine_net::{Request, Response};

use crate::config::WorkerConfig;
use crate::fetch::Fetcher;
use crate::lifecycle::{WorkerEvent, WorkerState};
use crate::router::{Router, Strategy};
use crate::store::{CacheEntry, CacheStorage};
use crate::strategy::{self, StrategyEnv};
use crate::WorkerError;

/// Message type tag requesting optional pre-warming.
pub const PRECACHE_OPTIONAL: &str = "PRECACHE_OPTIONAL";

/// Out-of-band message from a controlled page.
///
/// Wire shape: `{ "type": string, "urls": [string] }`. Unrecognized types
/// are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub urls: Vec<String>,
}

impl WorkerMessage {
    /// Build a pre-warm request for the given URLs.
    pub fn precache_optional<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: PRECACHE_OPTIONAL.to_string(),
            urls: urls.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a message from its JSON wire form.
    pub fn from_json(raw: &str) -> Result<Self, WorkerError> {
        serde_json::from_str(raw).map_err(|e| WorkerError::Message(e.to_string()))
    }
}

/// A page open under this worker's scope.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: String,
    pub url: Url,
    /// Version tag of the worker controlling this client, if any.
    pub controller: Option<String>,
}

impl Client {
    pub fn new(id: impl Into<String>, url: Url) -> Self {
        Self {
            id: id.into(),
            url,
            controller: None,
        }
    }
}

/// Registry of open clients.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Take control of every open client so the claiming worker answers
    /// in-flight requests. Returns how many clients changed controller.
    pub fn claim(&mut self, version: &str) -> usize {
        let mut claimed = 0;
        for client in self.clients.values_mut() {
            if client.controller.as_deref() != Some(version) {
                client.controller = Some(version.to_string());
                claimed += 1;
            }
        }
        claimed
    }
}

/// One deployed version of the caching worker.
///
/// The cache store and client registry are shared across versions; the
/// worker itself owns only its config, router and lifecycle state.
pub struct CacheWorker {
    config: WorkerConfig,
    router: Router,
    state: RwLock<WorkerState>,
    caches: Arc<RwLock<CacheStorage>>,
    clients: Arc<RwLock<Clients>>,
    fetcher: Arc<dyn Fetcher>,
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl CacheWorker {
    /// Create a worker over a shared cache store and client registry.
    /// Returns the worker and its lifecycle event stream.
    pub fn new(
        config: WorkerConfig,
        caches: Arc<RwLock<CacheStorage>>,
        clients: Arc<RwLock<Clients>>,
        fetcher: Arc<dyn Fetcher>,
    ) -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let router = Router::new(&config);
        let worker = Self {
            config,
            router,
            state: RwLock::new(WorkerState::Parsed),
            caches,
            clients,
            fetcher,
            event_tx,
        };
        (worker, event_rx)
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    async fn set_state(&self, state: WorkerState) {
        *self.state.write().await = state;
        let _ = self.event_tx.send(WorkerEvent::StateChange {
            version: self.config.version.clone(),
            state,
        });
    }

    pub(crate) async fn mark_redundant(&self) {
        self.set_state(WorkerState::Redundant).await;
    }

    fn env(&self) -> StrategyEnv {
        StrategyEnv {
            caches: Arc::clone(&self.caches),
            fetcher: Arc::clone(&self.fetcher),
            runtime_generation: self.config.runtime_generation(),
        }
    }

    /// Install this version: fetch every manifest asset and populate the
    /// core generation. Entries are staged and committed only once the
    /// whole manifest has succeeded, so a single missing asset fails the
    /// installation and retains nothing.
    pub async fn install(&self) -> Result<(), WorkerError> {
        self.set_state(WorkerState::Installing).await;

        let mut staged = Vec::with_capacity(self.config.core_assets.len());
        for path in &self.config.core_assets {
            let url = self.config.resolve(path)?;
            let request = Request::get(url);
            let response = self
                .fetcher
                .fetch(request.clone())
                .await
                .map_err(|e| WorkerError::InstallFailed(format!("{path}: {e}")))?;
            if !response.ok() {
                return Err(WorkerError::InstallFailed(format!(
                    "{path}: status {}",
                    response.status
                )));
            }
            staged.push(CacheEntry::snapshot(&request, &response));
        }

        let generation = self.config.core_generation();
        let assets = staged.len();
        {
            let mut caches = self.caches.write().await;
            let cache = caches.open(&generation);
            for entry in staged {
                cache.put(entry);
            }
        }
        info!(generation = %generation, assets, "core generation populated");

        self.set_state(WorkerState::Installed).await;
        Ok(())
    }

    /// Activate this version: delete every generation that is not current,
    /// then claim all open clients.
    pub async fn activate(&self) -> Result<(), WorkerError> {
        self.set_state(WorkerState::Activating).await;

        let keep = self.config.current_generations();
        let stale = self.caches.write().await.prune_except(&keep);
        if !stale.is_empty() {
            info!(version = %self.config.version, deleted = ?stale, "pruned stale generations");
        }

        let claimed = self.clients.write().await.claim(&self.config.version);
        let _ = self.event_tx.send(WorkerEvent::ClientsClaimed {
            version: self.config.version.clone(),
            claimed,
        });

        self.set_state(WorkerState::Activated).await;
        info!(version = %self.config.version, claimed, "worker activated");
        Ok(())
    }

    /// Intercept one request. `None` means the worker declines and the
    /// request passes through to normal network handling.
    pub async fn handle_fetch(&self, request: Request) -> Option<Result<Response, WorkerError>> {
        if !self.state().await.can_intercept_fetch() {
            return None;
        }

        let strategy = self.router.route(&request)?;
        debug!(url = %request.url, %strategy, "intercepted request");

        let env = self.env();
        let result = match strategy {
            Strategy::CacheFirst => strategy::cache_first(&env, &request).await,
            Strategy::NetworkFirst => strategy::network_first(&env, &request).await,
            Strategy::StaleWhileRevalidate => {
                strategy::stale_while_revalidate(&env, &request).await
            }
        };
        Some(result)
    }

    /// Handle an out-of-band message. Only pre-warm requests are
    /// recognized; anything else is ignored, as are messages arriving
    /// before activation.
    pub async fn handle_message(&self, message: WorkerMessage) {
        if self.state().await != WorkerState::Activated {
            debug!(kind = %message.kind, "message before activation ignored");
            return;
        }
        match message.kind.as_str() {
            PRECACHE_OPTIONAL => self.precache_optional(&message.urls).await,
            other => debug!(kind = %other, "unrecognized message ignored"),
        }
    }

    /// Fetch and store optional assets one at a time. Individual failures
    /// are absorbed so one bad URL cannot abort the rest.
    pub async fn precache_optional(&self, urls: &[String]) {
        let generation = self.config.runtime_generation();
        for raw in urls {
            let url = match self.config.resolve(raw) {
                Ok(url) => url,
                Err(err) => {
                    warn!(url = %raw, error = %err, "skipping unresolvable pre-warm url");
                    continue;
                }
            };
            let request = Request::get(url);
            match self.fetcher.fetch(request.clone()).await {
                Ok(response) if response.ok() => {
                    let entry = CacheEntry::snapshot(&request, &response);
                    self.caches.write().await.open(&generation).put(entry);
                    debug!(url = %request.url, "pre-warmed");
                }
                Ok(response) => {
                    warn!(url = %request.url, status = %response.status, "pre-warm skipped")
                }
                Err(err) => warn!(url = %request.url, error = %err, "pre-warm failed"),
            }
        }
    }
}
