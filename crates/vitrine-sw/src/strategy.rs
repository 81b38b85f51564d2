//! The three fetch strategies.
//!
//! Each executor is a plain async function over a shared environment and a
//! request. Strategy steps for one request run in sequence; different
//! requests interleave freely, and two concurrent writers to the same
//! identity resolve as last-write-wins.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;
use vitrine_net::{Request, Response};

use crate::fetch::Fetcher;
use crate::store::{cache_key, CacheEntry, CacheStorage};
use crate::WorkerError;

/// Shared state handed to every strategy executor.
#[derive(Clone)]
pub struct StrategyEnv {
    pub caches: Arc<RwLock<CacheStorage>>,
    pub fetcher: Arc<dyn Fetcher>,
    /// Lazily-filled generation that all strategies write into.
    pub runtime_generation: String,
}

impl StrategyEnv {
    async fn lookup(&self, request: &Request) -> Option<CacheEntry> {
        let key = cache_key(&request.url);
        self.caches.read().await.match_key(&key).cloned()
    }

    async fn store(&self, request: &Request, response: &Response) {
        let entry = CacheEntry::snapshot(request, response);
        self.caches
            .write()
            .await
            .open(&self.runtime_generation)
            .put(entry);
    }
}

/// Serve from any generation when possible; on a miss, fetch and fill the
/// runtime generation. A network failure propagates, since no stored
/// fallback can exist on this path.
pub async fn cache_first(env: &StrategyEnv, request: &Request) -> Result<Response, WorkerError> {
    if let Some(entry) = env.lookup(request).await {
        debug!(url = %request.url, "cache hit");
        return Ok(entry.to_response(request));
    }

    let response = env.fetcher.fetch(request.clone()).await?;
    if response.ok() {
        env.store(request, &response).await;
    }
    Ok(response)
}

/// Always try the network first. On success the runtime generation is
/// refreshed; on failure whatever is cached is served, and only when
/// nothing is cached does the failure reach the caller.
pub async fn network_first(env: &StrategyEnv, request: &Request) -> Result<Response, WorkerError> {
    match env.fetcher.fetch(request.clone()).await {
        Ok(response) => {
            if response.ok() {
                env.store(request, &response).await;
            }
            Ok(response)
        }
        Err(err) => {
            if let Some(entry) = env.lookup(request).await {
                debug!(url = %request.url, error = %err, "network failed, serving cached copy");
                Ok(entry.to_response(request))
            } else {
                Err(err.into())
            }
        }
    }
}

/// Serve the cached value immediately and refresh in the background; the
/// refresh outcome only affects what the next request sees. Without a
/// cached value the caller waits on the network, and its failure
/// propagates.
pub async fn stale_while_revalidate(
    env: &StrategyEnv,
    request: &Request,
) -> Result<Response, WorkerError> {
    match env.lookup(request).await {
        Some(entry) => {
            revalidate(env.clone(), request.clone());
            debug!(url = %request.url, "serving stale, revalidating");
            Ok(entry.to_response(request))
        }
        None => {
            let response = env.fetcher.fetch(request.clone()).await?;
            if response.ok() {
                env.store(request, &response).await;
            }
            Ok(response)
        }
    }
}

/// Detached refresh task. Fetch failures are absorbed here; the stored
/// value stays as it was.
fn revalidate(env: StrategyEnv, request: Request) {
    tokio::spawn(async move {
        match env.fetcher.fetch(request.clone()).await {
            Ok(response) if response.ok() => env.store(&request, &response).await,
            Ok(response) => {
                debug!(url = %request.url, status = %response.status, "revalidation not stored")
            }
            Err(err) => debug!(url = %request.url, error = %err, "revalidation failed"),
        }
    });
}
