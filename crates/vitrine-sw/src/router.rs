//! Routing policy: which strategy handles an intercepted request.

use std::fmt;

use http::Method;
use url::Origin;
use vitrine_net::Request;

use crate::config::WorkerConfig;

/// Fetch strategy selected for an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Serve from cache, fill the runtime generation on a miss.
    CacheFirst,
    /// Always try the network, fall back to cache when it fails.
    NetworkFirst,
    /// Serve stale immediately, refresh in the background.
    StaleWhileRevalidate,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::CacheFirst => write!(f, "cache-first"),
            Strategy::NetworkFirst => write!(f, "network-first"),
            Strategy::StaleWhileRevalidate => write!(f, "stale-while-revalidate"),
        }
    }
}

/// Pure routing decision over method and URL. No side effects; total over
/// its input domain.
#[derive(Debug, Clone)]
pub struct Router {
    origin: Origin,
    model_suffix: String,
}

impl Router {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            origin: config.origin.origin(),
            model_suffix: format!("/{}", config.model_asset),
        }
    }

    /// Select a strategy, or `None` to decline entirely (the request passes
    /// through to normal network handling, uncached).
    pub fn route(&self, request: &Request) -> Option<Strategy> {
        if request.method != Method::GET {
            return None;
        }

        // The model is large and updatable: always prefer the network.
        if request.url.path().ends_with(&self.model_suffix) {
            return Some(Strategy::NetworkFirst);
        }

        if request.url.origin() == self.origin {
            return Some(Strategy::CacheFirst);
        }

        // Third-party, e.g. the viewer component's CDN.
        Some(Strategy::StaleWhileRevalidate)
    }
}
