//! # Vitrine SW
//!
//! Offline caching worker for the Vitrine 3D model viewer PWA.
//!
//! ## Features
//!
//! - **Generational cache store**: `core-{version}` / `runtime-{version}`
//!   partitions, invalidated wholesale on version change
//! - **Routing policy**: pure request to strategy decision
//! - **Fetch strategies**: cache-first with background fill, network-first
//!   with fallback, stale-while-revalidate
//! - **Lifecycle**: install, activate, skip-waiting, client claiming
//! - **Pre-warming**: `PRECACHE_OPTIONAL` message channel
//!
//! ## Architecture
//!
//! ```text
//! Registration
//!     ├── installing (CacheWorker)
//!     ├── waiting (CacheWorker)
//!     └── active (CacheWorker)
//!             ├── Router ──────── Strategy
//!             ├── StrategyEnv ─── Fetcher
//!             └── CacheStorage
//!                     └── Cache (generation)
//!                             └── identity → CacheEntry
//! ```

use thiserror::Error;
use vitrine_net::NetError;

pub mod config;
pub mod fetch;
pub mod lifecycle;
pub mod router;
pub mod store;
pub mod strategy;
pub mod worker;

pub use config::WorkerConfig;
pub use fetch::{Fetcher, NetFetcher};
pub use lifecycle::{Registration, WorkerEvent, WorkerState};
pub use router::{Router, Strategy};
pub use store::{Cache, CacheEntry, CacheStorage};
pub use worker::{CacheWorker, Client, Clients, WorkerMessage, PRECACHE_OPTIONAL};

/// Errors that can occur in worker operations.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Message error: {0}")]
    Message(String),
}
