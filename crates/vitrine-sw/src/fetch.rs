//! Network seam for the strategy executors.

use std::sync::Arc;

use futures::future::BoxFuture;
use vitrine_net::{NetError, Request, ResourceLoader, Response};

/// Issues network fetches on behalf of the worker. Object safe so the
/// executors can run against a scripted network in tests.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, request: Request) -> BoxFuture<'static, Result<Response, NetError>>;
}

/// Real fetcher backed by the resource loader.
pub struct NetFetcher {
    loader: Arc<ResourceLoader>,
}

impl NetFetcher {
    pub fn new(loader: Arc<ResourceLoader>) -> Self {
        Self { loader }
    }
}

impl Fetcher for NetFetcher {
    fn fetch(&self, request: Request) -> BoxFuture<'static, Result<Response, NetError>> {
        let loader = Arc::clone(&self.loader);
        Box::pin(async move { loader.fetch(request).await })
    }
}
