//! Generation-partitioned cache storage.
//!
//! Stored entries map a normalized request identity to a response snapshot.
//! Entries are never deleted individually; a whole generation is dropped
//! when a new version activates.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;
use vitrine_net::{Request, Response};

/// Normalized cache identity for a request. Fragments never reach the
/// server, so they are stripped.
pub fn cache_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    String::from(url)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A stored response snapshot keyed by request identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Normalized request URL.
    pub url: String,
    /// Request method. Only safe GET responses are ever stored.
    pub method: String,
    /// Response status.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Vec<u8>,
    /// Storage time in milliseconds since the epoch.
    pub cached_at: u64,
}

impl CacheEntry {
    /// Snapshot a response for storage.
    pub fn snapshot(request: &Request, response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect();

        Self {
            url: cache_key(&request.url),
            method: request.method.to_string(),
            status: response.status.as_u16(),
            headers,
            body: response.body.to_vec(),
            cached_at: now_ms(),
        }
    }

    /// Rehydrate the snapshot into a response for the given live request.
    pub fn to_response(&self, request: &Request) -> Response {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(n), Ok(v)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                headers.insert(n, v);
            }
        }

        let mut response = Response::new(
            request.id,
            request.url.clone(),
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK),
            headers,
            Bytes::from(self.body.clone()),
        );
        response.from_cache = true;
        response
    }
}

/// One named cache generation.
#[derive(Debug, Default)]
pub struct Cache {
    name: String,
    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    /// Create a new, empty generation.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up an entry by identity.
    pub fn match_key(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Store an entry, overwriting any previous one for the same identity.
    pub fn put(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.url.clone(), entry);
    }

    /// Delete an entry.
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// All stored identities.
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All cache generations, keyed by name.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a generation, creating it on first write.
    pub fn open(&mut self, name: &str) -> &mut Cache {
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }

    /// Borrow a generation if it exists.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// Check whether a generation exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a generation wholesale.
    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    /// Names of all existing generations.
    pub fn keys(&self) -> Vec<String> {
        self.caches.keys().cloned().collect()
    }

    /// Look up an identity across every generation.
    pub fn match_key(&self, key: &str) -> Option<&CacheEntry> {
        for cache in self.caches.values() {
            if let Some(entry) = cache.match_key(key) {
                return Some(entry);
            }
        }
        None
    }

    /// Delete every generation whose name is not in the keep set.
    /// Returns the deleted names.
    pub fn prune_except(&mut self, keep: &[String]) -> Vec<String> {
        let stale: Vec<String> = self
            .caches
            .keys()
            .filter(|name| !keep.contains(name))
            .cloned()
            .collect();
        for name in &stale {
            self.caches.remove(name);
            debug!(generation = %name, "deleted stale generation");
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrine_net::RequestId;

    fn entry_for(url: &str, status: u16, body: &str) -> (Request, CacheEntry) {
        let request = Request::get(Url::parse(url).unwrap());
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        let response = Response::new(
            RequestId::new(),
            request.url.clone(),
            StatusCode::from_u16(status).unwrap(),
            headers,
            Bytes::from(body.to_string()),
        );
        let entry = CacheEntry::snapshot(&request, &response);
        (request, entry)
    }

    #[test]
    fn test_cache_key_strips_fragment() {
        let url = Url::parse("https://viewer.example/index.html#about").unwrap();
        assert_eq!(cache_key(&url), "https://viewer.example/index.html");
    }

    #[test]
    fn test_snapshot_round_trip() {
        let (request, entry) = entry_for("https://viewer.example/app.js", 200, "console.log(1)");

        let mut storage = CacheStorage::new();
        storage.open("runtime-v3").put(entry);

        let stored = storage
            .match_key(&cache_key(&request.url))
            .expect("entry should be stored");
        let response = stored.to_response(&request);

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.body[..], b"console.log(1)");
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert!(response.from_cache);
        assert!(stored.cached_at > 0);
    }

    #[test]
    fn test_match_across_generations() {
        let (request, entry) = entry_for("https://viewer.example/model.glb", 200, "glb");

        let mut storage = CacheStorage::new();
        storage.open("core-v3").put(entry);
        storage.open("runtime-v3");

        assert!(storage.match_key(&cache_key(&request.url)).is_some());
        assert!(storage.match_key("https://viewer.example/other").is_none());
    }

    #[test]
    fn test_put_overwrites_same_identity() {
        let (request, first) = entry_for("https://viewer.example/a.css", 200, "old");
        let (_, second) = entry_for("https://viewer.example/a.css", 200, "new");

        let mut storage = CacheStorage::new();
        storage.open("runtime-v3").put(first);
        storage.open("runtime-v3").put(second);

        let cache = storage.get("runtime-v3").unwrap();
        assert_eq!(cache.len(), 1);
        let stored = storage.match_key(&cache_key(&request.url)).unwrap();
        assert_eq!(stored.body, b"new");
    }

    #[test]
    fn test_cache_delete_and_keys() {
        let (_, entry) = entry_for("https://viewer.example/a.css", 200, "x");
        let mut cache = Cache::new("runtime-v3");
        cache.put(entry);

        assert_eq!(cache.keys(), vec!["https://viewer.example/a.css"]);
        assert!(cache.delete("https://viewer.example/a.css"));
        assert!(!cache.delete("https://viewer.example/a.css"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_prune_except_deletes_stale_generations() {
        let mut storage = CacheStorage::new();
        storage.open("core-v1");
        storage.open("runtime-v1");
        storage.open("core-v2");
        storage.open("runtime-v2");

        let keep = ["core-v2".to_string(), "runtime-v2".to_string()];
        let mut deleted = storage.prune_except(&keep);
        deleted.sort();

        assert_eq!(deleted, vec!["core-v1".to_string(), "runtime-v1".to_string()]);
        let mut remaining = storage.keys();
        remaining.sort();
        assert_eq!(remaining, vec!["core-v2".to_string(), "runtime-v2".to_string()]);
    }

    #[test]
    fn test_storage_open_is_idempotent() {
        let mut storage = CacheStorage::new();
        assert!(!storage.has("core-v3"));
        storage.open("core-v3");
        storage.open("core-v3");
        assert!(storage.has("core-v3"));
        assert_eq!(storage.keys().len(), 1);
        assert!(storage.delete("core-v3"));
        assert!(!storage.has("core-v3"));
    }
}
