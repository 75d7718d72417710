//! Named caches of request → response snapshots.
//!
//! The store is the only shared mutable resource in the worker. Entries are
//! keyed by request identity (method + URL), so concurrent writers to
//! different keys never conflict; same-key writes are last-write-wins.

use async_trait::async_trait;
use bytes::Bytes;
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use offkit_net::{Request, Response};

use crate::SwError;

/// A cached request/response pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL.
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Snapshot a response for a given request.
    pub fn snapshot(request: &Request, response: &Response) -> Self {
        let mut headers = HashMap::new();
        for (name, value) in response.headers.iter() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_string(), v.to_string());
            }
        }

        Self {
            url: request.url.to_string(),
            method: request.method.to_string(),
            status: response.status.as_u16(),
            headers,
            body: response.body.to_vec(),
            cached_at: now_ms(),
        }
    }

    /// Rebuild a response from this snapshot.
    pub fn to_response(&self) -> Response {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(n), Ok(v)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                headers.insert(n, v);
            }
        }

        Response {
            status: StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK),
            headers,
            body: Bytes::from(self.body.clone()),
        }
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Named key/value stores of cache entries, durable and page-independent.
///
/// Opening a cache that does not exist creates it. Deleting a whole cache is
/// the only bulk removal path; entries are never evicted individually.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Ensure a named cache exists.
    async fn open(&self, cache: &str) -> Result<(), SwError>;

    /// Look up an entry by request key.
    async fn match_entry(&self, cache: &str, key: &str) -> Result<Option<CacheEntry>, SwError>;

    /// Insert or overwrite an entry.
    async fn put(&self, cache: &str, key: &str, entry: CacheEntry) -> Result<(), SwError>;

    /// Delete a named cache. Returns whether it existed.
    async fn delete_cache(&self, cache: &str) -> Result<bool, SwError>;

    /// List all cache names present in storage.
    async fn cache_names(&self) -> Result<Vec<String>, SwError>;

    /// List entry keys in a named cache.
    async fn keys(&self, cache: &str) -> Result<Vec<String>, SwError>;
}

/// In-memory cache store.
///
/// The default store, and the substitute used by tests.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    caches: RwLock<HashMap<String, HashMap<String, CacheEntry>>>,
}

impl MemoryCacheStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn open(&self, cache: &str) -> Result<(), SwError> {
        let mut caches = self.caches.write().await;
        caches.entry(cache.to_string()).or_default();
        Ok(())
    }

    async fn match_entry(&self, cache: &str, key: &str) -> Result<Option<CacheEntry>, SwError> {
        let caches = self.caches.read().await;
        Ok(caches.get(cache).and_then(|c| c.get(key)).cloned())
    }

    async fn put(&self, cache: &str, key: &str, entry: CacheEntry) -> Result<(), SwError> {
        let mut caches = self.caches.write().await;
        caches
            .entry(cache.to_string())
            .or_default()
            .insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete_cache(&self, cache: &str) -> Result<bool, SwError> {
        let mut caches = self.caches.write().await;
        Ok(caches.remove(cache).is_some())
    }

    async fn cache_names(&self) -> Result<Vec<String>, SwError> {
        let caches = self.caches.read().await;
        Ok(caches.keys().cloned().collect())
    }

    async fn keys(&self, cache: &str) -> Result<Vec<String>, SwError> {
        let caches = self.caches.read().await;
        Ok(caches
            .get(cache)
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default())
    }
}
