//! The four caching strategies.
//!
//! Every strategy resolves to a response, whatever the network does. Only
//! ok-range responses are ever written to a cache; error responses pass
//! through to the caller uncached. Cache writes are opportunistic, so a
//! failed write downgrades to a log line rather than failing the request.

use std::sync::Arc;

use tracing::{debug, warn};

use offkit_net::{Destination, Fetch, Request, Response};

use crate::cache::{CacheEntry, CacheStore};
use crate::lifecycle::CacheGenerations;
use crate::offline;
use crate::router::StrategyKind;

/// Executes caching strategies against the injected store and fetcher.
#[derive(Clone)]
pub struct Strategies {
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetch>,
    generations: CacheGenerations,
}

impl Strategies {
    /// Create a strategy executor.
    pub fn new(
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetch>,
        generations: CacheGenerations,
    ) -> Self {
        Self {
            store,
            fetcher,
            generations,
        }
    }

    /// Dispatch a request to the given strategy.
    pub async fn run(&self, kind: StrategyKind, request: &Request) -> Response {
        match kind {
            StrategyKind::NetworkOnly => self.network_only(request).await,
            StrategyKind::NetworkFirst => self.network_first(request).await,
            StrategyKind::CacheFirst => self.cache_first(request).await,
            StrategyKind::NetworkFirstWithCache => self.network_first_with_cache(request).await,
            StrategyKind::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
        }
    }

    /// Straight to network, no caching. Used for cross-origin requests.
    pub async fn network_only(&self, request: &Request) -> Response {
        match self.fetcher.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                debug!(url = %request.url, error = %e, "Cross-origin fetch failed");
                offline::offline_plain("Offline")
            }
        }
    }

    /// Network first, dynamic cache fallback, offline page for documents.
    pub async fn network_first(&self, request: &Request) -> Response {
        self.network_first_inner(request, false).await
    }

    /// Network first with a JSON offline fallback, for API calls.
    pub async fn network_first_with_cache(&self, request: &Request) -> Response {
        self.network_first_inner(request, true).await
    }

    async fn network_first_inner(&self, request: &Request, json_fallback: bool) -> Response {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.ok() {
                    self.cache_put(&self.generations.dynamic, request, &response)
                        .await;
                }
                response
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network failed, trying cache");

                if let Some(cached) = self.lookup(&self.generations.dynamic, request).await {
                    return cached;
                }

                if json_fallback {
                    offline::offline_json()
                } else if request.destination == Destination::Document {
                    offline::offline_page()
                } else {
                    offline::offline_plain("Offline")
                }
            }
        }
    }

    /// Static cache first; network only on a miss.
    ///
    /// Anything pre-cached at install is served with zero network
    /// round-trips.
    pub async fn cache_first(&self, request: &Request) -> Response {
        if let Some(cached) = self.lookup(&self.generations.static_assets, request).await {
            return cached;
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.ok() {
                    self.cache_put(&self.generations.static_assets, request, &response)
                        .await;
                }
                response
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Static asset fetch failed");
                offline::offline_plain("Offline - Resource not available")
            }
        }
    }

    /// Cached copy immediately, network refresh in the background.
    ///
    /// The revalidation task is detached: it finishes and updates the shared
    /// cache even if the caller goes away. On a cold cache the caller gets
    /// the network result directly. Either way exactly one response is
    /// observable per request.
    pub async fn stale_while_revalidate(&self, request: &Request) -> Response {
        if let Some(cached) = self.lookup(&self.generations.dynamic, request).await {
            let this = self.clone();
            let request = request.clone();
            tokio::spawn(async move {
                this.revalidate(&request).await;
            });
            return cached;
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.ok() {
                    self.cache_put(&self.generations.dynamic, request, &response)
                        .await;
                }
                response
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Cold-cache fetch failed");
                offline::offline_plain("Offline")
            }
        }
    }

    async fn revalidate(&self, request: &Request) {
        match self.fetcher.fetch(request).await {
            Ok(response) if response.ok() => {
                self.cache_put(&self.generations.dynamic, request, &response)
                    .await;
            }
            Ok(response) => {
                debug!(url = %request.url, status = %response.status, "Revalidation skipped");
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Revalidation failed");
            }
        }
    }

    async fn lookup(&self, cache: &str, request: &Request) -> Option<Response> {
        match self.store.match_entry(cache, &request.cache_key()).await {
            Ok(entry) => entry.map(|e| e.to_response()),
            Err(e) => {
                // Storage trouble looks like a miss; the fallback path covers it
                warn!(cache = %cache, url = %request.url, error = %e, "Cache lookup failed");
                None
            }
        }
    }

    async fn cache_put(&self, cache: &str, request: &Request, response: &Response) {
        let entry = CacheEntry::snapshot(request, response);
        if let Err(e) = self.store.put(cache, &request.cache_key(), entry).await {
            warn!(cache = %cache, url = %request.url, error = %e, "Cache write failed");
        }
    }
}
