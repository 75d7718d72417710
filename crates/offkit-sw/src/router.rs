//! Request classification: one strategy per intercepted request.
//!
//! Precedence is an ordered rule list, evaluated top to bottom, first match
//! wins. The ordering is policy: documents always try the network first so
//! a stale HTML shell is never served, known build artifacts are immutable
//! and cache-first, API calls get a JSON-shaped offline fallback, and
//! everything else trades a little staleness for latency.

use tracing::trace;
use url::Url;

use offkit_net::{Destination, Request};

/// The strategy a request is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Straight to network, no caching (cross-origin).
    NetworkOnly,
    /// Network first, dynamic cache fallback, HTML offline page.
    NetworkFirst,
    /// Static cache first, network on miss.
    CacheFirst,
    /// Network first, dynamic cache fallback, JSON offline payload.
    NetworkFirstWithCache,
    /// Cached copy immediately, refresh in the background.
    StaleWhileRevalidate,
}

/// Routing outcome for an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Not intercepted at all; the request proceeds untouched.
    Passthrough,
    /// Dispatch to a strategy.
    Dispatch(StrategyKind),
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Origin of the controlled pages.
    pub origin: Url,
    /// Path prefix identifying backend API calls.
    pub api_prefix: String,
    /// Site-relative paths of the pre-cached build artifacts.
    pub static_assets: Vec<String>,
}

type Predicate = fn(&RouterConfig, &Request) -> bool;

struct RouteRule {
    name: &'static str,
    matches: Predicate,
    strategy: StrategyKind,
}

/// Classifies requests with an ordered (predicate, strategy) rule list.
///
/// Classification is pure: it reads only the request and the config, and is
/// recomputed per request.
pub struct Router {
    config: RouterConfig,
    rules: Vec<RouteRule>,
}

impl Router {
    /// Create a router with the standard precedence.
    pub fn new(config: RouterConfig) -> Self {
        let rules = vec![
            RouteRule {
                name: "cross-origin",
                matches: |config, request| {
                    request.url.origin() != config.origin.origin()
                },
                strategy: StrategyKind::NetworkOnly,
            },
            RouteRule {
                name: "document",
                matches: |_, request| request.destination == Destination::Document,
                strategy: StrategyKind::NetworkFirst,
            },
            RouteRule {
                name: "static-asset",
                matches: |config, request| {
                    let path = request.url.path();
                    config.static_assets.iter().any(|asset| asset == path)
                },
                strategy: StrategyKind::CacheFirst,
            },
            RouteRule {
                name: "api",
                matches: |config, request| request.url.path().starts_with(&config.api_prefix),
                strategy: StrategyKind::NetworkFirstWithCache,
            },
            RouteRule {
                name: "default",
                matches: |_, _| true,
                strategy: StrategyKind::StaleWhileRevalidate,
            },
        ];

        Self { config, rules }
    }

    /// Classify a request.
    ///
    /// Non-retrieval methods are never intercepted.
    pub fn classify(&self, request: &Request) -> RouteDecision {
        if !request.is_retrieval() {
            return RouteDecision::Passthrough;
        }

        for rule in &self.rules {
            if (rule.matches)(&self.config, request) {
                trace!(url = %request.url, rule = rule.name, strategy = ?rule.strategy, "Request classified");
                return RouteDecision::Dispatch(rule.strategy);
            }
        }

        // The final rule matches everything
        RouteDecision::Dispatch(StrategyKind::StaleWhileRevalidate)
    }

    /// The router's configuration.
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }
}
