//! # Offkit Service Worker
//!
//! Offline cache worker for the admin dashboard: intercepts retrieval
//! requests from controlled pages, serves them through per-request-type
//! caching strategies, and manages versioned cache generations across
//! worker upgrades.
//!
//! ## Architecture
//!
//! ```text
//! OfflineWorker
//!     │
//!     ├── Router ──────── ordered (predicate, strategy) rules
//!     │
//!     ├── Strategies ──── cache-first / network-first /
//!     │       │           network-first-with-cache / stale-while-revalidate
//!     │       ├── CacheStore (named caches, request → response snapshot)
//!     │       └── Fetch (network seam)
//!     │
//!     ├── Lifecycle ───── install (populate static cache, all-or-nothing)
//!     │                   activate (delete stale generations, claim clients)
//!     │
//!     └── Hooks ───────── push notifications, background sync
//! ```
//!
//! Every intercepted request resolves to a [`Response`](offkit_net::Response);
//! network failures are converted to cached fallbacks or synthesized 503s
//! inside the strategy that owns the request. Nothing is surfaced to a page
//! as an error.

use thiserror::Error;

pub mod cache;
pub mod clients;
pub mod lifecycle;
pub mod notify;
pub mod offline;
pub mod router;
pub mod strategy;
pub mod sync;
pub mod worker;

#[cfg(test)]
pub(crate) mod testutil;

pub use cache::{CacheEntry, CacheStore, MemoryCacheStore};
pub use clients::{Client, Clients};
pub use lifecycle::{CacheGenerations, Lifecycle, Registration, WorkerInstance, WorkerState};
pub use notify::{Notification, NotificationAction, NotificationSink, NullNotificationSink};
pub use router::{RouteDecision, Router, StrategyKind};
pub use strategy::Strategies;
pub use sync::{NoopSyncHandler, SyncHandler, BACKGROUND_SYNC_TAG};
pub use worker::{ControlMessage, EventOutcome, OfflineWorker, WorkerConfig, WorkerEvent};

/// Errors that can occur in worker operations.
#[derive(Error, Debug, Clone)]
pub enum SwError {
    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Notification error: {0}")]
    NotificationError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<SwError> for offkit_common::OffkitError {
    fn from(e: SwError) -> Self {
        use offkit_common::OffkitError;

        match e {
            SwError::InstallFailed(m) | SwError::StateError(m) => OffkitError::lifecycle(m),
            SwError::CacheError(m) => OffkitError::cache(m),
            SwError::NetworkError(m) | SwError::NotificationError(m) => OffkitError::network(m),
            SwError::NotFound(m) => OffkitError::NotFound(m),
        }
    }
}
