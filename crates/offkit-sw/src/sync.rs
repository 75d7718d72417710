//! Background sync hook.
//!
//! Sync and periodic-sync events under the fixed tag trigger a flush of
//! previously failed outbound requests, with backoff between attempts.
//! There is no persisted failed-request queue yet; [`SyncHandler`] is the
//! extension point a queue implementation plugs into.

use async_trait::async_trait;
use tracing::debug;

use offkit_common::retry::{retry_with_backoff, RetryConfig};

use crate::SwError;

/// The tag sync and periodic-sync registrations use.
pub const BACKGROUND_SYNC_TAG: &str = "background-sync";

/// Flushes whatever outbound work accumulated while offline.
#[async_trait]
pub trait SyncHandler: Send + Sync {
    async fn flush(&self) -> Result<(), SwError>;
}

/// Handler that has nothing to flush.
#[derive(Debug, Default)]
pub struct NoopSyncHandler;

#[async_trait]
impl SyncHandler for NoopSyncHandler {
    async fn flush(&self) -> Result<(), SwError> {
        debug!("Background sync: nothing to flush");
        Ok(())
    }
}

/// Run a sync flush with retries.
pub async fn flush_with_retry(
    handler: &dyn SyncHandler,
    config: &RetryConfig,
) -> Result<(), SwError> {
    retry_with_backoff(config, || handler.flush()).await
}
