//! Cache-generation transitions across worker version upgrades.
//!
//! Install populates the static generation (all-or-nothing), activation
//! deletes every generation that is no longer current and claims open
//! clients. Deleting stale generations at activation is the only bulk
//! removal path for cached data.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tracing::{debug, info, warn};
use url::Url;

use offkit_net::{Fetch, Request};

use crate::cache::{CacheEntry, CacheStore};
use crate::SwError;

/// Unique identifier for a worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Initial state.
    Parsed,
    /// Installing (static cache being populated).
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Activating (stale generations being cleaned up).
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Redundant (replaced or install failed).
    Redundant,
}

impl Default for WorkerState {
    fn default() -> Self {
        Self::Parsed
    }
}

/// A worker instance tied to one cache-generation version.
#[derive(Debug, Clone)]
pub struct WorkerInstance {
    /// Unique ID.
    pub id: WorkerId,

    /// Generation version this worker serves (e.g., "1.0.0").
    pub version: String,

    /// Current state.
    pub state: WorkerState,

    /// Time of last state change.
    pub state_changed_at: Instant,
}

impl WorkerInstance {
    /// Create a new worker instance.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            id: WorkerId::new(),
            version: version.into(),
            state: WorkerState::Parsed,
            state_changed_at: Instant::now(),
        }
    }

    /// Set state.
    pub fn set_state(&mut self, state: WorkerState) {
        self.state = state;
        self.state_changed_at = Instant::now();
    }

    /// Check if active.
    pub fn is_active(&self) -> bool {
        self.state == WorkerState::Activated
    }

    /// Check if redundant.
    pub fn is_redundant(&self) -> bool {
        self.state == WorkerState::Redundant
    }
}

/// Tracks which worker instance is installing, waiting, and active.
#[derive(Debug, Default)]
pub struct Registration {
    /// Installing worker.
    pub installing: Option<WorkerInstance>,

    /// Waiting worker (installed but not active).
    pub waiting: Option<WorkerInstance>,

    /// Active worker.
    pub active: Option<WorkerInstance>,
}

impl Registration {
    /// Create an empty registration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin installing a new worker version.
    pub fn begin_install(&mut self, version: impl Into<String>) -> WorkerId {
        let mut worker = WorkerInstance::new(version);
        worker.set_state(WorkerState::Installing);
        let id = worker.id;
        self.installing = Some(worker);
        id
    }

    /// Transition installing to waiting.
    pub fn install_complete(&mut self) {
        if let Some(mut worker) = self.installing.take() {
            worker.set_state(WorkerState::Installed);
            self.waiting = Some(worker);
        }
    }

    /// Mark the installing worker redundant (install aborted).
    ///
    /// The old active worker, if any, stays in control.
    pub fn install_failed(&mut self) {
        if let Some(mut worker) = self.installing.take() {
            worker.set_state(WorkerState::Redundant);
        }
    }

    /// Promote the waiting worker to active, marking the old one redundant.
    pub fn activate(&mut self) {
        if let Some(mut worker) = self.waiting.take() {
            worker.set_state(WorkerState::Activating);

            if let Some(mut old) = self.active.take() {
                old.set_state(WorkerState::Redundant);
            }

            worker.set_state(WorkerState::Activated);
            self.active = Some(worker);
        }
    }

    /// Skip waiting (force activation of the waiting worker).
    pub fn skip_waiting(&mut self) {
        self.activate();
    }
}

/// The versioned cache-generation names current for one worker version.
///
/// Exactly one static and one dynamic generation are current at any time;
/// every other name found in storage is stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheGenerations {
    /// Base generation name (e.g., "dashboard-v1.0.0").
    pub base: String,

    /// Static asset generation (populated once at install).
    pub static_assets: String,

    /// Dynamic generation (continuously written by live traffic).
    pub dynamic: String,
}

impl CacheGenerations {
    /// Derive generation names from a cache prefix and version.
    pub fn new(prefix: &str, version: &str) -> Self {
        Self {
            base: format!("{prefix}-v{version}"),
            static_assets: format!("{prefix}-static-v{version}"),
            dynamic: format!("{prefix}-dynamic-v{version}"),
        }
    }

    /// Whether a stored cache name belongs to the current generation set.
    pub fn is_current(&self, name: &str) -> bool {
        name == self.base || name == self.static_assets || name == self.dynamic
    }
}

/// Drives install and activate transitions against the cache store.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    generations: CacheGenerations,
    origin: Url,
    static_assets: Vec<String>,
}

impl Lifecycle {
    /// Create a lifecycle controller.
    pub fn new(generations: CacheGenerations, origin: Url, static_assets: Vec<String>) -> Self {
        Self {
            generations,
            origin,
            static_assets,
        }
    }

    /// Populate the static cache with every asset on the list.
    ///
    /// Any single fetch-and-store failure aborts the whole install and
    /// removes the partially populated generation; a partial static cache is
    /// never left behind looking complete.
    pub async fn install(
        &self,
        store: &dyn CacheStore,
        fetcher: &dyn Fetch,
    ) -> Result<(), SwError> {
        info!(generation = %self.generations.static_assets, assets = self.static_assets.len(), "Installing");

        store.open(&self.generations.static_assets).await?;

        for asset in &self.static_assets {
            if let Err(e) = self.populate_asset(store, fetcher, asset).await {
                warn!(asset = %asset, error = %e, "Install aborted");
                let _ = store.delete_cache(&self.generations.static_assets).await;
                return Err(e);
            }
        }

        info!(generation = %self.generations.static_assets, "Install complete");
        Ok(())
    }

    async fn populate_asset(
        &self,
        store: &dyn CacheStore,
        fetcher: &dyn Fetch,
        asset: &str,
    ) -> Result<(), SwError> {
        let url = self
            .origin
            .join(asset)
            .map_err(|e| SwError::InstallFailed(format!("invalid asset URL {asset}: {e}")))?;

        let request = Request::get(url);
        let response = fetcher
            .fetch(&request)
            .await
            .map_err(|e| SwError::InstallFailed(format!("fetch {asset}: {e}")))?;

        if !response.ok() {
            return Err(SwError::InstallFailed(format!(
                "fetch {asset}: status {}",
                response.status
            )));
        }

        let entry = CacheEntry::snapshot(&request, &response);
        store
            .put(&self.generations.static_assets, &request.cache_key(), entry)
            .await?;

        debug!(asset = %asset, "Static asset cached");
        Ok(())
    }

    /// Delete every cache generation that is no longer current.
    ///
    /// Cleanup failures are logged and skipped; they never block the claim
    /// that follows activation. Returns the names actually deleted.
    pub async fn activate(&self, store: &dyn CacheStore) -> Vec<String> {
        let names = match store.cache_names().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Could not list caches during activation");
                return Vec::new();
            }
        };

        let mut deleted = Vec::new();
        for name in names {
            if self.generations.is_current(&name) {
                continue;
            }
            match store.delete_cache(&name).await {
                Ok(true) => {
                    info!(cache = %name, "Deleted stale cache generation");
                    deleted.push(name);
                }
                Ok(false) => {}
                Err(e) => warn!(cache = %name, error = %e, "Failed to delete stale cache"),
            }
        }
        deleted
    }

    /// The generation names this lifecycle considers current.
    pub fn generations(&self) -> &CacheGenerations {
        &self.generations
    }
}
