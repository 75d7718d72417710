//! The offline worker: one object owning the router, strategies, lifecycle,
//! clients, and hooks, driven by a host-dispatched event stream.
//!
//! Each event handler runs to completion before the event counts as
//! settled; the host awaits the returned future and must not tear the
//! worker down underneath it. After a successful install the worker is
//! ready for immediate activation, so the host dispatches `Activate` right
//! away instead of waiting for old pages to close.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use offkit_common::retry::RetryConfig;
use offkit_net::{Fetch, Request, Response};

use crate::cache::CacheStore;
use crate::clients::{Client, Clients};
use crate::lifecycle::{CacheGenerations, Lifecycle, Registration};
use crate::notify::{Notification, NotificationSink, NullNotificationSink, ACTION_VIEW};
use crate::router::{RouteDecision, Router, RouterConfig};
use crate::strategy::Strategies;
use crate::sync::{flush_with_retry, NoopSyncHandler, SyncHandler, BACKGROUND_SYNC_TAG};
use crate::SwError;

/// Worker configuration, fixed at build/deploy time.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Origin of the controlled pages.
    pub origin: Url,
    /// Application name used in notification defaults.
    pub app_name: String,
    /// Prefix for cache generation names.
    pub cache_prefix: String,
    /// Version string; bumping it starts a new generation set.
    pub version: String,
    /// Path prefix identifying backend API calls.
    pub api_prefix: String,
    /// Site-relative paths cached at install.
    pub static_assets: Vec<String>,
    /// Backoff policy for background-sync flushes.
    pub retry: RetryConfig,
}

impl WorkerConfig {
    /// Config with the standard dashboard asset list.
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            app_name: "Dashboard".to_string(),
            cache_prefix: "dashboard".to_string(),
            version: "1.0.0".to_string(),
            api_prefix: "/api/".to_string(),
            static_assets: vec![
                "/".to_string(),
                "/static/js/bundle.js".to_string(),
                "/static/css/main.css".to_string(),
                "/manifest.json".to_string(),
                "/favicon.ico".to_string(),
            ],
            retry: RetryConfig::default(),
        }
    }
}

/// Control messages a page can post to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Force immediate activation of the waiting worker.
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
}

/// Events the host runtime dispatches to the worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Message(ControlMessage),
    /// Raw push payload, if any.
    Push(Option<String>),
    NotificationClick {
        action: String,
        url: Option<String>,
    },
    Sync {
        tag: String,
    },
    PeriodicSync {
        tag: String,
    },
}

/// How an event settled.
#[derive(Debug)]
pub enum EventOutcome {
    /// Event handled to completion.
    Settled,
    /// Fetch event resolved with a response.
    Respond(Response),
    /// Fetch event not intercepted; the request proceeds untouched.
    Passthrough,
}

/// The offline cache worker.
pub struct OfflineWorker {
    config: WorkerConfig,
    lifecycle: Lifecycle,
    router: Router,
    strategies: Strategies,
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetch>,
    registration: RwLock<Registration>,
    clients: RwLock<Clients>,
    notifications: Arc<dyn NotificationSink>,
    sync_handler: Arc<dyn SyncHandler>,
}

impl OfflineWorker {
    /// Create a worker over the given store and fetcher.
    pub fn new(config: WorkerConfig, store: Arc<dyn CacheStore>, fetcher: Arc<dyn Fetch>) -> Self {
        let generations = CacheGenerations::new(&config.cache_prefix, &config.version);

        let lifecycle = Lifecycle::new(
            generations.clone(),
            config.origin.clone(),
            config.static_assets.clone(),
        );

        let router = Router::new(RouterConfig {
            origin: config.origin.clone(),
            api_prefix: config.api_prefix.clone(),
            static_assets: config.static_assets.clone(),
        });

        let strategies = Strategies::new(store.clone(), fetcher.clone(), generations);

        Self {
            config,
            lifecycle,
            router,
            strategies,
            store,
            fetcher,
            registration: RwLock::new(Registration::new()),
            clients: RwLock::new(Clients::new()),
            notifications: Arc::new(NullNotificationSink),
            sync_handler: Arc::new(NoopSyncHandler),
        }
    }

    /// Replace the notification sink.
    pub fn with_notifications(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifications = sink;
        self
    }

    /// Replace the background-sync handler.
    pub fn with_sync_handler(mut self, handler: Arc<dyn SyncHandler>) -> Self {
        self.sync_handler = handler;
        self
    }

    /// The generation names this worker considers current.
    pub fn generations(&self) -> &CacheGenerations {
        self.lifecycle.generations()
    }

    /// Register an open page with the worker.
    pub async fn register_client(&self, url: Url) -> Client {
        self.clients.write().await.add(url)
    }

    /// Read access to the registration, for host inspection.
    pub async fn registration(&self) -> tokio::sync::RwLockReadGuard<'_, Registration> {
        self.registration.read().await
    }

    /// Handle one event to completion.
    ///
    /// Fetch events always resolve (`Respond` or `Passthrough`); only
    /// lifecycle and hook events can fail.
    pub async fn handle_event(&self, event: WorkerEvent) -> Result<EventOutcome, SwError> {
        match event {
            WorkerEvent::Install => self.on_install().await,
            WorkerEvent::Activate => self.on_activate().await,
            WorkerEvent::Fetch(request) => Ok(self.on_fetch(request).await),
            WorkerEvent::Message(message) => self.on_message(message).await,
            WorkerEvent::Push(payload) => self.on_push(payload.as_deref()).await,
            WorkerEvent::NotificationClick { action, url } => {
                self.on_notification_click(&action, url.as_deref()).await
            }
            WorkerEvent::Sync { tag } | WorkerEvent::PeriodicSync { tag } => {
                self.on_sync(&tag).await
            }
        }
    }

    async fn on_install(&self) -> Result<EventOutcome, SwError> {
        self.registration
            .write()
            .await
            .begin_install(&self.config.version);

        match self
            .lifecycle
            .install(self.store.as_ref(), self.fetcher.as_ref())
            .await
        {
            Ok(()) => {
                let mut registration = self.registration.write().await;
                registration.install_complete();
                info!(version = %self.config.version, "Worker installed");
                Ok(EventOutcome::Settled)
            }
            Err(e) => {
                // The old active worker, if any, stays in control
                self.registration.write().await.install_failed();
                Err(e)
            }
        }
    }

    async fn on_activate(&self) -> Result<EventOutcome, SwError> {
        self.registration.write().await.activate();

        let deleted = self.lifecycle.activate(self.store.as_ref()).await;
        if !deleted.is_empty() {
            debug!(?deleted, "Stale cache generations removed");
        }

        let claimed = self.clients.write().await.claim();
        info!(version = %self.config.version, claimed, "Worker activated");
        Ok(EventOutcome::Settled)
    }

    async fn on_fetch(&self, request: Request) -> EventOutcome {
        match self.router.classify(&request) {
            RouteDecision::Passthrough => EventOutcome::Passthrough,
            RouteDecision::Dispatch(kind) => {
                let response = self.strategies.run(kind, &request).await;
                EventOutcome::Respond(response)
            }
        }
    }

    async fn on_message(&self, message: ControlMessage) -> Result<EventOutcome, SwError> {
        match message {
            ControlMessage::SkipWaiting => {
                info!("Skip-waiting requested");
                self.registration.write().await.skip_waiting();
                Ok(EventOutcome::Settled)
            }
        }
    }

    async fn on_push(&self, payload: Option<&str>) -> Result<EventOutcome, SwError> {
        let notification = Notification::from_push(&self.config.app_name, payload);
        self.notifications.show(notification).await?;
        Ok(EventOutcome::Settled)
    }

    async fn on_notification_click(
        &self,
        action: &str,
        url: Option<&str>,
    ) -> Result<EventOutcome, SwError> {
        if action != ACTION_VIEW {
            debug!(action, "Notification dismissed");
            return Ok(EventOutcome::Settled);
        }

        let target = self
            .config
            .origin
            .join(url.unwrap_or("/"))
            .map_err(|e| SwError::StateError(format!("bad notification URL: {e}")))?;

        self.clients.write().await.focus_or_open(target)?;
        Ok(EventOutcome::Settled)
    }

    async fn on_sync(&self, tag: &str) -> Result<EventOutcome, SwError> {
        if tag != BACKGROUND_SYNC_TAG {
            debug!(tag, "Ignoring sync event with unknown tag");
            return Ok(EventOutcome::Settled);
        }

        if let Err(e) = flush_with_retry(self.sync_handler.as_ref(), &self.config.retry).await {
            warn!(error = %e, "Background sync flush failed");
            return Err(e);
        }
        Ok(EventOutcome::Settled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::lifecycle::WorkerState;
    use crate::testutil::{CountingSyncHandler, FakeFetch, RecordingSink};
    use http::{Method, StatusCode};
    use std::sync::atomic::Ordering;

    fn origin() -> Url {
        Url::parse("https://dashboard.example").unwrap()
    }

    fn scripted_assets(fetch: &FakeFetch) {
        for (path, body) in [
            ("https://dashboard.example/", "<html></html>"),
            ("https://dashboard.example/static/js/bundle.js", "js"),
            ("https://dashboard.example/static/css/main.css", "css"),
            ("https://dashboard.example/manifest.json", "{}"),
            ("https://dashboard.example/favicon.ico", "ico"),
        ] {
            fetch.respond(path, Response::new(StatusCode::OK, "text/plain", body));
        }
    }

    fn worker() -> (Arc<MemoryCacheStore>, Arc<FakeFetch>, OfflineWorker) {
        let store = Arc::new(MemoryCacheStore::new());
        let fetch = Arc::new(FakeFetch::new());
        let worker = OfflineWorker::new(
            WorkerConfig::new(origin()),
            store.clone(),
            fetch.clone(),
        );
        (store, fetch, worker)
    }

    async fn install_and_activate(worker: &OfflineWorker) {
        worker.handle_event(WorkerEvent::Install).await.unwrap();
        worker.handle_event(WorkerEvent::Activate).await.unwrap();
    }

    fn get(url: &str) -> Request {
        Request::get(Url::parse(url).unwrap())
    }

    #[test]
    fn test_control_message_wire_format() {
        let message: ControlMessage = serde_json::from_str(r#"{"type":"SKIP_WAITING"}"#).unwrap();
        assert_eq!(message, ControlMessage::SkipWaiting);

        // Pages post exactly this shape
        assert_eq!(
            serde_json::to_string(&ControlMessage::SkipWaiting).unwrap(),
            r#"{"type":"SKIP_WAITING"}"#
        );
    }

    #[tokio::test]
    async fn test_install_then_activate() {
        let (_store, fetch, worker) = worker();
        scripted_assets(&fetch);

        worker.handle_event(WorkerEvent::Install).await.unwrap();
        {
            let registration = worker.registration().await;
            assert!(registration.waiting.is_some());
            assert!(registration.active.is_none());
        }

        worker.handle_event(WorkerEvent::Activate).await.unwrap();
        let registration = worker.registration().await;
        assert_eq!(
            registration.active.as_ref().unwrap().state,
            WorkerState::Activated
        );
    }

    #[tokio::test]
    async fn test_failed_install_leaves_no_static_cache() {
        let (store, fetch, worker) = worker();
        // Script only some of the assets
        fetch.respond(
            "https://dashboard.example/",
            Response::new(StatusCode::OK, "text/html", "<html></html>"),
        );

        let result = worker.handle_event(WorkerEvent::Install).await;
        assert!(result.is_err());

        assert!(worker.registration().await.waiting.is_none());
        assert!(!store
            .cache_names()
            .await
            .unwrap()
            .contains(&"dashboard-static-v1.0.0".to_string()));
    }

    #[tokio::test]
    async fn test_skip_waiting_message_promotes_waiting_worker() {
        let (_store, fetch, worker) = worker();
        scripted_assets(&fetch);

        worker.handle_event(WorkerEvent::Install).await.unwrap();
        worker
            .handle_event(WorkerEvent::Message(ControlMessage::SkipWaiting))
            .await
            .unwrap();

        let registration = worker.registration().await;
        assert!(registration.waiting.is_none());
        assert!(registration.active.as_ref().unwrap().is_active());
    }

    #[tokio::test]
    async fn test_non_retrieval_fetch_passes_through() {
        let (_store, fetch, worker) = worker();
        scripted_assets(&fetch);
        install_and_activate(&worker).await;

        let request = get("https://dashboard.example/api/sponsors").method(Method::POST);
        let outcome = worker.handle_event(WorkerEvent::Fetch(request)).await.unwrap();
        assert!(matches!(outcome, EventOutcome::Passthrough));
    }

    #[tokio::test]
    async fn test_precached_asset_served_with_zero_network_calls() {
        let (_store, fetch, worker) = worker();
        scripted_assets(&fetch);
        install_and_activate(&worker).await;

        let calls_after_install = fetch.calls();
        let request = get("https://dashboard.example/static/js/bundle.js");
        let outcome = worker.handle_event(WorkerEvent::Fetch(request)).await.unwrap();

        match outcome {
            EventOutcome::Respond(response) => {
                assert_eq!(response.text().unwrap(), "js");
            }
            other => panic!("expected response, got {other:?}"),
        }
        assert_eq!(fetch.calls(), calls_after_install);
    }

    #[tokio::test]
    async fn test_offline_api_call_gets_json_503() {
        let (_store, fetch, worker) = worker();
        scripted_assets(&fetch);
        install_and_activate(&worker).await;
        fetch.go_offline();

        let request = get("https://dashboard.example/api/sponsors");
        let outcome = worker.handle_event(WorkerEvent::Fetch(request)).await.unwrap();

        match outcome {
            EventOutcome::Respond(response) => {
                assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(
                    response.text().unwrap(),
                    r#"{"error":"Offline","message":"This request requires an internet connection"}"#
                );
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_offline_navigation_gets_retry_page() {
        let (_store, fetch, worker) = worker();
        scripted_assets(&fetch);
        install_and_activate(&worker).await;
        fetch.go_offline();

        let request = Request::document(Url::parse("https://dashboard.example/sponsors").unwrap());
        let outcome = worker.handle_event(WorkerEvent::Fetch(request)).await.unwrap();

        match outcome {
            EventOutcome::Respond(response) => {
                assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
                assert!(response.content_type().unwrap().starts_with("text/html"));
                assert!(response.text().unwrap().contains("Try Again"));
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_activation_removes_stale_generations() {
        let (store, fetch, worker) = worker();
        scripted_assets(&fetch);
        store.open("dashboard-static-v0.9.0").await.unwrap();
        store.open("legacy-v0").await.unwrap();

        install_and_activate(&worker).await;

        // The dynamic generation is created lazily, on first write
        assert_eq!(
            store.cache_names().await.unwrap(),
            vec!["dashboard-static-v1.0.0"]
        );
    }

    #[tokio::test]
    async fn test_activation_claims_open_pages() {
        let (_store, fetch, worker) = worker();
        scripted_assets(&fetch);

        let client = worker
            .register_client(Url::parse("https://dashboard.example/").unwrap())
            .await;
        assert!(!client.controlled);

        install_and_activate(&worker).await;

        let clients = worker.clients.read().await;
        assert!(clients.get(&client.id).unwrap().controlled);
    }

    #[tokio::test]
    async fn test_stale_while_revalidate_through_fetch_event() {
        let (store, fetch, worker) = worker();
        scripted_assets(&fetch);
        install_and_activate(&worker).await;

        let request = get("https://dashboard.example/avatars/1.png");
        fetch.respond(
            "https://dashboard.example/avatars/1.png",
            Response::new(StatusCode::OK, "image/png", "v1"),
        );

        // Cold cache: network result
        let outcome = worker
            .handle_event(WorkerEvent::Fetch(request.clone()))
            .await
            .unwrap();
        match outcome {
            EventOutcome::Respond(response) => assert_eq!(response.text().unwrap(), "v1"),
            other => panic!("expected response, got {other:?}"),
        }

        // Warm cache: stale copy, refresh detached
        fetch.go_offline();
        fetch.respond(
            "https://dashboard.example/avatars/1.png",
            Response::new(StatusCode::OK, "image/png", "v2"),
        );
        let outcome = worker
            .handle_event(WorkerEvent::Fetch(request.clone()))
            .await
            .unwrap();
        match outcome {
            EventOutcome::Respond(response) => assert_eq!(response.text().unwrap(), "v1"),
            other => panic!("expected response, got {other:?}"),
        }

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let cached = store
            .match_entry("dashboard-dynamic-v1.0.0", &request.cache_key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cached.body, b"v2".to_vec());
    }

    #[tokio::test]
    async fn test_push_shows_notification() {
        let sink = Arc::new(RecordingSink::default());
        let worker = OfflineWorker::new(
            WorkerConfig::new(origin()),
            Arc::new(MemoryCacheStore::new()),
            Arc::new(FakeFetch::new()),
        )
        .with_notifications(sink.clone());

        worker
            .handle_event(WorkerEvent::Push(Some(
                r#"{"title":"Emails","body":"Campaign sent","url":"/emails"}"#.to_string(),
            )))
            .await
            .unwrap();

        let shown = sink.shown.lock().unwrap();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].title, "Emails");
        assert_eq!(shown[0].url, "/emails");
    }

    #[tokio::test]
    async fn test_notification_view_click_opens_page() {
        let (_store, _fetch, worker) = worker();

        worker
            .handle_event(WorkerEvent::NotificationClick {
                action: "view".to_string(),
                url: Some("/emails".to_string()),
            })
            .await
            .unwrap();

        let clients = worker.clients.read().await;
        let opened: Vec<_> = clients.all().collect();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].url.path(), "/emails");
        assert!(opened[0].focused);
    }

    #[tokio::test]
    async fn test_notification_dismiss_click_is_inert() {
        let (_store, _fetch, worker) = worker();

        worker
            .handle_event(WorkerEvent::NotificationClick {
                action: "dismiss".to_string(),
                url: None,
            })
            .await
            .unwrap();

        assert_eq!(worker.clients.read().await.all().count(), 0);
    }

    #[tokio::test]
    async fn test_sync_flushes_only_known_tag() {
        let handler = Arc::new(CountingSyncHandler::default());
        let worker = OfflineWorker::new(
            WorkerConfig::new(origin()),
            Arc::new(MemoryCacheStore::new()),
            Arc::new(FakeFetch::new()),
        )
        .with_sync_handler(handler.clone());

        worker
            .handle_event(WorkerEvent::Sync {
                tag: "unrelated".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(handler.flushes.load(Ordering::SeqCst), 0);

        worker
            .handle_event(WorkerEvent::Sync {
                tag: BACKGROUND_SYNC_TAG.to_string(),
            })
            .await
            .unwrap();
        assert_eq!(handler.flushes.load(Ordering::SeqCst), 1);

        worker
            .handle_event(WorkerEvent::PeriodicSync {
                tag: BACKGROUND_SYNC_TAG.to_string(),
            })
            .await
            .unwrap();
        assert_eq!(handler.flushes.load(Ordering::SeqCst), 2);
    }
}
