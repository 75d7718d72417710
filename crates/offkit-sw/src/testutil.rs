//! Test doubles injected through the store/fetch/notification seams.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use hashbrown::HashMap;

use offkit_net::{Fetch, NetError, Request, Response};

use crate::notify::{Notification, NotificationSink};
use crate::sync::SyncHandler;
use crate::SwError;

/// Scripted fetcher. URLs with no scripted response fail as if offline.
///
/// Multiple responses queued for one URL are served in order; the last one
/// is sticky and repeats.
#[derive(Default)]
pub(crate) struct FakeFetch {
    responses: Mutex<HashMap<String, VecDeque<Response>>>,
    calls: AtomicUsize,
}

impl FakeFetch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for a URL.
    pub fn respond(&self, url: &str, response: Response) {
        let mut responses = self.responses.lock().unwrap();
        responses.entry(url.to_string()).or_default().push_back(response);
    }

    /// Drop all scripted responses, so every fetch fails from now on.
    pub fn go_offline(&self) {
        self.responses.lock().unwrap().clear();
    }

    /// Number of fetch calls observed.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetch for FakeFetch {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut responses = self.responses.lock().unwrap();
        let queue = responses
            .get_mut(request.url.as_str())
            .filter(|q| !q.is_empty())
            .ok_or_else(|| NetError::RequestFailed("offline".to_string()))?;

        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap())
        } else {
            Ok(queue.front().unwrap().clone())
        }
    }
}

/// Notification sink that records what was shown.
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub shown: Mutex<Vec<Notification>>,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn show(&self, notification: Notification) -> Result<(), SwError> {
        self.shown.lock().unwrap().push(notification);
        Ok(())
    }
}

/// Sync handler that counts flushes and can be scripted to fail.
#[derive(Default)]
pub(crate) struct CountingSyncHandler {
    pub flushes: AtomicUsize,
    pub failures_before_success: AtomicUsize,
}

impl CountingSyncHandler {
    pub fn failing(failures: usize) -> Self {
        Self {
            flushes: AtomicUsize::new(0),
            failures_before_success: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl SyncHandler for CountingSyncHandler {
    async fn flush(&self) -> Result<(), SwError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_before_success.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_before_success.store(remaining - 1, Ordering::SeqCst);
            return Err(SwError::NetworkError("flush failed".to_string()));
        }
        Ok(())
    }
}
