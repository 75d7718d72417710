//! Push notifications.
//!
//! A push payload becomes a notification with a fixed icon, badge, and
//! vibration pattern, and two actions: view and dismiss. Display goes
//! through the [`NotificationSink`] seam so the host platform (or a test)
//! decides how to render it.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::SwError;

/// Icon shown on every notification.
pub const NOTIFICATION_ICON: &str = "/logo192.png";

/// Badge shown on every notification.
pub const NOTIFICATION_BADGE: &str = "/badge-72x72.png";

/// Vibration pattern for every notification.
pub const VIBRATION_PATTERN: [u32; 3] = [200, 100, 200];

/// Action identifier for opening the notification's URL.
pub const ACTION_VIEW: &str = "view";

/// Action identifier for dismissing the notification.
pub const ACTION_DISMISS: &str = "dismiss";

/// Structured push payload. Senders may also push plain text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub url: Option<String>,
}

/// A notification action button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

/// A notification ready to display.
#[derive(Debug, Clone)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    /// URL opened when the view action is clicked.
    pub url: String,
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    /// Build a notification from a raw push payload.
    ///
    /// JSON payloads may carry title/body/url; anything else is treated as
    /// the body text. An empty push gets a default body.
    pub fn from_push(app_name: &str, payload: Option<&str>) -> Self {
        let parsed = match payload {
            Some(raw) => serde_json::from_str::<PushPayload>(raw).unwrap_or(PushPayload {
                body: Some(raw.to_string()),
                ..Default::default()
            }),
            None => PushPayload::default(),
        };

        Self {
            title: parsed.title.unwrap_or_else(|| app_name.to_string()),
            body: parsed
                .body
                .unwrap_or_else(|| format!("New notification from {app_name}")),
            icon: NOTIFICATION_ICON.to_string(),
            badge: NOTIFICATION_BADGE.to_string(),
            vibrate: VIBRATION_PATTERN.to_vec(),
            url: parsed.url.unwrap_or_else(|| "/".to_string()),
            actions: vec![
                NotificationAction {
                    action: ACTION_VIEW.to_string(),
                    title: "View".to_string(),
                    icon: "/view-icon.png".to_string(),
                },
                NotificationAction {
                    action: ACTION_DISMISS.to_string(),
                    title: "Dismiss".to_string(),
                    icon: "/dismiss-icon.png".to_string(),
                },
            ],
        }
    }
}

/// Platform seam for displaying notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn show(&self, notification: Notification) -> Result<(), SwError>;
}

/// Sink that only logs. Default when no platform is wired up.
#[derive(Debug, Default)]
pub struct NullNotificationSink;

#[async_trait]
impl NotificationSink for NullNotificationSink {
    async fn show(&self, notification: Notification) -> Result<(), SwError> {
        info!(title = %notification.title, body = %notification.body, "Notification (no sink)");
        Ok(())
    }
}
