//! Synthesized responses served when both the network and the cache fail.
//!
//! Three shapes, matching what the caller can actually consume: navigations
//! get a styled HTML retry page, API calls get a parseable JSON payload,
//! everything else gets plain text. All carry status 503.

use http::StatusCode;
use serde::Serialize;

use offkit_net::Response;

/// Structured payload returned for offline API calls.
#[derive(Debug, Serialize)]
pub struct OfflinePayload {
    pub error: &'static str,
    pub message: &'static str,
}

const OFFLINE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>Offline</title>
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <style>
    body {
      font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif;
      text-align: center;
      padding: 50px;
      background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
      color: white;
      margin: 0;
      min-height: 100vh;
      display: flex;
      align-items: center;
      justify-content: center;
    }
    .container { max-width: 500px; }
    h1 { font-size: 2.5em; margin-bottom: 20px; }
    p { font-size: 1.2em; line-height: 1.6; }
    .retry-btn {
      background: rgba(255,255,255,0.2);
      border: 2px solid white;
      color: white;
      padding: 12px 24px;
      font-size: 16px;
      border-radius: 8px;
      cursor: pointer;
      margin-top: 20px;
    }
    .retry-btn:hover { background: rgba(255,255,255,0.3); }
  </style>
</head>
<body>
  <div class="container">
    <h1>&#128225; You're Offline</h1>
    <p>This page needs an internet connection to work properly. Please check your connection and try again.</p>
    <button class="retry-btn" onclick="window.location.reload()">Try Again</button>
  </div>
</body>
</html>
"#;

/// Offline fallback for document navigations: a retry page, status 503.
pub fn offline_page() -> Response {
    Response::new(
        StatusCode::SERVICE_UNAVAILABLE,
        "text/html; charset=utf-8",
        OFFLINE_PAGE,
    )
}

/// Offline fallback for API calls: structured JSON, status 503.
pub fn offline_json() -> Response {
    let payload = OfflinePayload {
        error: "Offline",
        message: "This request requires an internet connection",
    };
    // Serialization of a two-field struct of static strings cannot fail
    let body = serde_json::to_vec(&payload).unwrap_or_default();
    Response::new(StatusCode::SERVICE_UNAVAILABLE, "application/json", body)
}

/// Generic offline fallback: plain text, status 503.
pub fn offline_plain(message: &str) -> Response {
    Response::new(
        StatusCode::SERVICE_UNAVAILABLE,
        "text/plain; charset=utf-8",
        message.to_string(),
    )
}
