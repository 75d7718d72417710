//! Controlled pages.
//!
//! A minimal registry of the pages this worker controls, enough to claim
//! them on activation and to focus or open a page when a notification is
//! clicked.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use tracing::debug;
use url::Url;

use crate::SwError;

/// A client (controlled page).
#[derive(Debug, Clone)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Client URL.
    pub url: Url,

    /// Whether focused.
    pub focused: bool,

    /// Whether controlled by the active worker.
    pub controlled: bool,
}

fn next_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Registry of open pages.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open page.
    pub fn add(&mut self, url: Url) -> Client {
        let id = next_client_id();
        let client = Client {
            id: id.clone(),
            url,
            focused: false,
            controlled: false,
        };
        self.clients.insert(id, client.clone());
        client
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Remove a client (page closed).
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    /// All registered clients.
    pub fn all(&self) -> impl Iterator<Item = &Client> {
        self.clients.values()
    }

    /// Take control of every open page.
    ///
    /// Called after activation so already-open pages route traffic through
    /// the new worker without a reload.
    pub fn claim(&mut self) -> usize {
        let mut claimed = 0;
        for client in self.clients.values_mut() {
            if !client.controlled {
                client.controlled = true;
                claimed += 1;
            }
        }
        debug!(claimed, total = self.clients.len(), "Clients claimed");
        claimed
    }

    /// Open a new page at the given URL.
    pub fn open_window(&mut self, url: Url) -> Result<Client, SwError> {
        for client in self.clients.values_mut() {
            client.focused = false;
        }

        let id = next_client_id();
        let client = Client {
            id: id.clone(),
            url,
            focused: true,
            controlled: true,
        };
        self.clients.insert(id, client.clone());
        Ok(client)
    }

    /// Focus an existing page at the URL, or open a new one.
    pub fn focus_or_open(&mut self, url: Url) -> Result<Client, SwError> {
        let existing = self
            .clients
            .values()
            .find(|c| c.url == url)
            .map(|c| c.id.clone());

        match existing {
            Some(id) => {
                for client in self.clients.values_mut() {
                    client.focused = client.id == id;
                }
                self.clients
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| SwError::NotFound(id))
            }
            None => self.open_window(url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_add_and_get() {
        let mut clients = Clients::new();
        let id = clients.add(url("https://dashboard.example/")).id;

        let client = clients.get(&id).unwrap();
        assert!(!client.controlled);
        assert!(!client.focused);
    }

    #[test]
    fn test_claim_controls_all_clients() {
        let mut clients = Clients::new();
        clients.add(url("https://dashboard.example/"));
        clients.add(url("https://dashboard.example/sponsors"));

        assert_eq!(clients.claim(), 2);
        assert!(clients.all().all(|c| c.controlled));

        // Claiming again is a no-op
        assert_eq!(clients.claim(), 0);
    }

    #[test]
    fn test_open_window_focuses_new_client() {
        let mut clients = Clients::new();
        let first = clients.open_window(url("https://dashboard.example/")).unwrap();
        let second = clients
            .open_window(url("https://dashboard.example/emails"))
            .unwrap();

        assert!(!clients.get(&first.id).unwrap().focused);
        assert!(clients.get(&second.id).unwrap().focused);
    }

    #[test]
    fn test_focus_or_open_reuses_existing_page() {
        let mut clients = Clients::new();
        let existing = clients
            .open_window(url("https://dashboard.example/certificates"))
            .unwrap();
        clients.open_window(url("https://dashboard.example/")).unwrap();

        let focused = clients
            .focus_or_open(url("https://dashboard.example/certificates"))
            .unwrap();

        assert_eq!(focused.id, existing.id);
        assert_eq!(clients.all().count(), 2);
        assert!(clients.get(&existing.id).unwrap().focused);
    }

    #[test]
    fn test_focus_or_open_opens_when_missing() {
        let mut clients = Clients::new();
        clients.open_window(url("https://dashboard.example/")).unwrap();

        let opened = clients
            .focus_or_open(url("https://dashboard.example/analytics"))
            .unwrap();

        assert_eq!(clients.all().count(), 2);
        assert!(opened.focused);
    }
}
