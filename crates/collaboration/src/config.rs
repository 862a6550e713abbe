/// Engine configuration: tunable timing constants and invite link derivation
use std::time::Duration;

use crate::DocumentId;

/// Tunable settings for a collaboration session
#[derive(Debug, Clone)]
pub struct CollabConfig {
    /// Quiet period after the last local change before a sync write fires
    pub debounce_window: Duration,

    /// Cadence of the presence heartbeat while in shared mode
    pub heartbeat_interval: Duration,

    /// Origin of the invite link, e.g. `https://studio.example.com`
    pub origin: String,

    /// Path component of the invite link, e.g. `/`
    pub path: String,

    /// Document id supplied at startup (from an invite link); when present
    /// and the store is reachable, the session auto-joins on bootstrap
    pub startup_document_id: Option<DocumentId>,

    /// Maximum resubscription attempts after a lost subscription
    pub resubscribe_attempts: u32,

    /// Base delay for exponential-backoff resubscription
    pub resubscribe_base_delay: Duration,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(2000),
            heartbeat_interval: Duration::from_millis(30_000),
            origin: "http://localhost".to_string(),
            path: "/".to_string(),
            startup_document_id: None,
            resubscribe_attempts: 5,
            resubscribe_base_delay: Duration::from_millis(500),
        }
    }
}

impl CollabConfig {
    /// Derive the invite URL for a shared document
    pub fn invite_url(&self, id: &DocumentId) -> String {
        format!("{}{}?project={}", self.origin, self.path, id)
    }
}

/// Extract the shared document id from an invite URL
///
/// Looks for a single `project` query parameter; returns `None` when the URL
/// carries no such parameter.
pub fn document_id_from_url(url: &str) -> Option<DocumentId> {
    let query = url.split_once('?')?.1;
    let query = query.split('#').next().unwrap_or(query);

    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            if key == "project" && !value.is_empty() {
                return Some(DocumentId(value.to_string()));
            }
        }
    }

    None
}
