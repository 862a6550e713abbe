/// Collaborative document synchronization engine
/// Keeps a shared project document consistent across editing sessions with
/// whole-snapshot last-writer-wins semantics and ephemeral presence.
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod config;
pub use config::*;

mod state;
pub use state::*;

mod store;
pub use store::*;

mod detector;
pub use detector::*;

mod scheduler;
pub use scheduler::*;

mod receiver;
pub use receiver::*;

mod presence;
pub use presence::*;

mod session;
pub use session::*;

#[derive(Debug, Error)]
pub enum CollaborationError {
    #[error("collaboration backend is not configured")]
    ConfigurationMissing,

    #[error("shared document not found: {0}")]
    DocumentNotFound(String),

    #[error("sync write failed: {0}")]
    WriteFailed(String),

    #[error("subscription failed: {0}")]
    SubscriptionFailed(String),

    #[error("failed to join shared session: {0}")]
    JoinFailed(String),

    #[error("a session transition is already in progress")]
    TransitionInProgress,
}

pub type Result<T> = std::result::Result<T, CollaborationError>;

/// Identifier for one editing session's collaborator
///
/// Generated once per process lifetime and never changes while the process
/// lives. Sole mechanism for echo suppression and last-editor attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollaboratorId(pub uuid::Uuid);

impl CollaboratorId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for CollaboratorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CollaboratorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a shared document in the external store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    /// Generate a fresh id (32 hex characters)
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
