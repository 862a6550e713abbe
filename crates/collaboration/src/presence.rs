/// Presence broadcasting
/// Periodic, best-effort publication of this session's collaborator metadata.
/// Write-only from the engine's perspective; rendering peer presence is an
/// external concern.
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::{CollaboratorId, DocumentId, DocumentStore};

/// Color assigned to a collaborator for cursor/attribution highlighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl DisplayColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Generate a color based on collaborator ID (deterministic)
    pub fn from_collaborator_id(id: CollaboratorId) -> Self {
        let bytes = id.0.as_bytes();
        Self {
            r: bytes[0],
            g: bytes[1],
            b: bytes[2],
        }
    }

    /// Convert to hex color string
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Process-stable collaborator identity
///
/// Generated once per session; not persisted across reloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaboratorIdentity {
    pub id: CollaboratorId,
    pub color: DisplayColor,
}

impl CollaboratorIdentity {
    pub fn generate() -> Self {
        let id = CollaboratorId::new();
        Self {
            id,
            color: DisplayColor::from_collaborator_id(id),
        }
    }
}

/// Ephemeral collaborator metadata, not part of the shared document
///
/// No expiry is enforced: a collaborator who disconnects ungracefully leaves
/// a stale entry behind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub collaborator_id: CollaboratorId,
    pub display_color: String,
    pub activity: String,
    pub last_heartbeat_at: chrono::DateTime<chrono::Utc>,
}

/// Heartbeat task for one shared session
///
/// Publishes immediately on entering shared mode, then on a fixed interval.
/// Failures are logged and ignored; document sync status is never touched.
pub struct PresenceBroadcaster {
    task: JoinHandle<()>,
}

impl PresenceBroadcaster {
    pub(crate) fn spawn(
        store: Arc<dyn DocumentStore>,
        document_id: DocumentId,
        identity: CollaboratorIdentity,
        activity: Arc<RwLock<String>>,
        interval: std::time::Duration,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let record = PresenceRecord {
                    collaborator_id: identity.id,
                    display_color: identity.color.to_hex(),
                    activity: activity.read().await.clone(),
                    last_heartbeat_at: chrono::Utc::now(),
                };
                if let Err(e) = store.publish_presence(&document_id, &record).await {
                    debug!(document_id = %document_id, error = %e, "presence publish failed");
                }
            }
        });
        Self { task }
    }
}

impl Drop for PresenceBroadcaster {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_from_id() {
        let id = CollaboratorId::new();
        let color = DisplayColor::from_collaborator_id(id);
        let hex = color.to_hex();

        assert!(hex.starts_with('#'));
        assert_eq!(hex.len(), 7);
        // Deterministic for the same id
        assert_eq!(color, DisplayColor::from_collaborator_id(id));
    }

    #[test]
    fn test_identity_is_self_consistent() {
        let identity = CollaboratorIdentity::generate();
        assert_eq!(
            identity.color,
            DisplayColor::from_collaborator_id(identity.id)
        );
    }
}
