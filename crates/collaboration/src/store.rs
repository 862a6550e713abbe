/// Document store seam
/// The external store is opaque; its notification mechanism (listener
/// callback, polling, long-poll) hides behind the [`Subscription`] channel.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use document::ProjectDocument;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::{CollaborationError, CollaboratorId, DocumentId, PresenceRecord, Result};

/// The externally persisted snapshot unit
///
/// Every successful write fully replaces the prior snapshot: conflicts
/// resolve by last writer wins at whole-document granularity, and the losing
/// writer is not notified. This is an accepted limitation, not a merge layer
/// waiting to happen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedDocument {
    pub document: ProjectDocument,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub last_edited_by: CollaboratorId,
}

impl SharedDocument {
    /// Snapshot the given document, tagged with its editor
    pub fn tagged(document: ProjectDocument, editor: CollaboratorId) -> Self {
        Self {
            document,
            updated_at: chrono::Utc::now(),
            last_edited_by: editor,
        }
    }
}

/// Inbound event on a live document subscription
#[derive(Debug, Clone)]
pub enum DocumentEvent {
    /// A new snapshot was written to the store (own writes included; the
    /// receiver is responsible for echo suppression)
    Snapshot(SharedDocument),

    /// The realtime channel failed; the subscription delivers nothing more
    Lost(String),
}

/// Live subscription to one shared document
pub struct Subscription {
    pub(crate) events: mpsc::UnboundedReceiver<DocumentEvent>,
}

impl Subscription {
    pub async fn next(&mut self) -> Option<DocumentEvent> {
        self.events.recv().await
    }
}

/// External document store collaborator
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_document(&self, id: &DocumentId, snapshot: &SharedDocument) -> Result<()>;

    async fn load_document(&self, id: &DocumentId) -> Result<Option<SharedDocument>>;

    async fn update_document(
        &self,
        id: &DocumentId,
        snapshot: &SharedDocument,
        origin: &CollaboratorId,
    ) -> Result<()>;

    async fn subscribe(&self, id: &DocumentId) -> Result<Subscription>;

    /// Best-effort presence publish; callers ignore failures
    async fn publish_presence(&self, id: &DocumentId, record: &PresenceRecord) -> Result<()>;
}

struct DocEntry {
    snapshot: SharedDocument,
    subscribers: Vec<mpsc::UnboundedSender<DocumentEvent>>,
}

/// In-process reference store
///
/// Per-document snapshot plus subscriber fan-out; every update is delivered
/// to every live subscriber, the origin's own session included.
#[derive(Clone, Default)]
pub struct MemoryStore {
    documents: Arc<RwLock<HashMap<DocumentId, DocEntry>>>,
    presence: Arc<RwLock<HashMap<DocumentId, HashMap<CollaboratorId, PresenceRecord>>>>,
    presence_publishes: Arc<RwLock<HashMap<DocumentId, usize>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest stored snapshot, if any
    pub async fn snapshot(&self, id: &DocumentId) -> Option<SharedDocument> {
        self.documents
            .read()
            .await
            .get(id)
            .map(|e| e.snapshot.clone())
    }

    /// Presence records currently held for a document
    pub async fn presence_for(&self, id: &DocumentId) -> Vec<PresenceRecord> {
        self.presence
            .read()
            .await
            .get(id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Total presence publishes seen for a document
    pub async fn presence_publishes(&self, id: &DocumentId) -> usize {
        self.presence_publishes
            .read()
            .await
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    /// Sever every live subscription for a document, as a failing realtime
    /// channel would
    pub async fn sever_subscriptions(&self, id: &DocumentId, reason: &str) {
        let mut documents = self.documents.write().await;
        if let Some(entry) = documents.get_mut(id) {
            for tx in entry.subscribers.drain(..) {
                let _ = tx.send(DocumentEvent::Lost(reason.to_string()));
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_document(&self, id: &DocumentId, snapshot: &SharedDocument) -> Result<()> {
        let mut documents = self.documents.write().await;
        if documents.contains_key(id) {
            return Err(CollaborationError::WriteFailed(format!(
                "document already exists: {}",
                id
            )));
        }
        documents.insert(
            id.clone(),
            DocEntry {
                snapshot: snapshot.clone(),
                subscribers: Vec::new(),
            },
        );
        debug!(document_id = %id, "created shared document");
        Ok(())
    }

    async fn load_document(&self, id: &DocumentId) -> Result<Option<SharedDocument>> {
        Ok(self
            .documents
            .read()
            .await
            .get(id)
            .map(|e| e.snapshot.clone()))
    }

    async fn update_document(
        &self,
        id: &DocumentId,
        snapshot: &SharedDocument,
        origin: &CollaboratorId,
    ) -> Result<()> {
        let mut documents = self.documents.write().await;
        let entry = documents
            .get_mut(id)
            .ok_or_else(|| CollaborationError::WriteFailed(format!("no such document: {}", id)))?;

        entry.snapshot = snapshot.clone();
        entry
            .subscribers
            .retain(|tx| tx.send(DocumentEvent::Snapshot(snapshot.clone())).is_ok());

        debug!(document_id = %id, origin = %origin, "updated shared document");
        Ok(())
    }

    async fn subscribe(&self, id: &DocumentId) -> Result<Subscription> {
        let mut documents = self.documents.write().await;
        let entry = documents.get_mut(id).ok_or_else(|| {
            CollaborationError::SubscriptionFailed(format!("no such document: {}", id))
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        entry.subscribers.push(tx);
        Ok(Subscription { events: rx })
    }

    async fn publish_presence(&self, id: &DocumentId, record: &PresenceRecord) -> Result<()> {
        self.presence
            .write()
            .await
            .entry(id.clone())
            .or_default()
            .insert(record.collaborator_id, record.clone());
        *self
            .presence_publishes
            .write()
            .await
            .entry(id.clone())
            .or_insert(0) += 1;
        Ok(())
    }
}
