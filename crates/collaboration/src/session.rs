/// Session lifecycle management
/// Owns the Local/Shared transition, the invite link, and the background
/// tasks (scheduler, receiver, presence) of an active shared session.
use std::sync::Arc;

use tokio::sync::{watch, Mutex, RwLock};
use tracing::{info, warn};

use crate::{
    ChangeDetector, CollabConfig, CollaborationError, CollaborationState, CollaboratorIdentity,
    DocumentId, DocumentStore, PresenceBroadcaster, ReceiverContext, RemoteUpdateReceiver,
    Result, SessionMode, SharedDocument, StateController, SyncActivity, SyncScheduler, SyncWriter,
};
use document::ProjectDocument;

/// One collaboration session per running client process
///
/// Starts in local mode. All errors are surfaced through the state
/// controller as observable status, never thrown at UI code; the document
/// stays editable under local semantics whatever the sync status is.
/// Dropping the manager aborts every background task.
pub struct SessionManager {
    config: CollabConfig,
    store: Option<Arc<dyn DocumentStore>>,
    identity: CollaboratorIdentity,
    state: StateController,
    document: Arc<RwLock<ProjectDocument>>,
    detector: Arc<Mutex<ChangeDetector>>,
    activity_label: Arc<RwLock<String>>,
    scheduler: Option<SyncScheduler>,
    receiver: Option<RemoteUpdateReceiver>,
    presence: Option<PresenceBroadcaster>,
}

impl SessionManager {
    /// Create a session; `store: None` means the backend is unconfigured and
    /// the session runs permanently local
    pub fn new(config: CollabConfig, store: Option<Arc<dyn DocumentStore>>) -> Self {
        let identity = CollaboratorIdentity::generate();
        Self {
            config,
            store,
            identity,
            state: StateController::new(identity.id),
            document: Arc::new(RwLock::new(ProjectDocument::new())),
            detector: Arc::new(Mutex::new(ChangeDetector::new())),
            activity_label: Arc::new(RwLock::new("editing".to_string())),
            scheduler: None,
            receiver: None,
            presence: None,
        }
    }

    /// Handle to the in-memory document shared with the application
    pub fn document(&self) -> Arc<RwLock<ProjectDocument>> {
        self.document.clone()
    }

    pub fn identity(&self) -> CollaboratorIdentity {
        self.identity
    }

    /// Observe state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<CollaborationState> {
        self.state.subscribe()
    }

    /// Current observable state
    pub fn state(&self) -> CollaborationState {
        self.state.current()
    }

    /// Describe what this collaborator is doing, for presence heartbeats
    pub async fn set_activity_label(&self, label: impl Into<String>) {
        *self.activity_label.write().await = label.into();
    }

    /// Mutate the document and run change detection afterwards
    pub async fn edit<F: FnOnce(&mut ProjectDocument)>(&self, f: F) {
        {
            let mut doc = self.document.write().await;
            f(&mut doc);
        }
        self.note_local_change().await;
    }

    /// Entry point for local-mutation notifications
    ///
    /// Disabled entirely in local mode, and suspended while a remote update
    /// is being applied so an externally-sourced mutation is never
    /// re-broadcast as a local edit.
    pub async fn note_local_change(&self) {
        let state = self.state.current();
        if state.mode != SessionMode::Shared {
            return;
        }
        if state.activity == SyncActivity::ApplyingRemote {
            return;
        }

        let dirty = {
            let doc = self.document.read().await;
            self.detector.lock().await.is_dirty(&doc)
        };
        if dirty {
            if let Some(scheduler) = &self.scheduler {
                scheduler.rearm();
            }
        }
    }

    /// Share the current document, returning the invite URL
    ///
    /// Idempotent while already shared: returns the existing invite URL.
    pub async fn start_sharing(&mut self) -> Result<String> {
        if self.state.mode() == SessionMode::Shared {
            if let Some(url) = self.state.current().invite_url {
                return Ok(url);
            }
        }

        let _guard = self.state.begin_transition().inspect_err(|e| {
            self.state.set_error(e);
        })?;
        let store = self.require_store()?;

        let document_id = DocumentId::generate();
        let snapshot = SharedDocument::tagged(
            self.document.read().await.clone(),
            self.identity.id,
        );

        store
            .create_document(&document_id, &snapshot)
            .await
            .inspect_err(|e| self.state.set_error(e))?;
        let subscription = store
            .subscribe(&document_id)
            .await
            .inspect_err(|e| self.state.set_error(e))?;

        self.detector.lock().await.mark_synced(&snapshot.document);

        let invite_url = self.config.invite_url(&document_id);
        self.state
            .enter_shared(document_id.clone(), invite_url.clone(), true);
        // The initial write is this session's first successful sync
        self.state.mark_synced(Some(self.identity.id));

        self.spawn_tasks(store, document_id.clone(), subscription);

        info!(document_id = %document_id, "started sharing");
        Ok(invite_url)
    }

    /// Join an existing shared document by id
    pub async fn join(&mut self, document_id: DocumentId) -> Result<String> {
        let _guard = self.state.begin_transition().inspect_err(|e| {
            self.state.set_error(e);
        })?;
        let store = self.require_store()?;

        let snapshot = store
            .load_document(&document_id)
            .await
            .map_err(|e| CollaborationError::JoinFailed(e.to_string()))
            .inspect_err(|e| self.state.set_error(e))?;

        let Some(snapshot) = snapshot else {
            // Mode stays local; the in-memory document is untouched.
            let e = CollaborationError::DocumentNotFound(document_id.0);
            self.state.set_error(&e);
            return Err(e);
        };

        let subscription = store
            .subscribe(&document_id)
            .await
            .inspect_err(|e| self.state.set_error(e))?;

        // Externally-sourced mutation: apply through the same suppression
        // path as a live remote update.
        self.state.set_activity(SyncActivity::ApplyingRemote);
        {
            let mut doc = self.document.write().await;
            *doc = snapshot.document.clone();
            self.detector.lock().await.mark_synced(&doc);
        }
        self.state.set_activity(SyncActivity::Idle);

        let invite_url = self.config.invite_url(&document_id);
        self.state
            .enter_shared(document_id.clone(), invite_url.clone(), false);
        self.state
            .mark_remote_applied(snapshot.last_edited_by, snapshot.updated_at);

        self.spawn_tasks(store, document_id.clone(), subscription);

        info!(document_id = %document_id, "joined shared session");
        Ok(invite_url)
    }

    /// Leave the shared session and return to local mode
    ///
    /// Cancels the pending debounce and the presence interval, closes the
    /// subscription, and clears the invite state. Safe to call when already
    /// local (no-op, no network calls). The remote document is not deleted.
    pub async fn stop_sharing(&mut self) {
        if self.state.mode() == SessionMode::Local {
            return;
        }

        info!("stopping shared session");
        // Scheduler drop cancels the pending deadline; a write already in
        // flight completes fire-and-forget and its result is discarded.
        self.scheduler = None;
        self.presence = None;
        if let Some(mut receiver) = self.receiver.take() {
            receiver.stop();
        }

        self.detector.lock().await.reset();
        self.state.enter_local();
    }

    /// Force an immediate write, bypassing the debounce timer
    ///
    /// Only meaningful in shared mode; no-op otherwise.
    pub fn sync_now(&self) {
        if self.state.mode() != SessionMode::Shared {
            return;
        }
        if let Some(scheduler) = &self.scheduler {
            scheduler.flush();
        }
    }

    /// Auto-join the startup document id (from an invite link), if any
    pub async fn bootstrap(&mut self) {
        let Some(document_id) = self.config.startup_document_id.clone() else {
            return;
        };
        if self.store.is_none() {
            warn!("startup document id present but no store configured");
            return;
        }
        if let Err(e) = self.join(document_id).await {
            // Already surfaced on the controller; the session stays local.
            warn!(error = %e, "startup auto-join failed");
        }
    }

    fn require_store(&self) -> Result<Arc<dyn DocumentStore>> {
        self.store.clone().ok_or_else(|| {
            let e = CollaborationError::ConfigurationMissing;
            self.state.set_offline(e.to_string());
            e
        })
    }

    fn spawn_tasks(
        &mut self,
        store: Arc<dyn DocumentStore>,
        document_id: DocumentId,
        subscription: crate::Subscription,
    ) {
        let writer = SyncWriter {
            store: store.clone(),
            document: self.document.clone(),
            detector: self.detector.clone(),
            state: self.state.clone(),
            document_id: document_id.clone(),
            collaborator_id: self.identity.id,
        };
        self.scheduler = Some(SyncScheduler::spawn(self.config.debounce_window, writer));

        self.receiver = Some(RemoteUpdateReceiver::spawn(
            subscription,
            ReceiverContext {
                store: store.clone(),
                document: self.document.clone(),
                detector: self.detector.clone(),
                state: self.state.clone(),
                document_id: document_id.clone(),
                collaborator_id: self.identity.id,
                resubscribe_attempts: self.config.resubscribe_attempts,
                resubscribe_base_delay: self.config.resubscribe_base_delay,
            },
        ));

        self.presence = Some(PresenceBroadcaster::spawn(
            store,
            document_id,
            self.identity,
            self.activity_label.clone(),
            self.config.heartbeat_interval,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SyncStatus;

    #[tokio::test]
    async fn test_share_without_store_goes_offline() {
        let mut session = SessionManager::new(CollabConfig::default(), None);

        let result = session.start_sharing().await;
        assert!(matches!(
            result,
            Err(CollaborationError::ConfigurationMissing)
        ));

        let state = session.state();
        assert_eq!(state.mode, SessionMode::Local);
        assert_eq!(state.status, SyncStatus::Offline);
        assert!(state.last_error.is_some());
    }

    #[tokio::test]
    async fn test_sync_now_is_noop_in_local_mode() {
        let session = SessionManager::new(CollabConfig::default(), None);
        session.sync_now();
        assert_eq!(session.state().status, SyncStatus::Idle);
    }

    #[tokio::test]
    async fn test_bootstrap_without_startup_id_stays_local() {
        let mut session = SessionManager::new(CollabConfig::default(), None);
        session.bootstrap().await;
        assert_eq!(session.state().mode, SessionMode::Local);
        assert_eq!(session.state().status, SyncStatus::Idle);
    }
}
