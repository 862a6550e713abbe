/// Mode/state controller: the externally observable session state machine
/// All components submit transitions through this controller; nothing mutates
/// the shared fields directly.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::{CollaborationError, CollaboratorId, DocumentId, Result};

/// Whether the session is backed by a shared document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMode {
    Local,
    Shared,
}

/// Synchronization status of the shared document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    /// Never synced: local mode, or just entered shared mode
    Idle,
    Syncing,
    Synced,
    Error,
    Offline,
}

/// Which mutation source currently owns the document, if any
///
/// Replaces a free-floating "currently receiving" flag: the change detector
/// and the remote update receiver consult one authoritative field, so a
/// remote apply can never be re-broadcast as a local edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncActivity {
    Idle,
    ApplyingRemote,
    WritingLocal,
}

/// Snapshot of the observable collaboration state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationState {
    pub mode: SessionMode,
    pub status: SyncStatus,
    pub activity: SyncActivity,
    pub document_id: Option<DocumentId>,
    pub invite_url: Option<String>,
    pub is_owner: bool,
    pub collaborator_id: CollaboratorId,
    pub last_error: Option<String>,
    pub last_synced_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_edited_by: Option<CollaboratorId>,
}

impl CollaborationState {
    fn local(collaborator_id: CollaboratorId) -> Self {
        Self {
            mode: SessionMode::Local,
            status: SyncStatus::Idle,
            activity: SyncActivity::Idle,
            document_id: None,
            invite_url: None,
            is_owner: false,
            collaborator_id,
            last_error: None,
            last_synced_at: None,
            last_edited_by: None,
        }
    }
}

/// Releases the single-transition-in-flight lock when dropped
pub(crate) struct TransitionGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for TransitionGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Publishes [`CollaborationState`] through a watch channel
#[derive(Clone)]
pub struct StateController {
    tx: Arc<watch::Sender<CollaborationState>>,
    transition: Arc<AtomicBool>,
}

impl StateController {
    pub fn new(collaborator_id: CollaboratorId) -> Self {
        let (tx, _rx) = watch::channel(CollaborationState::local(collaborator_id));
        Self {
            tx: Arc::new(tx),
            transition: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<CollaborationState> {
        self.tx.subscribe()
    }

    /// Current state snapshot
    pub fn current(&self) -> CollaborationState {
        self.tx.borrow().clone()
    }

    pub fn mode(&self) -> SessionMode {
        self.tx.borrow().mode
    }

    pub fn activity(&self) -> SyncActivity {
        self.tx.borrow().activity
    }

    /// Claim the single mode-transition slot
    ///
    /// A second start/join arriving while one is pending is rejected rather
    /// than interleaved.
    pub(crate) fn begin_transition(&self) -> Result<TransitionGuard> {
        if self
            .transition
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CollaborationError::TransitionInProgress);
        }
        Ok(TransitionGuard {
            flag: self.transition.clone(),
        })
    }

    pub(crate) fn enter_shared(
        &self,
        document_id: DocumentId,
        invite_url: String,
        is_owner: bool,
    ) {
        debug!(document_id = %document_id, is_owner, "entering shared mode");
        self.tx.send_modify(|s| {
            s.mode = SessionMode::Shared;
            s.status = SyncStatus::Idle;
            s.activity = SyncActivity::Idle;
            s.document_id = Some(document_id);
            s.invite_url = Some(invite_url);
            s.is_owner = is_owner;
            s.last_error = None;
        });
    }

    pub(crate) fn enter_local(&self) {
        debug!("returning to local mode");
        self.tx.send_modify(|s| {
            s.mode = SessionMode::Local;
            s.status = SyncStatus::Idle;
            s.activity = SyncActivity::Idle;
            s.document_id = None;
            s.invite_url = None;
            s.is_owner = false;
            s.last_edited_by = None;
        });
    }

    pub(crate) fn set_status(&self, status: SyncStatus) {
        self.tx.send_modify(|s| s.status = status);
    }

    pub(crate) fn set_activity(&self, activity: SyncActivity) {
        self.tx.send_modify(|s| s.activity = activity);
    }

    /// Record a successful sync and clear any stale error
    pub(crate) fn mark_synced(&self, last_edited_by: Option<CollaboratorId>) {
        self.tx.send_modify(|s| {
            s.status = SyncStatus::Synced;
            s.last_synced_at = Some(chrono::Utc::now());
            if let Some(editor) = last_edited_by {
                s.last_edited_by = Some(editor);
            }
            s.last_error = None;
        });
    }

    /// Record an applied remote snapshot, attributing its editor and taking
    /// the sync timestamp from the snapshot itself
    pub(crate) fn mark_remote_applied(
        &self,
        editor: CollaboratorId,
        at: chrono::DateTime<chrono::Utc>,
    ) {
        self.tx.send_modify(|s| {
            s.status = SyncStatus::Synced;
            s.last_synced_at = Some(at);
            s.last_edited_by = Some(editor);
            s.last_error = None;
        });
    }

    /// Surface an error as observable state; never propagates to UI code
    pub(crate) fn set_error(&self, error: &CollaborationError) {
        warn!(%error, "collaboration error");
        self.tx.send_modify(|s| {
            s.status = SyncStatus::Error;
            s.last_error = Some(error.to_string());
        });
    }

    /// Degraded state with no live backend: permanent until leave/rejoin
    pub(crate) fn set_offline(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(%message, "collaboration offline");
        self.tx.send_modify(|s| {
            s.status = SyncStatus::Offline;
            s.last_error = Some(message.clone());
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_local_idle() {
        let controller = StateController::new(CollaboratorId::new());
        let state = controller.current();

        assert_eq!(state.mode, SessionMode::Local);
        assert_eq!(state.status, SyncStatus::Idle);
        assert_eq!(state.activity, SyncActivity::Idle);
        assert!(state.document_id.is_none());
    }

    #[test]
    fn test_single_transition_in_flight() {
        let controller = StateController::new(CollaboratorId::new());

        let guard = controller.begin_transition().unwrap();
        assert!(matches!(
            controller.begin_transition(),
            Err(CollaborationError::TransitionInProgress)
        ));

        drop(guard);
        assert!(controller.begin_transition().is_ok());
    }

    #[test]
    fn test_enter_and_leave_shared() {
        let controller = StateController::new(CollaboratorId::new());
        let id = DocumentId::generate();

        controller.enter_shared(id.clone(), format!("http://x/?project={}", id), true);
        let state = controller.current();
        assert_eq!(state.mode, SessionMode::Shared);
        assert!(state.is_owner);
        assert_eq!(state.document_id, Some(id));

        controller.enter_local();
        let state = controller.current();
        assert_eq!(state.mode, SessionMode::Local);
        assert_eq!(state.status, SyncStatus::Idle);
        assert!(state.invite_url.is_none());
    }

    #[test]
    fn test_mark_synced_clears_error() {
        let controller = StateController::new(CollaboratorId::new());

        controller.set_error(&CollaborationError::WriteFailed("boom".to_string()));
        assert_eq!(controller.current().status, SyncStatus::Error);

        let editor = CollaboratorId::new();
        controller.mark_synced(Some(editor));
        let state = controller.current();
        assert_eq!(state.status, SyncStatus::Synced);
        assert_eq!(state.last_edited_by, Some(editor));
        assert!(state.last_error.is_none());
        assert!(state.last_synced_at.is_some());
    }
}
