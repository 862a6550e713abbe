/// Debounced sync scheduling
/// Coalesces bursts of local mutations into one outbound whole-snapshot write
/// after a quiet period. Pure debounce: a change arriving before the timer
/// fires restarts it.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::{
    ChangeDetector, CollaboratorId, DocumentId, DocumentStore, SessionMode, SharedDocument,
    StateController, SyncActivity, SyncStatus,
};
use document::ProjectDocument;

/// Performs the tagged whole-snapshot write and drives sync status
///
/// Shared by the debounce timer and the manual sync-now path; writes execute
/// sequentially inside the scheduler task, so at most one is in flight.
pub(crate) struct SyncWriter {
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) document: Arc<RwLock<ProjectDocument>>,
    pub(crate) detector: Arc<Mutex<ChangeDetector>>,
    pub(crate) state: StateController,
    pub(crate) document_id: DocumentId,
    pub(crate) collaborator_id: CollaboratorId,
}

impl SyncWriter {
    pub(crate) async fn write_now(&self) {
        if self.state.mode() != SessionMode::Shared {
            return;
        }

        self.state.set_activity(SyncActivity::WritingLocal);
        self.state.set_status(SyncStatus::Syncing);

        let snapshot = SharedDocument::tagged(
            self.document.read().await.clone(),
            self.collaborator_id,
        );
        let result = self
            .store
            .update_document(&self.document_id, &snapshot, &self.collaborator_id)
            .await;

        // The session may have stopped sharing while the write was in
        // flight; the write was allowed to complete but its result is
        // discarded by the now-local session.
        if self.state.mode() != SessionMode::Shared {
            return;
        }

        match result {
            Ok(()) => {
                self.detector.lock().await.mark_synced(&snapshot.document);
                self.state.mark_synced(Some(self.collaborator_id));
                debug!(document_id = %self.document_id, "sync write complete");
            }
            Err(e) => {
                // No automatic retry: the next local change re-arms the cycle
                self.state.set_error(&e);
            }
        }

        self.state.set_activity(SyncActivity::Idle);
    }
}

enum SchedulerCommand {
    Rearm,
    Flush,
    Shutdown,
}

/// Cancelable debounce task owning the sync deadline
pub struct SyncScheduler {
    tx: mpsc::UnboundedSender<SchedulerCommand>,
    _task: JoinHandle<()>,
}

impl SyncScheduler {
    pub(crate) fn spawn(window: Duration, writer: SyncWriter) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            let mut deadline: Option<Instant> = None;
            loop {
                tokio::select! {
                    cmd = rx.recv() => match cmd {
                        Some(SchedulerCommand::Rearm) => {
                            deadline = Some(Instant::now() + window);
                        }
                        Some(SchedulerCommand::Flush) => {
                            deadline = None;
                            writer.write_now().await;
                        }
                        Some(SchedulerCommand::Shutdown) | None => break,
                    },
                    _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                        if deadline.is_some() =>
                    {
                        deadline = None;
                        writer.write_now().await;
                    }
                }
            }
        });
        Self { tx, _task: task }
    }

    /// (Re)start the quiet-period timer
    pub(crate) fn rearm(&self) {
        let _ = self.tx.send(SchedulerCommand::Rearm);
    }

    /// Write immediately, bypassing the debounce window
    pub(crate) fn flush(&self) {
        let _ = self.tx.send(SchedulerCommand::Flush);
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        // Cancels any pending deadline; an in-flight write still completes
        // inside the task before it observes the shutdown.
        let _ = self.tx.send(SchedulerCommand::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CollaborationError, MemoryStore, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        inner: MemoryStore,
        updates: AtomicUsize,
        fail_updates: std::sync::atomic::AtomicBool,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                updates: AtomicUsize::new(0),
                fail_updates: std::sync::atomic::AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl DocumentStore for CountingStore {
        async fn create_document(
            &self,
            id: &DocumentId,
            snapshot: &SharedDocument,
        ) -> Result<()> {
            self.inner.create_document(id, snapshot).await
        }

        async fn load_document(&self, id: &DocumentId) -> Result<Option<SharedDocument>> {
            self.inner.load_document(id).await
        }

        async fn update_document(
            &self,
            id: &DocumentId,
            snapshot: &SharedDocument,
            origin: &CollaboratorId,
        ) -> Result<()> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(CollaborationError::WriteFailed(
                    "store rejected the update".to_string(),
                ));
            }
            self.inner.update_document(id, snapshot, origin).await
        }

        async fn subscribe(&self, id: &DocumentId) -> Result<crate::Subscription> {
            self.inner.subscribe(id).await
        }

        async fn publish_presence(
            &self,
            id: &DocumentId,
            record: &crate::PresenceRecord,
        ) -> Result<()> {
            self.inner.publish_presence(id, record).await
        }
    }

    async fn shared_writer(store: Arc<CountingStore>) -> (SyncWriter, DocumentId) {
        let collaborator_id = CollaboratorId::new();
        let document_id = DocumentId::generate();
        let document = Arc::new(RwLock::new(ProjectDocument::new()));

        store
            .create_document(
                &document_id,
                &SharedDocument::tagged(document.read().await.clone(), collaborator_id),
            )
            .await
            .unwrap();

        let state = StateController::new(collaborator_id);
        state.enter_shared(
            document_id.clone(),
            format!("http://x/?project={}", document_id),
            true,
        );

        let writer = SyncWriter {
            store,
            document,
            detector: Arc::new(Mutex::new(ChangeDetector::new())),
            state,
            document_id: document_id.clone(),
            collaborator_id,
        };
        (writer, document_id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_resets_the_deadline() {
        let store = Arc::new(CountingStore::new());
        let (writer, _id) = shared_writer(store.clone()).await;
        let scheduler = SyncScheduler::spawn(Duration::from_millis(2000), writer);

        scheduler.rearm();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(store.updates.load(Ordering::SeqCst), 0);

        // Second rearm before the deadline restarts the window
        scheduler.rearm();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(store.updates.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(store.updates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_bypasses_window() {
        let store = Arc::new(CountingStore::new());
        let (writer, _id) = shared_writer(store.clone()).await;
        let scheduler = SyncScheduler::spawn(Duration::from_millis(2000), writer);

        scheduler.rearm();
        scheduler.flush();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(store.updates.load(Ordering::SeqCst), 1);

        // The pending deadline was cleared by the flush
        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(store.updates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_sets_error_without_retry() {
        let store = Arc::new(CountingStore::new());
        let (writer, _id) = shared_writer(store.clone()).await;
        let state = writer.state.clone();
        store
            .fail_updates
            .store(true, std::sync::atomic::Ordering::SeqCst);

        let scheduler = SyncScheduler::spawn(Duration::from_millis(2000), writer);
        scheduler.rearm();
        tokio::time::sleep(Duration::from_millis(2100)).await;

        assert_eq!(store.updates.load(Ordering::SeqCst), 1);
        assert_eq!(state.current().status, SyncStatus::Error);
        assert!(state.current().last_error.is_some());

        // No background retry
        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert_eq!(store.updates.load(Ordering::SeqCst), 1);
    }
}
