/// Remote update receiving
/// Consumes the live document subscription, suppresses self-originated
/// echoes, and applies peer snapshots to local state without re-triggering a
/// sync.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    ChangeDetector, CollaborationError, CollaboratorId, DocumentEvent, DocumentId, DocumentStore,
    SharedDocument, StateController, Subscription, SyncActivity,
};
use document::ProjectDocument;

pub(crate) struct ReceiverContext {
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) document: Arc<RwLock<ProjectDocument>>,
    pub(crate) detector: Arc<Mutex<ChangeDetector>>,
    pub(crate) state: StateController,
    pub(crate) document_id: DocumentId,
    pub(crate) collaborator_id: CollaboratorId,
    pub(crate) resubscribe_attempts: u32,
    pub(crate) resubscribe_base_delay: Duration,
}

/// Consumer task for one document subscription
///
/// Exactly one exists per shared session. Teardown is idempotent and always
/// runs when leaving shared mode or when the owning session is dropped.
pub struct RemoteUpdateReceiver {
    task: Option<JoinHandle<()>>,
}

impl RemoteUpdateReceiver {
    pub(crate) fn spawn(subscription: Subscription, ctx: ReceiverContext) -> Self {
        Self {
            task: Some(tokio::spawn(run(subscription, ctx))),
        }
    }

    pub(crate) fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for RemoteUpdateReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(mut subscription: Subscription, ctx: ReceiverContext) {
    loop {
        let event = subscription.next().await;
        match event {
            Some(DocumentEvent::Snapshot(snapshot)) => {
                if snapshot.last_edited_by == ctx.collaborator_id {
                    // Echo of our own write; applying it would be a no-op,
                    // skipping avoids redundant re-renders and timer churn.
                    debug!(document_id = %ctx.document_id, "suppressed own echo");
                    continue;
                }
                apply_remote(&ctx, snapshot).await;
            }
            Some(DocumentEvent::Lost(reason)) => {
                ctx.state
                    .set_error(&CollaborationError::SubscriptionFailed(reason.clone()));
                match resubscribe(&ctx).await {
                    Some(fresh) => subscription = fresh,
                    None => {
                        ctx.state
                            .set_offline(format!("subscription lost: {}", reason));
                        return;
                    }
                }
            }
            None => {
                // Channel closed without an error event; treat as lost.
                match resubscribe(&ctx).await {
                    Some(fresh) => subscription = fresh,
                    None => {
                        ctx.state.set_offline("subscription channel closed");
                        return;
                    }
                }
            }
        }
    }
}

async fn apply_remote(ctx: &ReceiverContext, snapshot: SharedDocument) {
    // The activity flag keeps the change detector from reading this
    // externally-sourced mutation as a new local edit.
    ctx.state.set_activity(SyncActivity::ApplyingRemote);

    {
        let mut doc = ctx.document.write().await;
        *doc = snapshot.document;
        ctx.detector.lock().await.mark_synced(&doc);
    }

    ctx.state
        .mark_remote_applied(snapshot.last_edited_by, snapshot.updated_at);
    ctx.state.set_activity(SyncActivity::Idle);

    info!(
        document_id = %ctx.document_id,
        editor = %snapshot.last_edited_by,
        "applied remote snapshot"
    );
}

/// Bounded exponential-backoff resubscription
async fn resubscribe(ctx: &ReceiverContext) -> Option<Subscription> {
    let mut delay = ctx.resubscribe_base_delay;
    for attempt in 1..=ctx.resubscribe_attempts {
        tokio::time::sleep(delay).await;
        match ctx.store.subscribe(&ctx.document_id).await {
            Ok(subscription) => {
                info!(
                    document_id = %ctx.document_id,
                    attempt,
                    "resubscribed to shared document"
                );
                return Some(subscription);
            }
            Err(e) => {
                warn!(
                    document_id = %ctx.document_id,
                    attempt,
                    error = %e,
                    "resubscription attempt failed"
                );
                delay = delay.saturating_mul(2);
            }
        }
    }
    None
}
