//! The sync session: one open document, its draft, and the machinery that
//! keeps the two sides in step.
//!
//! ## Flow
//!
//! 1. `open`/`create_document` switch the active document and hydrate draft
//!    and baseline from the first snapshot
//! 2. `edit` changes the draft only, and (re)arms the save timer while dirty
//! 3. the timer or `save_now` writes the draft through the gateway; success
//!    advances the baseline
//! 4. `refresh`/`apply_snapshot` feed server snapshots to the reconciler,
//!    which fast-forwards a clean draft or flags a conflict on a dirty one
//!
//! All state lives behind one mutex that is never held across an await.
//! Responses are tagged with the epoch (bumped on switch, delete and close)
//! and hydration generation (bumped on discard) they were requested under,
//! and are dropped if either moved.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use folio_common::{
    AttachmentBlock, AttachmentStore, AttachmentUpload, Document, DocumentId, DocumentStore,
    Revision, SyncSettings,
};
use tokio::sync::watch;

use crate::attachments::{AttachmentLayer, AttachmentView};
use crate::baseline::BaselineTracker;
use crate::draft::{Draft, DraftStamp, DraftStore, Edit};
use crate::error::SyncError;
use crate::gateway::PersistenceGateway;
use crate::reconcile::{Decision, Ignored, Observation, OwnWrites, decide};
use crate::scheduler::SaveTimer;
use crate::status::{ConflictNotice, Notice, SaveStatus, StatusInputs, status_text};

/// Everything a session needs from its backing store.
pub trait SyncStore: DocumentStore + AttachmentStore + 'static {}

impl<T: DocumentStore + AttachmentStore + 'static> SyncStore for T {}

/// Snapshot of the session as the UI sees it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionView {
    pub document_id: Option<DocumentId>,
    pub status: SaveStatus,
    pub status_text: Option<&'static str>,
    pub dirty: bool,
    pub conflict: Option<ConflictNotice>,
    pub notice: Option<Notice>,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub attachment_error: Option<String>,
    /// Revision of the current baseline.
    pub revision: Option<Revision>,
    pub draft: Draft,
    pub attachments: Vec<AttachmentView>,
}

/// Result of a save attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(Revision),
    Skipped(SkipReason),
    /// The store rejected the write. The draft is kept.
    Failed(String),
    /// The document was switched, deleted or discarded while the write was
    /// outstanding; the response was dropped.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoDocument,
    NotLoaded,
    Clean,
    /// A save is outstanding. Another one is queued for when it resolves.
    InFlight,
    /// Automatic saves never overwrite a flagged conflict.
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Timer,
    Explicit,
}

#[derive(Debug, Default)]
struct SessionState {
    epoch: u64,
    generation: u64,
    document_id: Option<DocumentId>,
    /// Last accepted server copy. `Some` once hydrated.
    document: Option<Document>,
    draft: DraftStore,
    baseline: BaselineTracker,
    attachments: AttachmentLayer,
    own_writes: OwnWrites,
    conflict: Option<ConflictNotice>,
    notice: Option<Notice>,
    last_error: Option<String>,
    attachment_error: Option<String>,
    saved_since_edit: bool,
    last_saved_at: Option<DateTime<Utc>>,
    rearm_after_flight: bool,
    /// Latest snapshot that arrived while a save was outstanding.
    deferred: Option<Document>,
    unversioned_upload: bool,
}

impl SessionState {
    fn is_hydrated(&self) -> bool {
        self.document.is_some()
    }

    fn is_dirty(&self) -> bool {
        self.baseline.is_dirty(self.draft.current())
    }

    /// Reset everything for a new active document.
    fn switch_to(&mut self, id: Option<DocumentId>) {
        *self = SessionState {
            epoch: self.epoch + 1,
            generation: self.generation,
            document_id: id,
            ..Default::default()
        };
    }

    /// Take `doc` as both draft and baseline.
    fn hydrate(&mut self, doc: Document) {
        let baseline = self.baseline.set(&doc);
        self.draft.reset(baseline);
        self.attachments.merge_snapshot(&doc);
        self.document = Some(doc);
        self.conflict = None;
        self.last_error = None;
        self.notice = None;
        self.saved_since_edit = false;
        self.rearm_after_flight = false;
        self.deferred = None;
        self.unversioned_upload = false;
    }

    /// The held-back snapshot, unless it is our own write or the baseline
    /// the save started from.
    fn take_deferred_remote(&mut self) -> Option<Document> {
        let doc = self.deferred.take()?;
        let ours = self.own_writes.contains(&doc.revision)
            || self.baseline.revision() == Some(&doc.revision);
        (!ours).then_some(doc)
    }

    fn apply_saved(&mut self, doc: Document, since: DraftStamp) {
        let baseline = self.baseline.set(&doc);
        self.draft.adopt_unchanged(since, baseline);
        self.attachments.merge_snapshot(&doc);
        self.own_writes.record(doc.revision.clone());
        self.document = Some(doc);
        self.conflict = None;
        self.last_error = None;
        self.notice = None;
        self.saved_since_edit = true;
        self.last_saved_at = Some(Utc::now());
        self.unversioned_upload = false;
    }

    fn view(&self, in_flight: bool) -> SessionView {
        let dirty = self.is_dirty();
        let status = StatusInputs {
            loaded: self.is_hydrated(),
            dirty,
            in_flight,
            failed: self.last_error.is_some(),
            conflict: self.conflict.is_some(),
            saved_since_edit: self.saved_since_edit,
        }
        .derive();

        SessionView {
            document_id: self.document_id.clone(),
            status,
            status_text: status_text(status, self.notice),
            dirty,
            conflict: self.conflict.clone(),
            notice: self.notice,
            last_saved_at: self.last_saved_at,
            last_error: self.last_error.clone(),
            attachment_error: self.attachment_error.clone(),
            revision: self.baseline.revision().cloned(),
            draft: self.draft.current().clone(),
            attachments: self.attachments.views(),
        }
    }
}

struct Inner<S> {
    store: Arc<S>,
    gateway: PersistenceGateway<S>,
    timer: SaveTimer,
    state: Mutex<SessionState>,
    view: watch::Sender<SessionView>,
}

/// Handle to a sync session. Clones share the session.
pub struct SyncSession<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for SyncSession<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Non-owning session handle for background tasks.
pub(crate) struct WeakSession<S>(Weak<Inner<S>>);

impl<S> WeakSession<S> {
    pub(crate) fn upgrade(&self) -> Option<SyncSession<S>> {
        self.0.upgrade().map(|inner| SyncSession { inner })
    }
}

impl<S: SyncStore> SyncSession<S> {
    pub fn new(store: S, settings: SyncSettings) -> Self {
        Self::with_shared_store(Arc::new(store), settings)
    }

    pub fn with_shared_store(store: Arc<S>, settings: SyncSettings) -> Self {
        let gateway = PersistenceGateway::new(Arc::clone(&store), settings.untitled_title.clone());
        let (view, _) = watch::channel(SessionView::default());
        Self {
            inner: Arc::new(Inner {
                store,
                gateway,
                timer: SaveTimer::new(settings.quiet_period),
                state: Mutex::new(SessionState::default()),
                view,
            }),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.inner.store
    }

    pub fn view(&self) -> SessionView {
        let state = self.lock();
        state.view(self.in_flight(&state))
    }

    /// Receiver that sees every published view.
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.inner.view.subscribe()
    }

    pub fn document_id(&self) -> Option<DocumentId> {
        self.lock().document_id.clone()
    }

    pub fn status(&self) -> SaveStatus {
        self.view().status
    }

    pub fn is_dirty(&self) -> bool {
        self.lock().is_dirty()
    }

    /// Make `id` the active document and load it.
    ///
    /// Draft and baseline are reset before the fetch starts, so nothing from
    /// the previous document survives the switch.
    pub async fn open(&self, id: impl Into<DocumentId>) -> Result<SessionView, SyncError> {
        let id = id.into();
        let epoch = {
            let mut state = self.lock();
            self.switch(&mut state, Some(id.clone()));
            state.epoch
        };

        let doc = self.inner.store.fetch(&id).await?;

        let mut state = self.lock();
        if state.epoch != epoch {
            tracing::debug!(document = %id, "document switched while loading");
            return Err(SyncError::Stale);
        }
        self.reconcile(&mut state, doc);
        Ok(state.view(self.in_flight(&state)))
    }

    /// Create a document server-side and make it the active one.
    pub async fn create_document(&self) -> Result<SessionView, SyncError> {
        let doc = self.inner.store.create().await?;
        tracing::info!(document = %doc.id, "created document");

        let mut state = self.lock();
        self.switch(&mut state, Some(doc.id.clone()));
        self.reconcile(&mut state, doc);
        Ok(state.view(self.in_flight(&state)))
    }

    /// Apply a user edit to the draft. Returns whether the draft changed.
    ///
    /// Edits before the document has loaded are ignored.
    pub fn edit(&self, edit: Edit) -> bool {
        let field = edit.field();
        let mut state = self.lock();
        if !state.is_hydrated() {
            tracing::debug!(field, "edit before load ignored");
            return false;
        }
        if !state.draft.apply(edit) {
            return false;
        }

        state.notice = None;
        state.last_error = None;
        state.saved_since_edit = false;
        if state.is_dirty() {
            self.queue_save();
        } else {
            self.inner.timer.cancel();
        }
        self.publish(&state);
        true
    }

    /// Save immediately, cancelling any pending timer.
    ///
    /// Unlike the timer, this overwrites a flagged conflict.
    pub async fn save_now(&self) -> SaveOutcome {
        self.inner.timer.cancel();
        self.save(Trigger::Explicit).await
    }

    /// Fetch the open document and reconcile it.
    pub async fn refresh(&self) -> Result<Decision, SyncError> {
        let (id, epoch, generation) = {
            let state = self.lock();
            let id = state.document_id.clone().ok_or(SyncError::NoDocument)?;
            (id, state.epoch, state.generation)
        };

        let doc = self.inner.store.fetch(&id).await?;

        let mut state = self.lock();
        if state.epoch != epoch || state.generation != generation {
            return Err(SyncError::Stale);
        }
        Ok(self.reconcile(&mut state, doc))
    }

    /// Reconcile a snapshot delivered from outside (push channel, another
    /// fetch path).
    pub fn apply_snapshot(&self, doc: Document) -> Decision {
        let mut state = self.lock();
        self.reconcile(&mut state, doc)
    }

    /// Throw the draft away and reload from the server. Clears any conflict.
    pub async fn discard_and_reload(&self) -> Result<SessionView, SyncError> {
        let (id, epoch, generation) = {
            let mut state = self.lock();
            let id = state.document_id.clone().ok_or(SyncError::NoDocument)?;
            self.inner.timer.cancel();
            state.generation += 1;
            state.rearm_after_flight = false;
            (id, state.epoch, state.generation)
        };

        let doc = self.inner.store.fetch(&id).await?;

        let mut state = self.lock();
        if state.epoch != epoch || state.generation != generation {
            return Err(SyncError::Stale);
        }
        tracing::info!(document = %id, revision = %doc.revision, "discarded local changes");
        state.hydrate(doc);
        self.publish(&state);
        Ok(state.view(self.in_flight(&state)))
    }

    /// Upload a file and attach it to the open document.
    ///
    /// A placeholder is visible in the view while the upload runs. On failure
    /// it is removed and the error is reported separately from save status.
    pub async fn upload_attachment(
        &self,
        upload: AttachmentUpload,
    ) -> Result<AttachmentBlock, SyncError> {
        let (id, epoch, placeholder) = {
            let mut state = self.lock();
            let id = state.document_id.clone().ok_or(SyncError::NoDocument)?;
            if !state.is_hydrated() {
                return Err(SyncError::NotLoaded { id });
            }
            let placeholder = state.attachments.insert_placeholder(&upload);
            state.attachment_error = None;
            self.publish(&state);
            (id, state.epoch, placeholder)
        };

        let result = self.inner.store.upload(&id, &upload).await;

        let mut state = self.lock();
        if state.epoch != epoch {
            return Err(SyncError::Stale);
        }
        match result {
            Ok(descriptor) => {
                tracing::info!(document = %id, attachment = %descriptor.id, "attachment uploaded");
                match &descriptor.revision {
                    Some(revision) => state.own_writes.record(revision.clone()),
                    None => state.unversioned_upload = true,
                }
                let block = state
                    .attachments
                    .confirm(&placeholder, &descriptor)
                    .unwrap_or_else(|| descriptor.to_block(placeholder));
                self.publish(&state);
                Ok(block)
            }
            Err(source) => {
                tracing::warn!(document = %id, filename = %upload.filename, error = %source, "attachment upload failed");
                state.attachments.remove(&placeholder);
                state.attachment_error = Some(format!("{}: {source}", upload.filename));
                self.publish(&state);
                Err(SyncError::AttachmentUpload {
                    filename: upload.filename,
                    source,
                })
            }
        }
    }

    /// Delete the open document server-side and close it.
    ///
    /// Any pending save is cancelled and any outstanding one abandoned.
    pub async fn delete_document(&self) -> Result<(), SyncError> {
        let (id, epoch, parked) = {
            let mut state = self.lock();
            let id = state.document_id.clone().ok_or(SyncError::NoDocument)?;
            self.inner.timer.cancel();
            state.epoch += 1;
            state.rearm_after_flight = false;
            let parked = state.document.take();
            self.publish(&state);
            (id, state.epoch, parked)
        };

        let result = self.inner.store.delete(&id).await;

        let mut state = self.lock();
        if state.epoch != epoch {
            return result.map_err(SyncError::from);
        }
        match result {
            Ok(()) => {
                tracing::info!(document = %id, "deleted document");
                self.switch(&mut state, None);
                Ok(())
            }
            Err(e) => {
                state.document = parked;
                self.publish(&state);
                Err(e.into())
            }
        }
    }

    /// Close the open document. Pending saves are cancelled and outstanding
    /// responses dropped.
    pub fn close(&self) {
        let mut state = self.lock();
        self.switch(&mut state, None);
    }

    pub(crate) fn downgrade(&self) -> WeakSession<S> {
        WeakSession(Arc::downgrade(&self.inner))
    }

    async fn save(&self, trigger: Trigger) -> SaveOutcome {
        let (guard, patch, epoch, generation, stamp) = {
            let mut state = self.lock();
            let Some(id) = state.document_id.clone() else {
                return SaveOutcome::Skipped(SkipReason::NoDocument);
            };
            if !state.is_hydrated() {
                return SaveOutcome::Skipped(SkipReason::NotLoaded);
            }
            if trigger == Trigger::Timer && state.conflict.is_some() {
                tracing::debug!(document = %id, "automatic save held back by conflict");
                return SaveOutcome::Skipped(SkipReason::Conflict);
            }
            if !state.is_dirty() {
                return SaveOutcome::Skipped(SkipReason::Clean);
            }
            let Some(guard) = self.inner.gateway.begin(&id) else {
                tracing::debug!(document = %id, "save in flight, queued another");
                state.rearm_after_flight = true;
                return SaveOutcome::Skipped(SkipReason::InFlight);
            };

            let body = state
                .document
                .as_ref()
                .map(|doc| doc.body.as_slice())
                .unwrap_or_default();
            let patch = self.inner.gateway.patch(
                state.draft.current(),
                body,
                &state.attachments.confirmed(),
            );
            self.publish(&state);
            (guard, patch, state.epoch, state.generation, state.draft.stamp())
        };

        let result = self.inner.gateway.write(&guard, &patch).await;

        let mut state = self.lock();
        if state.epoch != epoch {
            tracing::debug!(document = %guard.document_id(), "dropping save response for closed document");
            drop(guard);
            // The reopened document may have queued behind this write.
            if let Some(doc) = state.deferred.take() {
                self.reconcile(&mut state, doc);
            }
            self.finish_flight(&mut state, true);
            return SaveOutcome::Stale;
        }

        let outcome = if state.generation != generation {
            state.deferred = None;
            SaveOutcome::Stale
        } else {
            match result {
                Ok(doc) => {
                    let revision = doc.revision.clone();
                    let overwritten = state
                        .take_deferred_remote()
                        .filter(|remote| remote.revision != revision);
                    state.apply_saved(doc, stamp);
                    if let Some(remote) = overwritten {
                        tracing::warn!(
                            document = %remote.id,
                            remote = %remote.revision,
                            saved = %revision,
                            "save overwrote a concurrent remote change"
                        );
                        state.conflict = Some(ConflictNotice {
                            remote_revision: remote.revision,
                        });
                    }
                    SaveOutcome::Saved(revision)
                }
                Err(e) => {
                    state.last_error = Some(e.to_string());
                    SaveOutcome::Failed(e.to_string())
                }
            }
        };
        drop(guard);

        let failed = matches!(outcome, SaveOutcome::Failed(_));
        if failed && let Some(doc) = state.deferred.take() {
            self.reconcile(&mut state, doc);
        }
        self.finish_flight(&mut state, !failed);
        outcome
    }

    /// Re-arm a save that was requested while the write was outstanding.
    fn finish_flight(&self, state: &mut SessionState, rearm_allowed: bool) {
        let rearm = std::mem::take(&mut state.rearm_after_flight);
        if rearm && rearm_allowed && state.is_dirty() {
            self.queue_save();
        }
        self.publish(state);
    }

    fn queue_save(&self) {
        let session = self.downgrade();
        self.inner.timer.arm(move || async move {
            if let Some(session) = session.upgrade() {
                session.save(Trigger::Timer).await;
            }
        });
    }

    fn reconcile(&self, state: &mut SessionState, doc: Document) -> Decision {
        let save_in_flight = self.in_flight(state);
        let dirty = state.is_dirty();
        let decision = decide(
            &Observation {
                open: state.document_id.as_ref(),
                hydrated: state.is_hydrated(),
                save_in_flight,
                dirty,
                baseline: state.baseline.get(),
                own_writes: &state.own_writes,
                unversioned_upload: state.unversioned_upload,
            },
            &doc,
        );

        tracing::debug!(
            document = %doc.id,
            revision = %doc.revision,
            epoch = state.epoch,
            decision = decision.as_str(),
            "snapshot observed"
        );

        match decision {
            Decision::Hydrate => state.hydrate(doc),
            Decision::FastForward => {
                state.hydrate(doc);
                state.notice = Some(Notice::Synced);
            }
            Decision::Rebase => {
                state.baseline.set(&doc);
                state.attachments.merge_snapshot(&doc);
                state.document = Some(doc);
                state.unversioned_upload = false;
            }
            Decision::Conflict => {
                tracing::info!(document = %doc.id, revision = %doc.revision, "remote change conflicts with local edits");
                state.attachments.merge_snapshot(&doc);
                state.conflict = Some(ConflictNotice {
                    remote_revision: doc.revision,
                });
            }
            Decision::Ignored(Ignored::SaveInFlight) => state.deferred = Some(doc),
            Decision::Ignored(_) => {}
        }

        if decision.accepted() {
            self.publish(state);
        }
        decision
    }

    fn switch(&self, state: &mut SessionState, id: Option<DocumentId>) {
        self.inner.timer.cancel();
        state.switch_to(id);
        tracing::debug!(document = ?state.document_id, epoch = state.epoch, "active document switched");
        self.publish(state);
    }

    fn in_flight(&self, state: &SessionState) -> bool {
        state
            .document_id
            .as_ref()
            .is_some_and(|id| self.inner.gateway.is_in_flight(id))
    }

    fn publish(&self, state: &SessionState) {
        self.inner.view.send_replace(state.view(self.in_flight(state)));
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
