//! In-process document and attachment store.
//!
//! Clones share state, so two sessions built on clones of one `MemoryStore`
//! see each other's writes the way two browser tabs see one server. Revisions
//! come from a monotonic counter (`r1`, `r2`, ...).
//!
//! Used for offline runs and by the test suites, which also rely on the fault
//! injection, latency and call-recording hooks.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;

use crate::error::StoreError;
use crate::model::{
    AttachmentDescriptor, AttachmentId, AttachmentUpload, Block, BlockId, Document, DocumentId,
    DocumentPatch, Revision,
};
use crate::store::{AttachmentStore, DocumentStore};

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    documents: HashMap<DocumentId, Document>,
    revision_counter: u64,
    id_counter: u64,
    write_latency: Duration,
    upload_latency: Duration,
    failing_saves: VecDeque<String>,
    failing_uploads: VecDeque<String>,
    omit_upload_revisions: bool,
    replaces: Vec<(DocumentId, DocumentPatch)>,
    fetches: usize,
    uploads: usize,
    writes_in_flight: HashMap<DocumentId, usize>,
    max_writes_in_flight: usize,
}

impl MemoryState {
    fn next_revision(&mut self) -> Revision {
        self.revision_counter += 1;
        Revision::new(format!("r{}", self.revision_counter))
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a document directly, bypassing the call counters.
    pub fn seed(&self, title: &str, content: &str) -> Document {
        let mut state = self.state();
        state.id_counter += 1;
        let id = DocumentId::new(format!("doc-{}", state.id_counter));
        let revision = state.next_revision();
        let mut doc = Document::scaffold(id.clone(), revision, Utc::now());
        doc.title = title.to_string();
        if let Some(Block::Text(text)) = doc.body.first_mut() {
            text.value = content.to_string();
        }
        state.documents.insert(id, doc.clone());
        doc
    }

    /// Current server copy, if any.
    pub fn get(&self, id: &DocumentId) -> Option<Document> {
        self.state().documents.get(id).cloned()
    }

    /// Change a document out-of-band, as another session or a background job
    /// would. Bumps the revision.
    pub fn edit_remote(
        &self,
        id: &DocumentId,
        edit: impl FnOnce(&mut Document),
    ) -> Option<Document> {
        let mut state = self.state();
        let revision = state.next_revision();
        let doc = state.documents.get_mut(id)?;
        edit(doc);
        doc.revision = revision;
        doc.updated_at = Utc::now();
        Some(doc.clone())
    }

    /// Delay applied to every replace call.
    pub fn set_write_latency(&self, latency: Duration) {
        self.state().write_latency = latency;
    }

    /// Delay applied to every upload call.
    pub fn set_upload_latency(&self, latency: Duration) {
        self.state().upload_latency = latency;
    }

    /// Make the next replace call fail with the given message.
    pub fn fail_next_save(&self, message: impl Into<String>) {
        self.state().failing_saves.push_back(message.into());
    }

    /// Make the next upload call fail with the given message.
    pub fn fail_next_upload(&self, message: impl Into<String>) {
        self.state().failing_uploads.push_back(message.into());
    }

    /// Stop reporting the revision an upload produced, as servers that only
    /// return `{id, url}` do.
    pub fn omit_upload_revisions(&self) {
        self.state().omit_upload_revisions = true;
    }

    /// Every replace call received so far, in arrival order.
    pub fn replaces(&self) -> Vec<(DocumentId, DocumentPatch)> {
        self.state().replaces.clone()
    }

    pub fn replace_count(&self, id: &DocumentId) -> usize {
        self.state().replaces.iter().filter(|(doc, _)| doc == id).count()
    }

    pub fn fetch_count(&self) -> usize {
        self.state().fetches
    }

    pub fn upload_count(&self) -> usize {
        self.state().uploads
    }

    /// Highest number of concurrent replace calls observed for one document.
    pub fn max_writes_in_flight(&self) -> usize {
        self.state().max_writes_in_flight
    }

    fn begin_write(&self, id: &DocumentId, patch: &DocumentPatch) -> Duration {
        let mut state = self.state();
        state.replaces.push((id.clone(), patch.clone()));
        let in_flight = state.writes_in_flight.entry(id.clone()).or_default();
        *in_flight += 1;
        let current = *in_flight;
        state.max_writes_in_flight = state.max_writes_in_flight.max(current);
        state.write_latency
    }

    fn finish_write(&self, id: &DocumentId, patch: &DocumentPatch) -> Result<Document, StoreError> {
        let mut state = self.state();
        if let Some(in_flight) = state.writes_in_flight.get_mut(id) {
            *in_flight = in_flight.saturating_sub(1);
        }
        if let Some(message) = state.failing_saves.pop_front() {
            return Err(StoreError::Unavailable(message));
        }
        if !state.documents.contains_key(id) {
            return Err(StoreError::NotFound { id: id.clone() });
        }
        let revision = state.next_revision();
        let doc = state
            .documents
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound { id: id.clone() })?;
        doc.title = patch.title.clone();
        doc.body = patch.body.clone();
        doc.pinned = patch.pinned;
        doc.revision = revision;
        doc.updated_at = Utc::now();
        Ok(doc.clone())
    }

    fn finish_upload(
        &self,
        document_id: &DocumentId,
        upload: &AttachmentUpload,
    ) -> Result<AttachmentDescriptor, StoreError> {
        let mut state = self.state();
        if let Some(message) = state.failing_uploads.pop_front() {
            return Err(StoreError::Unavailable(message));
        }
        if !state.documents.contains_key(document_id) {
            return Err(StoreError::NotFound {
                id: document_id.clone(),
            });
        }
        state.id_counter += 1;
        let attachment_id = AttachmentId::new(format!("att-{}", state.id_counter));
        let revision = state.next_revision();
        let descriptor = AttachmentDescriptor {
            url: format!("memory://attachments/{attachment_id}"),
            id: attachment_id,
            filename: upload.filename.clone(),
            content_type: upload.content_type.clone(),
            revision: (!state.omit_upload_revisions).then(|| revision.clone()),
        };
        let doc = state
            .documents
            .get_mut(document_id)
            .ok_or_else(|| StoreError::NotFound {
                id: document_id.clone(),
            })?;
        doc.body
            .push(Block::Attachment(descriptor.to_block(BlockId::generate())));
        doc.revision = revision;
        doc.updated_at = Utc::now();
        Ok(descriptor)
    }
}

impl DocumentStore for MemoryStore {
    async fn fetch(&self, id: &DocumentId) -> Result<Document, StoreError> {
        let mut state = self.state();
        state.fetches += 1;
        state
            .documents
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.clone() })
    }

    async fn replace(&self, id: &DocumentId, patch: &DocumentPatch) -> Result<Document, StoreError> {
        let latency = self.begin_write(id, patch);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.finish_write(id, patch)
    }

    async fn delete(&self, id: &DocumentId) -> Result<(), StoreError> {
        self.state()
            .documents
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound { id: id.clone() })
    }

    async fn create(&self) -> Result<Document, StoreError> {
        Ok(self.seed("", ""))
    }
}

impl AttachmentStore for MemoryStore {
    async fn upload(
        &self,
        document_id: &DocumentId,
        upload: &AttachmentUpload,
    ) -> Result<AttachmentDescriptor, StoreError> {
        let latency = {
            let mut state = self.state();
            state.uploads += 1;
            state.upload_latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.finish_upload(document_id, upload)
    }
}
