//! Single-flight persistence of drafts.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use folio_common::{
    AttachmentBlock, Block, BlockId, Document, DocumentId, DocumentPatch, DocumentStore,
    StoreError, TextBlock,
};
use smol_str::SmolStr;

use crate::draft::Draft;

type InFlight = Arc<Mutex<HashSet<DocumentId>>>;

/// Writes drafts through a [`DocumentStore`], at most one outstanding write
/// per document id.
pub struct PersistenceGateway<S> {
    store: Arc<S>,
    in_flight: InFlight,
    untitled_title: SmolStr,
}

/// Marks a document as having a write outstanding. Released on drop.
#[derive(Debug)]
pub struct FlightGuard {
    id: DocumentId,
    in_flight: InFlight,
}

impl FlightGuard {
    pub fn document_id(&self) -> &DocumentId {
        &self.id
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.id);
    }
}

impl<S: DocumentStore> PersistenceGateway<S> {
    pub fn new(store: Arc<S>, untitled_title: impl Into<SmolStr>) -> Self {
        Self {
            store,
            in_flight: InFlight::default(),
            untitled_title: untitled_title.into(),
        }
    }

    /// Claim the write slot for `id`, or `None` if a write is already
    /// outstanding.
    pub fn begin(&self, id: &DocumentId) -> Option<FlightGuard> {
        lock(&self.in_flight).insert(id.clone()).then(|| FlightGuard {
            id: id.clone(),
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    pub fn is_in_flight(&self, id: &DocumentId) -> bool {
        lock(&self.in_flight).contains(id)
    }

    /// Serialize a draft into the replace body for the document.
    pub fn patch(&self, draft: &Draft, body: &[Block], attachments: &[AttachmentBlock]) -> DocumentPatch {
        DocumentPatch {
            title: normalize_title(&draft.title, &self.untitled_title),
            body: build_body(&draft.content, body, attachments),
            pinned: draft.pinned,
        }
    }

    /// Perform the write. Holding the guard is what makes it single-flight.
    #[tracing::instrument(skip_all, fields(document = %guard.id))]
    pub async fn write(
        &self,
        guard: &FlightGuard,
        patch: &DocumentPatch,
    ) -> Result<Document, StoreError> {
        let result = self.store.replace(&guard.id, patch).await;
        match &result {
            Ok(doc) => tracing::debug!(revision = %doc.revision, "saved"),
            Err(e) => tracing::warn!(error = %e, "save failed"),
        }
        result
    }
}

/// Blank titles are written as the sentinel; nothing is ever rejected.
pub fn normalize_title(title: &str, untitled: &str) -> String {
    if title.trim().is_empty() {
        untitled.to_string()
    } else {
        title.to_string()
    }
}

/// Build the authoritative body.
///
/// The text block is replaced by one holding `content` under a fresh id, in
/// the same position. Attachment blocks are kept in place if they are still
/// in `attachments`; attachments not yet in `body` follow in their given
/// order. A missing text block is inserted first.
pub fn build_body(content: &str, body: &[Block], attachments: &[AttachmentBlock]) -> Vec<Block> {
    let text = || {
        Block::Text(TextBlock {
            id: BlockId::generate(),
            value: content.to_string(),
        })
    };

    let mut out = Vec::with_capacity(attachments.len() + 1);
    let mut placed = HashSet::new();
    let mut has_text = false;

    for block in body {
        match block {
            Block::Text(_) if !has_text => {
                out.push(text());
                has_text = true;
            }
            Block::Text(_) => {}
            Block::Attachment(existing) => {
                if let Some(current) = attachments
                    .iter()
                    .find(|a| a.reference == existing.reference)
                {
                    if placed.insert(&current.reference) {
                        out.push(Block::Attachment(current.clone()));
                    }
                }
            }
        }
    }

    for attachment in attachments {
        if placed.insert(&attachment.reference) {
            out.push(Block::Attachment(attachment.clone()));
        }
    }

    if !has_text {
        out.insert(0, text());
    }
    out
}

fn lock(set: &Mutex<HashSet<DocumentId>>) -> MutexGuard<'_, HashSet<DocumentId>> {
    set.lock().unwrap_or_else(PoisonError::into_inner)
}
