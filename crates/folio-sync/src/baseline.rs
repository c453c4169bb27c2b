//! Last known-synchronized snapshot and the dirty comparison against it.

use folio_common::{Document, Revision};

use crate::draft::Draft;

/// The server state the draft was last known to match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Baseline {
    pub title: String,
    pub content: String,
    pub pinned: bool,
    pub revision: Revision,
}

impl Baseline {
    pub fn from_document(doc: &Document) -> Self {
        Self {
            title: doc.title.clone(),
            content: doc.content().to_string(),
            pinned: doc.pinned,
            revision: doc.revision.clone(),
        }
    }

    pub fn to_draft(&self) -> Draft {
        Draft {
            title: self.title.clone(),
            content: self.content.clone(),
            pinned: self.pinned,
        }
    }
}

/// True iff any user-editable field differs. The revision is not compared.
pub fn is_dirty(draft: &Draft, baseline: &Baseline) -> bool {
    draft.title != baseline.title
        || draft.content != baseline.content
        || draft.pinned != baseline.pinned
}

/// Holds the baseline for the open document. Only ever advanced from server
/// documents, never from user input.
#[derive(Debug, Default)]
pub struct BaselineTracker {
    baseline: Option<Baseline>,
}

impl BaselineTracker {
    pub fn set(&mut self, doc: &Document) -> &Baseline {
        self.baseline.insert(Baseline::from_document(doc))
    }

    pub fn get(&self) -> Option<&Baseline> {
        self.baseline.as_ref()
    }

    pub fn revision(&self) -> Option<&Revision> {
        self.baseline.as_ref().map(|b| &b.revision)
    }

    /// Dirty against the tracked baseline. Nothing is dirty before the first
    /// snapshot.
    pub fn is_dirty(&self, draft: &Draft) -> bool {
        self.baseline
            .as_ref()
            .is_some_and(|baseline| is_dirty(draft, baseline))
    }
}
