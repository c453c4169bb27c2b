//! The user's in-progress edit state.

use folio_common::Document;

use crate::baseline::Baseline;

/// The three user-editable fields of a document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Draft {
    pub title: String,
    pub content: String,
    pub pinned: bool,
}

impl Draft {
    pub fn from_document(doc: &Document) -> Self {
        Self {
            title: doc.title.clone(),
            content: doc.content().to_string(),
            pinned: doc.pinned,
        }
    }
}

/// A single user edit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Edit {
    Title(String),
    Content(String),
    Pinned(bool),
}

impl Edit {
    pub fn title(value: impl Into<String>) -> Self {
        Self::Title(value.into())
    }

    pub fn content(value: impl Into<String>) -> Self {
        Self::Content(value.into())
    }

    pub fn field(&self) -> &'static str {
        match self {
            Edit::Title(_) => "title",
            Edit::Content(_) => "content",
            Edit::Pinned(_) => "pinned",
        }
    }
}

/// Per-field edit counters.
///
/// Taken when a save starts; on completion, fields whose counter has not
/// moved were not touched while the write was outstanding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DraftStamp {
    title: u64,
    content: u64,
    pinned: u64,
}

/// Holds the current draft. Setters are total and report whether the value
/// changed; no validation happens here.
#[derive(Debug, Default)]
pub struct DraftStore {
    draft: Draft,
    stamp: DraftStamp,
}

impl DraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &Draft {
        &self.draft
    }

    pub fn stamp(&self) -> DraftStamp {
        self.stamp
    }

    pub fn set_title(&mut self, value: impl Into<String>) -> bool {
        let value = value.into();
        if self.draft.title == value {
            return false;
        }
        self.draft.title = value;
        self.stamp.title += 1;
        true
    }

    pub fn set_content(&mut self, value: impl Into<String>) -> bool {
        let value = value.into();
        if self.draft.content == value {
            return false;
        }
        self.draft.content = value;
        self.stamp.content += 1;
        true
    }

    pub fn set_pinned(&mut self, value: bool) -> bool {
        if self.draft.pinned == value {
            return false;
        }
        self.draft.pinned = value;
        self.stamp.pinned += 1;
        true
    }

    pub fn apply(&mut self, edit: Edit) -> bool {
        match edit {
            Edit::Title(value) => self.set_title(value),
            Edit::Content(value) => self.set_content(value),
            Edit::Pinned(value) => self.set_pinned(value),
        }
    }

    /// Replace the whole draft with the baseline's fields.
    pub fn reset(&mut self, baseline: &Baseline) {
        self.draft = baseline.to_draft();
        self.stamp = DraftStamp::default();
    }

    /// Adopt the baseline value for every field not edited since `since`.
    pub fn adopt_unchanged(&mut self, since: DraftStamp, baseline: &Baseline) {
        if self.stamp.title == since.title {
            self.draft.title = baseline.title.clone();
        }
        if self.stamp.content == since.content {
            self.draft.content = baseline.content.clone();
        }
        if self.stamp.pinned == since.pinned {
            self.draft.pinned = baseline.pinned;
        }
    }
}
