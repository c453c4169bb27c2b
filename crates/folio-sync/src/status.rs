//! Observable save status.
//!
//! The status is never stored. It is derived on demand from the session's
//! flags, so it cannot drift from the state it describes.

use std::fmt;

use folio_common::Revision;

pub const CONFLICT_MESSAGE: &str =
    "This document changed elsewhere; save to overwrite or discard to reload";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SaveStatus {
    /// Nothing loaded, or loaded and in sync.
    #[default]
    Idle,
    /// Local edits not yet persisted.
    Dirty,
    /// A save is outstanding.
    Saving,
    /// The last save succeeded and nothing was edited since.
    Saved,
    /// The last save failed. The draft is kept and can be saved again.
    Error,
    /// The server copy changed while the draft was dirty.
    Conflict,
}

impl SaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveStatus::Idle => "idle",
            SaveStatus::Dirty => "dirty",
            SaveStatus::Saving => "saving",
            SaveStatus::Saved => "saved",
            SaveStatus::Error => "error",
            SaveStatus::Conflict => "conflict",
        }
    }

    /// User-facing label, if the status has one.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            SaveStatus::Idle => None,
            SaveStatus::Dirty => Some("Unsaved changes"),
            SaveStatus::Saving => Some("Saving…"),
            SaveStatus::Saved => Some("Saved"),
            SaveStatus::Error => Some("Save failed"),
            SaveStatus::Conflict => Some(CONFLICT_MESSAGE),
        }
    }
}

impl fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs the status is derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusInputs {
    pub loaded: bool,
    pub dirty: bool,
    pub in_flight: bool,
    pub failed: bool,
    pub conflict: bool,
    pub saved_since_edit: bool,
}

impl StatusInputs {
    pub fn derive(&self) -> SaveStatus {
        if !self.loaded {
            SaveStatus::Idle
        } else if self.in_flight {
            SaveStatus::Saving
        } else if self.conflict {
            SaveStatus::Conflict
        } else if self.failed {
            SaveStatus::Error
        } else if self.dirty {
            SaveStatus::Dirty
        } else if self.saved_since_edit {
            SaveStatus::Saved
        } else {
            SaveStatus::Idle
        }
    }
}

/// Neutral, informational notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// A remote change was adopted without conflict.
    Synced,
}

impl Notice {
    pub fn text(&self) -> &'static str {
        match self {
            Notice::Synced => "Synced latest updates",
        }
    }
}

/// Raised when a remote change arrives while the draft is dirty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictNotice {
    /// Revision of the remote snapshot that conflicted.
    pub remote_revision: Revision,
}

impl ConflictNotice {
    pub fn message(&self) -> &'static str {
        CONFLICT_MESSAGE
    }
}

/// Text shown next to the document: the status label, or the neutral notice
/// when the status has none.
pub fn status_text(status: SaveStatus, notice: Option<Notice>) -> Option<&'static str> {
    status.label().or_else(|| notice.map(|n| n.text()))
}
