//! Deciding what to do with an observed server snapshot.

use std::collections::VecDeque;

use folio_common::{Document, DocumentId, Revision};

use crate::baseline::{Baseline, is_dirty};

/// How many of our own write revisions are remembered for echo detection.
const OWN_WRITES_CAPACITY: usize = 8;

/// Revisions produced by this session's own writes (saves, and uploads that
/// report a revision).
#[derive(Debug, Default, Clone)]
pub struct OwnWrites {
    revisions: VecDeque<Revision>,
}

impl OwnWrites {
    pub fn record(&mut self, revision: Revision) {
        if self.revisions.contains(&revision) {
            return;
        }
        if self.revisions.len() == OWN_WRITES_CAPACITY {
            self.revisions.pop_front();
        }
        self.revisions.push_back(revision);
    }

    pub fn contains(&self, revision: &Revision) -> bool {
        self.revisions.contains(revision)
    }
}

/// Session state a snapshot is judged against.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub open: Option<&'a DocumentId>,
    pub hydrated: bool,
    pub save_in_flight: bool,
    pub dirty: bool,
    pub baseline: Option<&'a Baseline>,
    pub own_writes: &'a OwnWrites,
    /// One of our uploads landed without the store reporting the revision it
    /// produced.
    pub unversioned_upload: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// First snapshot for the open document: populate draft and baseline.
    Hydrate,
    /// Draft is clean: adopt the snapshot.
    FastForward,
    /// Draft is dirty and the server moved only by our own upload: advance
    /// the baseline revision, keep the draft.
    Rebase,
    /// Draft is dirty and the server moved: flag it, touch nothing.
    Conflict,
    Ignored(Ignored),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ignored {
    /// Snapshot for a document that is not open.
    OtherDocument,
    /// A save is outstanding; the snapshot is judged when it resolves.
    SaveInFlight,
    /// The snapshot is the result of one of our own writes.
    Echo,
    /// Same revision as the baseline.
    Unchanged,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Hydrate => "hydrate",
            Decision::FastForward => "fast-forward",
            Decision::Rebase => "rebase",
            Decision::Conflict => "conflict",
            Decision::Ignored(Ignored::OtherDocument) => "other-document",
            Decision::Ignored(Ignored::SaveInFlight) => "deferred",
            Decision::Ignored(Ignored::Echo) => "echo",
            Decision::Ignored(Ignored::Unchanged) => "unchanged",
        }
    }

    /// Whether the snapshot was taken into the session.
    pub fn accepted(&self) -> bool {
        !matches!(self, Decision::Ignored(_))
    }
}

pub fn decide(observation: &Observation<'_>, snapshot: &Document) -> Decision {
    if observation.open != Some(&snapshot.id) {
        return Decision::Ignored(Ignored::OtherDocument);
    }
    if !observation.hydrated {
        return Decision::Hydrate;
    }
    if observation.save_in_flight {
        return Decision::Ignored(Ignored::SaveInFlight);
    }
    if observation.own_writes.contains(&snapshot.revision) {
        return Decision::Ignored(Ignored::Echo);
    }
    let Some(baseline) = observation.baseline else {
        return Decision::Hydrate;
    };
    if baseline.revision == snapshot.revision {
        return Decision::Ignored(Ignored::Unchanged);
    }
    if !observation.dirty {
        return Decision::FastForward;
    }
    let remote = Baseline::from_document(snapshot).to_draft();
    if observation.unversioned_upload && !is_dirty(&remote, baseline) {
        return Decision::Rebase;
    }
    Decision::Conflict
}
