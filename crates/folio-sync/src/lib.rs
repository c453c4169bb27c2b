//! Document synchronization engine.
//!
//! Reconciles a user's in-progress edits to a document against a
//! periodically refetched server copy, coalescing rapid edits into debounced
//! saves and never silently discarding either side's work.
//!
//! This crate provides:
//! - `SyncSession`: the stateful session object composing everything below
//! - `DraftStore` / `BaselineTracker`: the two sides of the dirty comparison
//! - `SaveTimer`: owned, cancellable debounce timer
//! - `PersistenceGateway`: single-flight writes per document
//! - `decide`: the remote-snapshot reconciliation rule
//! - `AttachmentLayer`: optimistic attachment uploads
//! - `ChangePoller`: interval and focus-driven refetch

mod attachments;
mod baseline;
mod draft;
mod error;
mod gateway;
mod poller;
mod reconcile;
mod scheduler;
mod session;
mod status;

pub use attachments::{AttachmentLayer, AttachmentView};
pub use baseline::{Baseline, BaselineTracker, is_dirty};
pub use draft::{Draft, DraftStamp, DraftStore, Edit};
pub use error::SyncError;
pub use gateway::{FlightGuard, PersistenceGateway, build_body, normalize_title};
pub use poller::ChangePoller;
pub use reconcile::{Decision, Ignored, Observation, OwnWrites, decide};
pub use scheduler::SaveTimer;
pub use session::{SaveOutcome, SessionView, SkipReason, SyncSession, SyncStore};
pub use status::{CONFLICT_MESSAGE, ConflictNotice, Notice, SaveStatus, StatusInputs, status_text};
