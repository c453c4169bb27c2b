use folio_common::{DocumentId, StoreError};
use miette::Diagnostic;
use thiserror::Error;

/// Errors returned by [`SyncSession`](crate::SyncSession) operations.
///
/// Failed saves are not errors here; they surface through
/// [`SaveOutcome`](crate::SaveOutcome) and the session status.
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum SyncError {
    #[error("no document is open")]
    #[diagnostic(code(sync::no_document), help("open or create a document first"))]
    NoDocument,

    #[error("document {id} has not finished loading")]
    #[diagnostic(code(sync::not_loaded))]
    NotLoaded { id: DocumentId },

    /// The open document changed while the request was outstanding, so the
    /// response was discarded.
    #[error("response arrived for a document that is no longer open")]
    #[diagnostic(code(sync::stale))]
    Stale,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error("failed to upload attachment {filename}")]
    #[diagnostic(code(sync::attachment_upload))]
    AttachmentUpload {
        filename: String,
        #[source]
        source: StoreError,
    },
}
