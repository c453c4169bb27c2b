//! External interfaces the sync engine writes through.
//!
//! The engine never owns documents. It reads and replaces them through a
//! [`DocumentStore`] and uploads binary files through an [`AttachmentStore`].
//! Change notification is plain polling of [`DocumentStore::fetch`].

use std::future::Future;

use crate::error::StoreError;
use crate::model::{AttachmentDescriptor, AttachmentUpload, Document, DocumentId, DocumentPatch};

/// Versioned document storage.
pub trait DocumentStore: Send + Sync {
    /// `GET document(id)`
    fn fetch(&self, id: &DocumentId) -> impl Future<Output = Result<Document, StoreError>> + Send;

    /// `PUT document(id, {title, body, pinned})`
    ///
    /// Returns the authoritative post-write document, including a fresh
    /// revision marker.
    fn replace(
        &self,
        id: &DocumentId,
        patch: &DocumentPatch,
    ) -> impl Future<Output = Result<Document, StoreError>> + Send;

    /// `DELETE document(id)`
    fn delete(&self, id: &DocumentId) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// `POST document`, creating an empty scaffold with server defaults.
    fn create(&self) -> impl Future<Output = Result<Document, StoreError>> + Send;
}

/// Binary attachment storage.
pub trait AttachmentStore: Send + Sync {
    /// `POST attachment(documentId, file)`
    fn upload(
        &self,
        document_id: &DocumentId,
        upload: &AttachmentUpload,
    ) -> impl Future<Output = Result<AttachmentDescriptor, StoreError>> + Send;
}
