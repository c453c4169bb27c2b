//! folio-common: document model, store interfaces and client plumbing shared
//! by the sync engine and the command line front end.
//!
//! This crate provides:
//! - the document model (`Document`, `Block`, ids, revision markers)
//! - `DocumentStore` / `AttachmentStore`, the interfaces the engine writes through
//! - `HttpStore` (reqwest) and `MemoryStore` (in-process) implementations
//! - configuration loading and error types

pub mod config;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod memory;
pub mod model;
pub mod store;
#[cfg(feature = "telemetry")]
pub mod telemetry;

pub use config::{Config, SyncSettings};
pub use error::{ConfigError, StoreError};
#[cfg(feature = "http")]
pub use http::HttpStore;
pub use memory::MemoryStore;
pub use model::{
    AttachmentBlock, AttachmentDescriptor, AttachmentId, AttachmentUpload, Block, BlockId,
    Document, DocumentId, DocumentPatch, Revision, TextBlock,
};
pub use store::{AttachmentStore, DocumentStore};
