use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::model::DocumentId;

/// Errors from the document and attachment stores.
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum StoreError {
    #[error("document {id} not found")]
    #[diagnostic(code(store::not_found))]
    NotFound { id: DocumentId },

    #[error("server responded {status}: {message}")]
    #[diagnostic(code(store::http))]
    Http { status: u16, message: String },

    #[cfg(feature = "http")]
    #[error("request failed: {0}")]
    #[diagnostic(code(store::transport))]
    Transport(#[from] reqwest::Error),

    #[error("invalid response body: {0}")]
    #[diagnostic(code(store::decode))]
    Decode(#[from] serde_json::Error),

    /// The store refused or could not take the request (in-process stores,
    /// injected failures).
    #[error("store unavailable: {0}")]
    #[diagnostic(code(store::unavailable))]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Configuration loading errors
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file {}", path.display())]
    #[diagnostic(code(config::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}", path.display())]
    #[diagnostic(code(config::parse))]
    Parse {
        path: PathBuf,
        #[source]
        source: kdl::KdlError,
    },

    #[error("invalid value for {key}: {message}")]
    #[diagnostic(code(config::invalid))]
    Invalid { key: String, message: String },

    #[error("invalid endpoint url {url}: {message}")]
    #[diagnostic(code(config::url))]
    UrlParse { url: String, message: String },
}
