//! Error handling and custom error types
//!
//! Provides unified error handling across the dispatch layer using thiserror.
//! Backend failures are split into permission, service and transient classes;
//! only transient failures are retried.

use crate::models::UploadOutcome;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid G2O protocol version {0}; only 4 (SHA-1) and 5 (SHA-256) are supported")]
    InvalidProtocolVersion(u8),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("{backend} permission error for {key}: {message}")]
    Permission {
        backend: &'static str,
        key: String,
        message: String,
    },

    #[error("{backend} service error for {key}: {message}")]
    Service {
        backend: &'static str,
        key: String,
        message: String,
    },

    #[error("{backend} transient error for {key}: {message}")]
    Transient {
        backend: &'static str,
        key: String,
        message: String,
    },

    #[error("CDN url {url} is invalid: {reason}")]
    InvalidCdnUrl { url: String, reason: String },

    #[error("No serving url for size {width}x{height}")]
    SizeNotFound { width: u32, height: u32 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Concurrent modification conflict: {0}")]
    Conflict(String),

    #[error("Upload batch for {asset_id} failed: {source}")]
    Batch {
        asset_id: String,
        outcomes: Vec<UploadOutcome>,
        #[source]
        source: Box<Error>,
    },

    #[error("Invariant violated: {0}")]
    Invariant(String),
}

impl Error {
    pub fn permission(backend: &'static str, key: &str, message: impl ToString) -> Self {
        Error::Permission {
            backend,
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    pub fn service(backend: &'static str, key: &str, message: impl ToString) -> Self {
        Error::Service {
            backend,
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    pub fn transient(backend: &'static str, key: &str, message: impl ToString) -> Self {
        Error::Transient {
            backend,
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    /// Whether the failure may succeed if the same call is issued again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient { .. })
    }

    /// Failures that reach callers as I/O-class errors: storage or CDN
    /// operations that could not be completed.
    pub fn is_io(&self) -> bool {
        match self {
            Error::Io(_)
            | Error::Http(_)
            | Error::Permission { .. }
            | Error::Service { .. }
            | Error::Transient { .. }
            | Error::InvalidCdnUrl { .. } => true,
            Error::Batch { source, .. } => source.is_io(),
            _ => false,
        }
    }

    /// A transient failure that exhausted its retries becomes a service error.
    pub fn into_terminal(self) -> Self {
        match self {
            Error::Transient {
                backend,
                key,
                message,
            } => Error::Service {
                backend,
                key,
                message: format!("{} (retries exhausted)", message),
            },
            other => other,
        }
    }

    /// Unwraps a batch failure down to the rendition error that caused it.
    pub fn root(&self) -> &Error {
        match self {
            Error::Batch { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
