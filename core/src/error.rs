//! Error types for the Saturn API client.
//!
//! # Design
//! Every failure is surfaced to the immediate caller; nothing here is
//! retried. `Api` carries the remote status so callers can branch on 404
//! and friends without string matching.

use thiserror::Error;

/// Errors returned by `SaturnClient`, `SaturnConnection` and the helpers
/// built on them.
#[derive(Debug, Error)]
pub enum SaturnError {
    /// Missing or invalid base URL / API token at construction time.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The service could not be reached (DNS, refused connection, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-2xx status.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    #[error("resource type \"{0}\" not found")]
    UnknownResourceType(String),

    #[error("resource status \"{0}\" not found")]
    UnknownResourceStatus(String),

    #[error("pod source \"{0}\" not found")]
    UnknownDataSource(String),

    /// A successful response did not have the shape the caller relies on.
    #[error("{0}")]
    Unexpected(String),
}

impl SaturnError {
    /// Status code of an `Api` error, `None` for every other variant.
    pub fn status(&self) -> Option<u16> {
        match self {
            SaturnError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

pub type Result<T> = std::result::Result<T, SaturnError>;
