//! Error types for the pipeline core.
//!
//! Backend traits return [`anyhow::Result`]; the core wraps those failures
//! into [`GeotrackError`] so callers can tell *which stage* failed without
//! caring about the backend that produced the error.

use thiserror::Error;

/// Errors produced by the pipeline core.
#[derive(Debug, Error)]
pub enum GeotrackError {
    /// A value could not be serialized for the wire.
    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Raw bytes are not a valid envelope.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),

    /// The envelope parsed but its payload is not the expected shape.
    #[error("malformed payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),

    /// A queue push failed. The queue name is deliberately absent: dispatch
    /// reports a single aggregate failure.
    #[error("queue push failed: {0}")]
    Push(String),

    /// A store operation failed.
    #[error("store {operation} failed: {message}")]
    Store {
        operation: &'static str,
        message: String,
    },

    /// The alert broker rejected or never acknowledged a publish.
    #[error("alert publish to {topic} failed: {message}")]
    Publish { topic: String, message: String },
}

impl GeotrackError {
    pub(crate) fn encode(what: &'static str, source: serde_json::Error) -> Self {
        Self::Encode { what, source }
    }

    pub(crate) fn store(operation: &'static str, err: anyhow::Error) -> Self {
        Self::Store {
            operation,
            message: format!("{err:#}"),
        }
    }
}

pub type Result<T, E = GeotrackError> = std::result::Result<T, E>;
