//! Domain-specific error types for XStream.
//!
//! All fallible operations return `Result<T, XStreamError>`.
//! Every kind is local and recoverable; nothing in this crate aborts
//! the host process.

use thiserror::Error;

/// The canonical error type for XStream.
#[derive(Debug, Error)]
pub enum XStreamError {
    // ── Discovery Errors ─────────────────────────────────────────
    /// No vehicle definition matches the current runtime identity.
    #[error("no definition matches author {author:?} / type code {type_code:?}")]
    DefinitionNotFound { author: String, type_code: String },

    /// No candidate buffer matched any signature of the resolved definition.
    #[error("no source buffer matched after scanning {scanned} candidates")]
    BufferNotFound { scanned: usize },

    // ── Delivery Errors ──────────────────────────────────────────
    /// The background delivery context failed to come up.
    #[error("delivery setup failed: {0}")]
    DeliverySetupFailure(String),

    /// A single frame handoff to the transport failed.
    #[error("frame delivery to {endpoint} failed: {source}")]
    FrameDeliveryError {
        endpoint: String,
        #[source]
        source: FlowError,
    },

    /// A mount path did not name any endpoint.
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    /// A demand signal arrived in a state that does not accept it.
    #[error("invalid endpoint transition: {0}")]
    InvalidTransition(&'static str),

    /// The delivery event loop is gone.
    #[error("channel closed")]
    ChannelClosed,

    // ── Configuration Errors ─────────────────────────────────────
    /// The signature catalog failed validation.
    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),

    /// A glob pattern could not be compiled.
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern {
        pattern: String,
        reason: &'static str,
    },

    /// The encode pipeline description is out of range.
    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    // ── Host / IO Errors ─────────────────────────────────────────
    /// The host refused or failed a buffer query.
    #[error("host error: {0}")]
    Host(String),

    /// Filesystem error (catalog load, dumps).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog or dump (de)serialisation failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── FlowError ─────────────────────────────────────────────────────

/// Result of a rejected frame push, as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    /// The downstream pipeline is flushing (seek or teardown in progress).
    #[error("flushing")]
    Flushing,

    /// The sink is not linked to anything downstream.
    #[error("not linked")]
    NotLinked,

    /// The consumer already reached end-of-stream.
    #[error("end of stream")]
    Eos,

    /// Any other transport failure.
    #[error("flow error: {0}")]
    Error(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for XStreamError {
    fn from(s: String) -> Self {
        XStreamError::Other(s)
    }
}

impl From<&str> for XStreamError {
    fn from(s: &str) -> Self {
        XStreamError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for XStreamError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        XStreamError::ChannelClosed
    }
}

impl From<toml::de::Error> for XStreamError {
    fn from(e: toml::de::Error) -> Self {
        XStreamError::Encoding(e.to_string())
    }
}

impl From<serde_json::Error> for XStreamError {
    fn from(e: serde_json::Error) -> Self {
        XStreamError::Encoding(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = XStreamError::DefinitionNotFound {
            author: "airbus".into(),
            type_code: "B738".into(),
        };
        assert!(e.to_string().contains("B738"));

        let e = XStreamError::BufferNotFound { scanned: 999 };
        assert!(e.to_string().contains("999"));
    }

    #[test]
    fn frame_delivery_keeps_source() {
        use std::error::Error as _;

        let e = XStreamError::FrameDeliveryError {
            endpoint: "pfd".into(),
            source: FlowError::Flushing,
        };
        assert!(e.to_string().contains("pfd"));
        assert!(e.source().is_some());
    }

    #[test]
    fn from_string() {
        let e: XStreamError = "something broke".into();
        assert!(matches!(e, XStreamError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let e: XStreamError = io_err.into();
        assert!(matches!(e, XStreamError::Io(_)));
    }
}
