//! Error types for bundle conversion.
//!
//! Every failure is fatal to the document being converted: either the bundle
//! is fully published, or nothing appears at the destination. Each variant
//! carries the reference string or path needed to diagnose it.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while converting a document into a bundle
#[derive(Debug, Error)]
pub enum Error {
    /// The document could not be structurally parsed
    #[error("Cannot parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// A remote fetch failed (connection, transfer, or non-success status)
    #[error("Failed to fetch {reference}: {reason}")]
    Network { reference: String, reason: String },

    /// A local reference does not exist on disk
    #[error("Local reference not found: {reference}")]
    NotFound { reference: String },

    /// A filesystem operation on the scratch directory or bundle failed
    #[error("{context}: {source}")]
    FileSystem {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Wrap an I/O error with the operation that produced it.
    pub fn filesystem(context: impl Into<String>, source: io::Error) -> Self {
        Error::FileSystem {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_the_reference() {
        let err = Error::Network {
            reference: "http://example.com/a.png".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("http://example.com/a.png"));
        assert!(err.to_string().contains("connection refused"));

        let err = Error::NotFound {
            reference: "images/logo.png".to_string(),
        };
        assert!(err.to_string().contains("images/logo.png"));
    }

    #[test]
    fn test_filesystem_error_preserves_source() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err = Error::filesystem("Failed to create scratch directory", io_err);
        assert!(err.to_string().contains("Failed to create scratch directory"));
    }
}
