//! Domain error types
//!
//! Validation failures for the value types in this crate. Anything that
//! crosses a port boundary is wrapped into `anyhow::Error` by the caller.

use thiserror::Error;

/// Errors that can occur constructing or validating domain values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid vault path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid content hash (expected 64 lowercase hex chars)
    #[error("Invalid hash format: {0}")]
    InvalidHash(String),

    /// Invalid device identifier
    #[error("Invalid device id: {0}")]
    InvalidDeviceId(String),

    /// Invalid ETag value
    #[error("Invalid etag: {0}")]
    InvalidEtag(String),

    /// Manifest violates one of its structural invariants
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),
}
