//! Sync transport port
//!
//! The engine's view of the manifest service. Unlike the other ports this
//! one surfaces a typed error: the engine's failure semantics depend on
//! distinguishing a lost commit race (retry the cycle) from an auth
//! failure (stop) from a transient transport fault (the queue retries).

use thiserror::Error;

use crate::domain::manifest::SyncManifest;
use crate::domain::newtypes::{ContentHash, Etag, VaultPath};

/// A manifest fetched from the service together with its revision token
#[derive(Debug, Clone)]
pub struct RemoteManifest {
    pub manifest: SyncManifest,
    /// `None` when the store has no manifest yet (first sync ever)
    pub etag: Option<Etag>,
}

/// Typed failures crossing the transport seam
#[derive(Debug, Error)]
pub enum ApiError {
    /// 401 - token rejected; fatal until the user reconfigures
    #[error("authentication failed: {0}")]
    Auth(String),

    /// 412 - the manifest moved underneath us; restart the cycle
    #[error("manifest etag precondition failed")]
    PreconditionFailed,

    /// 428 - we omitted If-Match where one was required; client bug, fatal
    #[error("if-match header required by server")]
    IfMatchRequired,

    /// 400 - the server rejected the request contents
    #[error("request rejected: {0}")]
    Validation(String),

    /// Network-level failure or 5xx; worth retrying
    #[error("transport error: {0}")]
    Transport(String),

    /// A response that could not be decoded
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether the transfer queue should retry the operation
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Whether this is the lost-commit-race signal
    #[must_use]
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, Self::PreconditionFailed)
    }
}

/// Port trait for talking to the manifest service
///
/// Implementations resolve presigned URLs internally; the engine only
/// deals in paths and bytes.
#[async_trait::async_trait]
pub trait SyncTransport: Send + Sync {
    /// Fetch the current manifest and its ETag. A store with no manifest
    /// yields an empty manifest and `etag: None`.
    async fn fetch_manifest(&self) -> Result<RemoteManifest, ApiError>;

    /// Conditionally commit a new manifest.
    ///
    /// `if_match` must carry the ETag from the fetch that started the
    /// cycle; `None` only on the very first commit to an empty store.
    async fn commit_manifest(
        &self,
        manifest: &SyncManifest,
        if_match: Option<&Etag>,
    ) -> Result<Etag, ApiError>;

    /// Upload one file's bytes to its object-store key
    async fn upload_file(
        &self,
        path: &VaultPath,
        hash: &ContentHash,
        bytes: Vec<u8>,
    ) -> Result<(), ApiError>;

    /// Download one file's bytes from its object-store key
    async fn download_file(&self, path: &VaultPath) -> Result<Vec<u8>, ApiError>;

    /// Bulk-delete file objects
    async fn delete_files(&self, paths: &[VaultPath]) -> Result<(), ApiError>;
}
