//! Object store abstraction
//!
//! The one concurrency primitive the whole protocol rests on lives here:
//! `put_if_match`, a compare-and-swap keyed on the object's ETag. ETags
//! are content hashes, which keeps both adapters stateless; to the
//! protocol they are opaque strings either way.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use vaultsync_core::{ContentHash, Etag};

/// Bytes plus the revision token the store minted for them
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub etag: Etag,
}

/// Failures from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The compare-and-swap expectation did not hold
    #[error("store precondition failed")]
    PreconditionFailed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn etag_for(bytes: &[u8]) -> Etag {
    Etag::new(ContentHash::of_bytes(bytes).as_str().to_string())
        .expect("content hash is never empty")
}

/// Port trait over the underlying key/value store
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read an object
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError>;

    /// Unconditionally write an object, returning its new ETag
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<Etag, StoreError>;

    /// Conditionally write an object.
    ///
    /// `expected: Some(etag)` commits only if the stored ETag matches;
    /// `expected: None` commits only if no object exists yet. Either
    /// violation yields [`StoreError::PreconditionFailed`].
    async fn put_if_match(
        &self,
        key: &str,
        bytes: Vec<u8>,
        expected: Option<&Etag>,
    ) -> Result<Etag, StoreError>;

    /// Delete an object; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

// ============================================================================
// MemoryObjectStore
// ============================================================================

/// In-memory store for tests and ephemeral serving
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        Ok(self.objects.read().get(key).cloned())
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<Etag, StoreError> {
        let etag = etag_for(&bytes);
        self.objects.write().insert(
            key.to_string(),
            StoredObject {
                bytes,
                etag: etag.clone(),
            },
        );
        Ok(etag)
    }

    async fn put_if_match(
        &self,
        key: &str,
        bytes: Vec<u8>,
        expected: Option<&Etag>,
    ) -> Result<Etag, StoreError> {
        let mut objects = self.objects.write();
        let current = objects.get(key).map(|o| &o.etag);
        if current != expected {
            return Err(StoreError::PreconditionFailed);
        }
        let etag = etag_for(&bytes);
        objects.insert(
            key.to_string(),
            StoredObject {
                bytes,
                etag: etag.clone(),
            },
        );
        Ok(etag)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.objects.write().remove(key).is_some())
    }
}

// ============================================================================
// FsObjectStore
// ============================================================================

/// Directory-backed store for durable single-node serving
///
/// Keys map to paths under the root. Conditional writes are serialized
/// through one async mutex; this adapter trades write concurrency for
/// not needing any sidecar metadata.
pub struct FsObjectStore {
    root: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create store root {}", root.display()))?;
        Ok(Self {
            root,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    async fn read_object(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        match tokio::fs::read(self.resolve(key)).await {
            Ok(bytes) => {
                let etag = etag_for(&bytes);
                Ok(Some(StoredObject { bytes, etag }))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::Other(
                anyhow::Error::new(err).context(format!("Failed to read object {key}")),
            )),
        }
    }

    async fn write_object(&self, key: &str, bytes: &[u8]) -> Result<Etag, StoreError> {
        let path = self.resolve(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create object directory")?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write object {key}"))?;
        Ok(etag_for(bytes))
    }
}

#[async_trait::async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        self.read_object(key).await
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<Etag, StoreError> {
        let _guard = self.write_lock.lock().await;
        self.write_object(key, &bytes).await
    }

    async fn put_if_match(
        &self,
        key: &str,
        bytes: Vec<u8>,
        expected: Option<&Etag>,
    ) -> Result<Etag, StoreError> {
        let _guard = self.write_lock.lock().await;
        let current = self.read_object(key).await?.map(|o| o.etag);
        if current.as_ref() != expected {
            debug!(key, "Conditional write rejected");
            return Err(StoreError::PreconditionFailed);
        }
        self.write_object(key, &bytes).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.resolve(key)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StoreError::Other(
                anyhow::Error::new(err).context(format!("Failed to delete object {key}")),
            )),
        }
    }
}
