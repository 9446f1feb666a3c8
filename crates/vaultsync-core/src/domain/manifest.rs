//! Manifest model
//!
//! The manifest is the canonical index of the vault: one [`FileEntry`] per
//! tracked path, plus bookkeeping about who wrote it last. Clients diff
//! their local scan against the remote manifest and their last agreed base
//! to produce a [`DiffResult`] plan.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{ContentHash, DeviceId, VaultPath};

// ============================================================================
// FileEntry
// ============================================================================

/// Metadata for one tracked file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Vault-relative path; always equals the manifest key it is stored under
    pub path: VaultPath,
    /// SHA-256 of the raw byte contents
    pub hash: ContentHash,
    /// Last-modified milliseconds since epoch. Advisory; the hash is the
    /// authoritative change signal.
    pub mtime: i64,
    /// Byte length
    pub size: u64,
    /// Device that last wrote this entry
    pub last_modified_by: DeviceId,
}

// ============================================================================
// SyncManifest
// ============================================================================

/// The canonical set of tracked files at a point in time
///
/// Stored as a single JSON object in the object store; its ETag is the
/// revision token for optimistic concurrency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncManifest {
    /// path -> entry; keys are unique, order irrelevant (kept sorted here
    /// so serialized output is stable)
    pub files: BTreeMap<VaultPath, FileEntry>,
    /// When this revision was committed
    pub last_updated: DateTime<Utc>,
    /// Device that committed this revision
    pub last_updated_by: DeviceId,
}

impl SyncManifest {
    /// An empty manifest attributed to `device`
    #[must_use]
    pub fn empty(device: DeviceId) -> Self {
        Self {
            files: BTreeMap::new(),
            last_updated: Utc::now(),
            last_updated_by: device,
        }
    }

    /// Number of tracked files
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the manifest tracks no files
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Look up an entry by path
    #[must_use]
    pub fn get(&self, path: &VaultPath) -> Option<&FileEntry> {
        self.files.get(path)
    }

    /// Insert an entry under its own path
    pub fn insert(&mut self, entry: FileEntry) {
        self.files.insert(entry.path.clone(), entry);
    }

    /// Remove an entry; returns it if present
    pub fn remove(&mut self, path: &VaultPath) -> Option<FileEntry> {
        self.files.remove(path)
    }

    /// Check the structural invariants
    ///
    /// Path and hash well-formedness are enforced by the types at
    /// deserialization time; what remains is key/entry agreement.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidManifest` naming the first offending key.
    pub fn validate(&self) -> Result<(), DomainError> {
        for (key, entry) in &self.files {
            if key != &entry.path {
                return Err(DomainError::InvalidManifest(format!(
                    "entry path '{}' does not match its key '{}'",
                    entry.path, key
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// ConflictEntry / DiffResult
// ============================================================================

/// A path modified on both sides since the base
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictEntry {
    pub path: VaultPath,
    /// Local version (synthesized from the base entry for delete/modify
    /// conflicts where the local file is gone)
    pub local: FileEntry,
    /// Remote version
    pub remote: FileEntry,
    /// Hash of the common ancestor, when one is known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_hash: Option<ContentHash>,
}

/// The plan produced by the three-manifest diff
///
/// Every path appears in at most one bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    pub to_upload: Vec<FileEntry>,
    pub to_download: Vec<FileEntry>,
    pub to_delete_remote: Vec<VaultPath>,
    pub to_delete_local: Vec<VaultPath>,
    pub conflicts: Vec<ConflictEntry>,
}

impl DiffResult {
    /// Whether the plan contains no work at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_upload.is_empty()
            && self.to_download.is_empty()
            && self.to_delete_remote.is_empty()
            && self.to_delete_local.is_empty()
            && self.conflicts.is_empty()
    }

    /// Total number of planned operations, for logging
    #[must_use]
    pub fn len(&self) -> usize {
        self.to_upload.len()
            + self.to_download.len()
            + self.to_delete_remote.len()
            + self.to_delete_local.len()
            + self.conflicts.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
