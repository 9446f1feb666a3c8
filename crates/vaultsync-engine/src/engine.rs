//! Sync cycle orchestrator
//!
//! The [`SyncEngine`] drives one full reconciliation cycle between the
//! local vault and the manifest service:
//!
//! 1. Scan the vault into a local manifest
//! 2. Fetch the remote manifest with its ETag
//! 3. Load the last agreed base (unless a full sync was forced)
//! 4. Diff the three manifests into a plan
//! 5. Resolve conflicts per the configured strategy
//! 6. Run all transfers through the bounded queue
//! 7. Apply remote deletions in one bulk call, then local deletions
//! 8. Overlay the written entries onto the remote manifest
//! 9. Commit with `If-Match`; a 412 restarts the cycle from step 1
//! 10. Persist the committed manifest as the new base
//!
//! The commit is the sole linearization point: nothing device-local is
//! updated until the conditional PUT succeeds, so a failed cycle leaves
//! the base stale and the next cycle re-discovers reality.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use vaultsync_core::config::{ConflictStrategy, Settings};
use vaultsync_core::constants::MAX_MANIFEST_RETRIES;
use vaultsync_core::ports::{
    ApiError, ConflictChoice, ConflictPrompt, DeviceState, StateStore, SyncTransport, VaultAdapter,
};
use vaultsync_core::{ConflictEntry, ContentHash, DeviceId, FileEntry, VaultPath};

use crate::diff::{apply_diff_to_manifest, diff_manifests};
use crate::exclude::ExcludeSet;
use crate::merge::merge_three_way;
use crate::queue::TransferQueue;
use crate::scanner::build_local_manifest;

// ============================================================================
// SyncReport / SyncError
// ============================================================================

/// Summary of a completed synchronization cycle
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SyncReport {
    /// Files uploaded (including conflict resolutions that uploaded)
    pub uploaded: u32,
    /// Files downloaded
    pub downloaded: u32,
    /// Local files removed because the remote deleted them
    pub deleted_local: u32,
    /// Remote objects removed because this device deleted them
    pub deleted_remote: u32,
    /// Conflicts resolved this cycle
    pub conflicts_resolved: u32,
    /// Merges that had to emit conflict markers
    pub conflicts_marked: u32,
    /// Non-fatal problems (failed local deletes are tolerated)
    pub soft_errors: Vec<String>,
    /// Wall-clock duration
    pub duration_ms: u64,
    /// True when the call was dropped because a cycle was already running
    pub skipped: bool,
}

impl SyncReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Failures that end a cycle
#[derive(Debug, Error)]
pub enum SyncError {
    /// 401 from the service; the user must reconfigure, nothing retries
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Lost the conditional commit; the cycle restarts (internal signal)
    #[error("lost the manifest commit race")]
    CommitConflict,

    /// Every restart attempt lost the race
    #[error("manifest commit raced {0} times; giving up")]
    CommitRaceExhausted(u32),

    /// 428 or an undecodable response; a client/server mismatch
    #[error("protocol error: {0}")]
    Protocol(String),

    /// 400 from the service
    #[error("request rejected: {0}")]
    Validation(String),

    /// Cycle-level network failure outside the transfer queue
    #[error("transport error: {0}")]
    Transport(String),

    /// A transfer exhausted its retries (or failed a non-retryable way)
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// Local vault I/O failure
    #[error("vault error: {0}")]
    Vault(String),

    /// Device state could not be read or persisted
    #[error("state persistence failed: {0}")]
    State(String),
}

/// What a resolved conflict turned into
enum Resolved {
    Upload(FileEntry),
    Download(FileEntry),
    DeleteLocal(VaultPath),
    DeleteRemote(VaultPath),
}

// ============================================================================
// SyncEngine
// ============================================================================

/// Orchestrates sync cycles against the manifest service
///
/// ## Dependencies
///
/// - `transport`: manifest fetch/commit and file transfer (HTTP in
///   production, in-process in tests)
/// - `vault`: local file access
/// - `state`: the device's base manifest + last ETag
/// - `prompt`: user decisions for the `ask` strategy
pub struct SyncEngine {
    transport: Arc<dyn SyncTransport>,
    vault: Arc<dyn VaultAdapter>,
    state: Arc<dyn StateStore>,
    prompt: Arc<dyn ConflictPrompt>,
    device_id: DeviceId,
    strategy: ConflictStrategy,
    excludes: ExcludeSet,
    concurrency: usize,
    /// At-most-one-cycle guard; overlapping requests are dropped, not queued
    is_syncing: AtomicBool,
    /// Content-addressed cache of text seen this process, used as the
    /// three-way merge base when the conflict's base hash is in it
    base_text_cache: Arc<Mutex<HashMap<ContentHash, String>>>,
    last_report: Mutex<Option<SyncReport>>,
}

impl SyncEngine {
    /// Create an engine from its ports and the client settings
    pub fn new(
        transport: Arc<dyn SyncTransport>,
        vault: Arc<dyn VaultAdapter>,
        state: Arc<dyn StateStore>,
        prompt: Arc<dyn ConflictPrompt>,
        settings: &Settings,
    ) -> Self {
        Self {
            transport,
            vault,
            state,
            prompt,
            device_id: settings.device_id.clone(),
            strategy: settings.conflict_strategy,
            excludes: ExcludeSet::new(&settings.exclude_patterns),
            concurrency: vaultsync_core::constants::MAX_CONCURRENT_TRANSFERS,
            is_syncing: AtomicBool::new(false),
            base_text_cache: Arc::new(Mutex::new(HashMap::new())),
            last_report: Mutex::new(None),
        }
    }

    /// Whether a cycle is currently in flight
    pub fn is_syncing(&self) -> bool {
        self.is_syncing.load(Ordering::SeqCst)
    }

    /// The most recent cycle's report, if any cycle has completed
    pub fn last_report(&self) -> Option<SyncReport> {
        self.last_report.lock().expect("report lock poisoned").clone()
    }

    /// Run one sync cycle.
    ///
    /// `force_full` ignores the stored base manifest, so every divergence
    /// is re-examined as if this device had never synced.
    ///
    /// A call arriving while a cycle is in flight returns immediately with
    /// a report marked `skipped`.
    pub async fn sync(&self, force_full: bool) -> Result<SyncReport, SyncError> {
        if self.is_syncing.swap(true, Ordering::SeqCst) {
            debug!("Sync already in progress, skipping request");
            return Ok(SyncReport::skipped());
        }

        let result = self.sync_guarded(force_full).await;
        self.is_syncing.store(false, Ordering::SeqCst);

        if let Ok(report) = &result {
            *self.last_report.lock().expect("report lock poisoned") = Some(report.clone());
        }
        result
    }

    async fn sync_guarded(&self, force_full: bool) -> Result<SyncReport, SyncError> {
        for attempt in 0..MAX_MANIFEST_RETRIES {
            match self.run_cycle(force_full).await {
                Err(SyncError::CommitConflict) => {
                    warn!(attempt, "Manifest moved during commit, restarting cycle");
                }
                other => return other,
            }
        }
        Err(SyncError::CommitRaceExhausted(MAX_MANIFEST_RETRIES))
    }

    async fn run_cycle(&self, force_full: bool) -> Result<SyncReport, SyncError> {
        let start = Instant::now();
        let mut report = SyncReport::default();

        // Step 1: scan
        let local = build_local_manifest(self.vault.as_ref(), &self.excludes, &self.device_id)
            .await
            .map_err(|e| SyncError::Vault(format!("{e:#}")))?;

        // Step 2: fetch remote
        let remote = self
            .transport
            .fetch_manifest()
            .await
            .map_err(map_api_error)?;

        // Step 3: select base
        let base = if force_full {
            None
        } else {
            self.state
                .load()
                .await
                .map_err(|e| SyncError::State(format!("{e:#}")))?
                .map(|s| s.base_manifest)
        };

        // Step 4: diff
        let diff = diff_manifests(&local, &remote.manifest, base.as_ref());
        info!(
            uploads = diff.to_upload.len(),
            downloads = diff.to_download.len(),
            delete_remote = diff.to_delete_remote.len(),
            delete_local = diff.to_delete_local.len(),
            conflicts = diff.conflicts.len(),
            forced = force_full,
            "Sync plan computed"
        );

        // Step 5: resolve conflicts
        let mut uploads = diff.to_upload.clone();
        let mut downloads = diff.to_download.clone();
        let mut delete_remote = diff.to_delete_remote.clone();
        let mut delete_local = diff.to_delete_local.clone();

        for conflict in &diff.conflicts {
            let local_present = local.get(&conflict.path).is_some();
            let remote_present = remote.manifest.get(&conflict.path).is_some();
            let resolved = self
                .resolve_conflict(conflict, local_present, remote_present, &mut report)
                .await?;
            report.conflicts_resolved += 1;
            match resolved {
                Resolved::Upload(entry) => uploads.push(entry),
                Resolved::Download(entry) => downloads.push(entry),
                Resolved::DeleteLocal(path) => delete_local.push(path),
                Resolved::DeleteRemote(path) => delete_remote.push(path),
            }
        }

        // Step 6: transfers
        let written = self.run_transfers(&uploads, &downloads, &mut report).await?;

        // Step 7: deletions - bulk remote first, then best-effort local
        if !delete_remote.is_empty() {
            self.transport
                .delete_files(&delete_remote)
                .await
                .map_err(map_api_error)?;
            report.deleted_remote = delete_remote.len() as u32;
        }
        for path in &delete_local {
            match self.vault.delete(path).await {
                Ok(()) => report.deleted_local += 1,
                Err(err) => {
                    // Tolerated: the next cycle re-detects the drift
                    warn!(path = %path, error = %err, "Local delete failed");
                    report.soft_errors.push(format!("delete {path}: {err:#}"));
                }
            }
        }

        // Step 8: build the next manifest
        let next = apply_diff_to_manifest(
            &remote.manifest,
            &written,
            &delete_remote,
            self.device_id.clone(),
            Utc::now(),
        );

        // Step 9: conditional commit
        let etag = match self
            .transport
            .commit_manifest(&next, remote.etag.as_ref())
            .await
        {
            Ok(etag) => etag,
            Err(ApiError::PreconditionFailed) => return Err(SyncError::CommitConflict),
            Err(err) => return Err(map_api_error(err)),
        };

        // Step 10: the committed manifest becomes the new base
        self.state
            .save(&DeviceState {
                base_manifest: next,
                last_etag: Some(etag),
            })
            .await
            .map_err(|e| SyncError::State(format!("{e:#}")))?;

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            uploaded = report.uploaded,
            downloaded = report.downloaded,
            deleted_local = report.deleted_local,
            deleted_remote = report.deleted_remote,
            conflicts = report.conflicts_resolved,
            duration_ms = report.duration_ms,
            "Sync cycle completed"
        );

        Ok(report)
    }

    // ========================================================================
    // Conflict resolution
    // ========================================================================

    async fn resolve_conflict(
        &self,
        conflict: &ConflictEntry,
        local_present: bool,
        remote_present: bool,
        report: &mut SyncReport,
    ) -> Result<Resolved, SyncError> {
        let choice = match self.strategy {
            ConflictStrategy::KeepLocal => ConflictChoice::KeepLocal,
            ConflictStrategy::KeepRemote => ConflictChoice::KeepRemote,
            ConflictStrategy::ThreeWayMerge => {
                if conflict.path.is_markdown() && local_present && remote_present {
                    ConflictChoice::Merge
                } else if !remote_present {
                    // Nothing remote to merge with or download
                    ConflictChoice::KeepLocal
                } else {
                    // Non-markdown content (or a locally deleted file):
                    // silently fall back to the remote version
                    ConflictChoice::KeepRemote
                }
            }
            ConflictStrategy::Ask => {
                self.ask_user(conflict, local_present, remote_present)
                    .await?
            }
        };

        debug!(path = %conflict.path, choice = ?choice, "Resolving conflict");

        match choice {
            ConflictChoice::KeepLocal => {
                if local_present {
                    Ok(Resolved::Upload(conflict.local.clone()))
                } else {
                    // Local side already deleted the file; keeping "local"
                    // means propagating that deletion
                    Ok(Resolved::DeleteRemote(conflict.path.clone()))
                }
            }
            ConflictChoice::KeepRemote => {
                if remote_present {
                    Ok(Resolved::Download(conflict.remote.clone()))
                } else {
                    Ok(Resolved::DeleteLocal(conflict.path.clone()))
                }
            }
            ConflictChoice::Merge => self.merge_conflict(conflict, report).await,
        }
    }

    async fn ask_user(
        &self,
        conflict: &ConflictEntry,
        local_present: bool,
        remote_present: bool,
    ) -> Result<ConflictChoice, SyncError> {
        let local_text = if local_present {
            self.vault
                .read_text(&conflict.path)
                .await
                .unwrap_or_default()
        } else {
            String::new()
        };
        let remote_text = if remote_present {
            let bytes = self
                .transport
                .download_file(&conflict.path)
                .await
                .map_err(map_api_error)?;
            String::from_utf8_lossy(&bytes).into_owned()
        } else {
            String::new()
        };

        match self
            .prompt
            .ask_conflict(&conflict.path, &local_text, &remote_text)
            .await
        {
            Ok(Some(choice)) => Ok(choice),
            Ok(None) => {
                debug!(path = %conflict.path, "Conflict prompt dismissed, keeping local");
                Ok(ConflictChoice::KeepLocal)
            }
            Err(err) => {
                warn!(path = %conflict.path, error = %err, "Conflict prompt failed, keeping local");
                Ok(ConflictChoice::KeepLocal)
            }
        }
    }

    async fn merge_conflict(
        &self,
        conflict: &ConflictEntry,
        report: &mut SyncReport,
    ) -> Result<Resolved, SyncError> {
        let local_text = self
            .vault
            .read_text(&conflict.path)
            .await
            .map_err(|e| SyncError::Vault(format!("{e:#}")))?;

        let remote_bytes = self
            .transport
            .download_file(&conflict.path)
            .await
            .map_err(map_api_error)?;
        let remote_text = String::from_utf8_lossy(&remote_bytes).into_owned();

        // Best-effort base: only hashes are persisted across syncs, so the
        // textual base is available only while its content is still cached.
        // A miss degrades to a two-way merge.
        let base_text = conflict
            .base_hash
            .as_ref()
            .and_then(|hash| {
                self.base_text_cache
                    .lock()
                    .expect("cache lock poisoned")
                    .get(hash)
                    .cloned()
            })
            .unwrap_or_default();

        let outcome = merge_three_way(&base_text, &local_text, &remote_text);
        if outcome.is_conflicted() {
            report.conflicts_marked += 1;
            info!(path = %conflict.path, "Merge left conflict markers");
        }

        self.vault
            .write_text(&conflict.path, outcome.text())
            .await
            .map_err(|e| SyncError::Vault(format!("{e:#}")))?;

        let bytes = outcome.text().as_bytes();
        let hash = ContentHash::of_bytes(bytes);
        self.cache_text(&hash, outcome.text());

        Ok(Resolved::Upload(FileEntry {
            path: conflict.path.clone(),
            hash,
            mtime: Utc::now().timestamp_millis(),
            size: bytes.len() as u64,
            last_modified_by: self.device_id.clone(),
        }))
    }

    // ========================================================================
    // Transfers
    // ========================================================================

    async fn run_transfers(
        &self,
        uploads: &[FileEntry],
        downloads: &[FileEntry],
        report: &mut SyncReport,
    ) -> Result<Vec<FileEntry>, SyncError> {
        let queue = TransferQueue::new(self.concurrency);
        let mut handles = Vec::with_capacity(uploads.len() + downloads.len());

        for entry in downloads {
            let transport = Arc::clone(&self.transport);
            let vault = Arc::clone(&self.vault);
            let cache = Arc::clone(&self.base_text_cache);
            let entry = entry.clone();
            handles.push(queue.enqueue(move || {
                let transport = Arc::clone(&transport);
                let vault = Arc::clone(&vault);
                let cache = Arc::clone(&cache);
                let entry = entry.clone();
                async move {
                    let bytes = transport.download_file(&entry.path).await?;
                    vault.write_binary(&entry.path, &bytes).await?;
                    cache_markdown_text(&cache, &entry.path, &entry.hash, &bytes);
                    Ok(entry)
                }
            }));
        }

        for entry in uploads {
            let transport = Arc::clone(&self.transport);
            let vault = Arc::clone(&self.vault);
            let cache = Arc::clone(&self.base_text_cache);
            let entry = entry.clone();
            handles.push(queue.enqueue(move || {
                let transport = Arc::clone(&transport);
                let vault = Arc::clone(&vault);
                let cache = Arc::clone(&cache);
                let entry = entry.clone();
                async move {
                    // Re-read at transfer time; a vanished file fails the cycle
                    let bytes = vault.read_binary(&entry.path).await?;
                    let hash = ContentHash::of_bytes(&bytes);
                    let size = bytes.len() as u64;
                    cache_markdown_text(&cache, &entry.path, &hash, &bytes);
                    transport.upload_file(&entry.path, &hash, bytes).await?;
                    Ok(FileEntry {
                        hash,
                        size,
                        ..entry
                    })
                }
            }));
        }

        report.downloaded = downloads.len() as u32;
        report.uploaded = uploads.len() as u32;

        let mut written = Vec::with_capacity(handles.len());
        for handle in handles {
            let entry = handle.join().await.map_err(classify_transfer_error)?;
            written.push(entry);
        }
        Ok(written)
    }

    fn cache_text(&self, hash: &ContentHash, text: &str) {
        self.base_text_cache
            .lock()
            .expect("cache lock poisoned")
            .insert(hash.clone(), text.to_string());
    }
}

/// Remember markdown content by hash so a later merge can use it as base.
fn cache_markdown_text(
    cache: &Mutex<HashMap<ContentHash, String>>,
    path: &VaultPath,
    hash: &ContentHash,
    bytes: &[u8],
) {
    if !path.is_markdown() {
        return;
    }
    if let Ok(text) = std::str::from_utf8(bytes) {
        cache
            .lock()
            .expect("cache lock poisoned")
            .insert(hash.clone(), text.to_string());
    }
}

fn map_api_error(err: ApiError) -> SyncError {
    match err {
        ApiError::Auth(message) => SyncError::Auth(message),
        ApiError::PreconditionFailed => SyncError::CommitConflict,
        ApiError::IfMatchRequired => {
            SyncError::Protocol("server required If-Match on manifest commit".to_string())
        }
        ApiError::Validation(message) => SyncError::Validation(message),
        ApiError::Transport(message) => SyncError::Transport(message),
        ApiError::Decode(message) => SyncError::Protocol(message),
    }
}

/// A failed transfer usually surfaces as a transfer error, but an auth
/// rejection keeps its fatal classification.
fn classify_transfer_error(err: anyhow::Error) -> SyncError {
    match err.downcast_ref::<ApiError>() {
        Some(ApiError::Auth(message)) => SyncError::Auth(message.clone()),
        Some(ApiError::Validation(message)) => SyncError::Validation(message.clone()),
        _ => SyncError::Transfer(format!("{err:#}")),
    }
}
