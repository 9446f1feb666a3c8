//! Vault scanner
//!
//! Builds the local manifest for a cycle: every non-excluded file in the
//! vault gets hashed and recorded. The hash is what the diff works from;
//! mtimes ride along as advisory metadata.

use tracing::debug;

use vaultsync_core::ports::VaultAdapter;
use vaultsync_core::{ContentHash, DeviceId, FileEntry, SyncManifest};

use crate::exclude::ExcludeSet;

/// Scan the vault into a manifest attributed to `device`.
///
/// Excluded paths are never read, so they can never produce diff entries.
pub async fn build_local_manifest(
    vault: &dyn VaultAdapter,
    excludes: &ExcludeSet,
    device: &DeviceId,
) -> anyhow::Result<SyncManifest> {
    let mut manifest = SyncManifest::empty(device.clone());

    let files = vault.list_files().await?;
    let total = files.len();
    let mut skipped = 0usize;

    for info in files {
        if excludes.is_excluded(&info.path) {
            skipped += 1;
            continue;
        }

        let bytes = vault.read_binary(&info.path).await?;
        manifest.insert(FileEntry {
            path: info.path,
            hash: ContentHash::of_bytes(&bytes),
            mtime: info.mtime,
            size: bytes.len() as u64,
            last_modified_by: device.clone(),
        });
    }

    debug!(
        scanned = total,
        tracked = manifest.len(),
        excluded = skipped,
        "Local manifest built"
    );

    Ok(manifest)
}
