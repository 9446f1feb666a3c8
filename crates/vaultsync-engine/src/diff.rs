//! Three-manifest diff
//!
//! Pure classification of every path in the union of three manifests
//! (local scan, remote, last-synced base) into the five plan buckets:
//! upload, download, delete-local, delete-remote, conflict.
//!
//! The base is what this device last agreed on with the server. A side
//! "changed" when it is present in both that side and the base and the
//! hashes differ; presence/absence transitions are classified directly
//! from the table below.
//!
//! | local | remote | base | condition            | action            |
//! |-------|--------|------|----------------------|-------------------|
//! | yes   | no     | no   |                      | upload            |
//! | yes   | no     | yes  | local changed        | conflict          |
//! | yes   | no     | yes  | local unchanged      | delete local      |
//! | no    | yes    | no   |                      | download          |
//! | no    | yes    | yes  | remote changed       | conflict          |
//! | no    | yes    | yes  | remote unchanged     | delete remote     |
//! | yes   | yes    | any  | hashes equal         | nothing           |
//! | yes   | yes    | yes  | only local changed   | upload            |
//! | yes   | yes    | yes  | only remote changed  | download          |
//! | yes   | yes    | yes  | both changed         | conflict          |
//! | yes   | yes    | no   | hashes differ        | conflict (no base)|
//! | no    | no     | yes  |                      | nothing           |

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use vaultsync_core::{ConflictEntry, DeviceId, DiffResult, FileEntry, SyncManifest, VaultPath};

/// Classify every path of `local` ∪ `remote` ∪ `base` into the plan buckets.
///
/// Pass `base: None` for a forced full sync or a device that has never
/// completed a cycle; every both-sided hash mismatch then becomes a
/// conflict, because there is no ancestor to arbitrate with.
#[must_use]
pub fn diff_manifests(
    local: &SyncManifest,
    remote: &SyncManifest,
    base: Option<&SyncManifest>,
) -> DiffResult {
    let mut result = DiffResult::default();

    let mut paths: BTreeSet<&VaultPath> = BTreeSet::new();
    paths.extend(local.files.keys());
    paths.extend(remote.files.keys());
    if let Some(base) = base {
        paths.extend(base.files.keys());
    }

    for path in paths {
        let l = local.get(path);
        let r = remote.get(path);
        let b = base.and_then(|m| m.get(path));

        match (l, r) {
            (Some(l), Some(r)) => {
                // Equal content short-circuits before any base comparison.
                if l.hash == r.hash {
                    continue;
                }
                match b {
                    None => result.conflicts.push(ConflictEntry {
                        path: path.clone(),
                        local: l.clone(),
                        remote: r.clone(),
                        base_hash: None,
                    }),
                    Some(b) => {
                        let local_changed = l.hash != b.hash;
                        let remote_changed = r.hash != b.hash;
                        match (local_changed, remote_changed) {
                            (true, false) => result.to_upload.push(l.clone()),
                            (false, true) => result.to_download.push(r.clone()),
                            // Both changed; the (false, false) arm is
                            // unreachable when hashes differ but is kept in
                            // the conservative bucket anyway.
                            _ => result.conflicts.push(ConflictEntry {
                                path: path.clone(),
                                local: l.clone(),
                                remote: r.clone(),
                                base_hash: Some(b.hash.clone()),
                            }),
                        }
                    }
                }
            }
            (Some(l), None) => match b {
                None => result.to_upload.push(l.clone()),
                Some(b) => {
                    if l.hash != b.hash {
                        // Modified here, deleted remotely. The missing side
                        // is synthesized from the base entry.
                        result.conflicts.push(ConflictEntry {
                            path: path.clone(),
                            local: l.clone(),
                            remote: b.clone(),
                            base_hash: Some(b.hash.clone()),
                        });
                    } else {
                        result.to_delete_local.push(path.clone());
                    }
                }
            },
            (None, Some(r)) => match b {
                None => result.to_download.push(r.clone()),
                Some(b) => {
                    if r.hash != b.hash {
                        // Deleted here, modified remotely.
                        result.conflicts.push(ConflictEntry {
                            path: path.clone(),
                            local: b.clone(),
                            remote: r.clone(),
                            base_hash: Some(b.hash.clone()),
                        });
                    } else {
                        result.to_delete_remote.push(path.clone());
                    }
                }
            },
            // Deleted on both sides already; nothing to plan.
            (None, None) => {}
        }
    }

    result
}

/// Build the next manifest to commit: `remote` overlaid with the entries
/// written this cycle, minus the paths deleted remotely.
///
/// Does not mutate `remote`.
#[must_use]
pub fn apply_diff_to_manifest(
    remote: &SyncManifest,
    written: &[FileEntry],
    deleted_remote: &[VaultPath],
    committed_by: DeviceId,
    committed_at: DateTime<Utc>,
) -> SyncManifest {
    let mut next = SyncManifest {
        files: remote.files.clone(),
        last_updated: committed_at,
        last_updated_by: committed_by,
    };

    for entry in written {
        next.insert(entry.clone());
    }
    for path in deleted_remote {
        next.remove(path);
    }

    next
}
