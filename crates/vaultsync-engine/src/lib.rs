//! Vaultsync Engine - the two-sided sync engine
//!
//! Provides:
//! - The three-manifest diff (local vs. remote vs. last-synced base)
//! - Three-way text merge with conflict markers
//! - A bounded-concurrency transfer queue with exponential retry
//! - The cycle orchestrator (plan, transfer, commit under If-Match)
//! - An interval scheduler and the filesystem adapters

pub mod diff;
pub mod engine;
pub mod exclude;
pub mod merge;
pub mod queue;
pub mod scanner;
pub mod scheduler;
pub mod state_file;
pub mod vault_fs;

pub use diff::{apply_diff_to_manifest, diff_manifests};
pub use engine::{SyncEngine, SyncError, SyncReport};
pub use exclude::ExcludeSet;
pub use merge::{merge_three_way, MergeOutcome};
pub use queue::TransferQueue;
