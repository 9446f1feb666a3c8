//! Port definitions (traits for adapters)
//!
//! The engine is written entirely against these traits. Production
//! adapters live in `vaultsync-engine` (filesystem vault, JSON state
//! file) and `vaultsync-api` (HTTP transport); tests substitute
//! in-process implementations.

pub mod prompt;
pub mod state;
pub mod transport;
pub mod vault;

pub use prompt::{ConflictChoice, ConflictPrompt};
pub use state::{DeviceState, StateStore};
pub use transport::{ApiError, RemoteManifest, SyncTransport};
pub use vault::{VaultAdapter, VaultFileInfo};
