//! Device state port
//!
//! The two facts a device must remember between cycles: the manifest it
//! last agreed on (the three-way diff base) and that manifest's ETag on
//! the server. Written only at the successful end of a cycle.

use serde::{Deserialize, Serialize};

use crate::domain::manifest::SyncManifest;
use crate::domain::newtypes::Etag;

/// Persistent device-local sync state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    /// Manifest agreed upon at the end of the last successful cycle
    pub base_manifest: SyncManifest,
    /// ETag that manifest had on the server
    pub last_etag: Option<Etag>,
}

/// Port trait for persisting [`DeviceState`]
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    /// Load the stored state; `None` before the first successful cycle
    async fn load(&self) -> anyhow::Result<Option<DeviceState>>;

    /// Replace the stored state
    async fn save(&self, state: &DeviceState) -> anyhow::Result<()>;

    /// Drop the stored state (forces the next cycle to run base-less)
    async fn clear(&self) -> anyhow::Result<()>;
}
