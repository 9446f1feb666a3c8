//! JSON device-state store
//!
//! Persists the base manifest and last ETag as a single JSON document.
//! Writes go through a temp file and an atomic rename so a crash mid-save
//! never leaves a torn state file.

use std::path::PathBuf;

use anyhow::Context;

use vaultsync_core::ports::{DeviceState, StateStore};

/// File-backed [`StateStore`]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait::async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self) -> anyhow::Result<Option<DeviceState>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let state = serde_json::from_slice(&bytes)
                    .with_context(|| format!("Corrupt state file {}", self.path.display()))?;
                Ok(Some(state))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).context("Failed to read state file"),
        }
    }

    async fn save(&self, state: &DeviceState) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create state directory")?;
        }

        let bytes = serde_json::to_vec_pretty(state).context("Failed to encode state")?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", temp.display()))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .context("Failed to move state file into place")?;
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).context("Failed to remove state file"),
        }
    }
}
