//! Client settings
//!
//! Typed settings that map to the YAML settings file, with loading,
//! defaults, and a platform-appropriate default path.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::newtypes::DeviceId;

/// How the engine resolves a path modified on both sides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Prompt the user per conflict
    #[default]
    Ask,
    /// Merge markdown textually; other files fall back to keep-remote
    ThreeWayMerge,
    /// Local version wins
    KeepLocal,
    /// Remote version wins
    KeepRemote,
}

/// Client settings for one device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding the synchronized vault
    pub vault_root: PathBuf,
    /// Base URL of the manifest service, e.g. `https://sync.example.com`
    pub endpoint: String,
    /// Bearer token (`deviceId:hmacHex`)
    pub token: String,
    /// This device's stable identifier
    pub device_id: DeviceId,
    /// Seconds between automatic cycles; 0 disables the timer (manual only)
    pub sync_interval: u64,
    /// Conflict resolution policy
    pub conflict_strategy: ConflictStrategy,
    /// Glob patterns excluded from scanning (`*` = one segment, `**` = any)
    pub exclude_patterns: Vec<String>,
    /// Whether opening a file in the host app triggers a cycle
    pub sync_on_file_open: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            vault_root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("vault"),
            endpoint: String::new(),
            token: String::new(),
            device_id: DeviceId::generate(),
            sync_interval: 300,
            conflict_strategy: ConflictStrategy::default(),
            exclude_patterns: vec![".trash/**".to_string(), "**/*.tmp".to_string()],
            sync_on_file_open: false,
        }
    }
}

impl Settings {
    /// Load settings from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_yaml::from_str(&content)?;
        Ok(settings)
    }

    /// Try to load from `path`; fall back to [`Settings::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Write settings to a YAML file at `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Platform-appropriate default path for the settings file.
    ///
    /// Typically `$XDG_CONFIG_HOME/vaultsync/settings.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("vaultsync")
            .join("settings.yaml")
    }

    /// Default location of the device state file (base manifest + ETag).
    pub fn default_state_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("vaultsync")
            .join("state.json")
    }
}
