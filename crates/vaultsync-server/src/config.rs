//! Server configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Configuration for the manifest service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address, e.g. `127.0.0.1:8787`
    pub bind: String,
    /// Shared secret all device tokens are minted against
    pub shared_secret: String,
    /// Key for presigned URL signatures. When absent a random key is
    /// generated at startup, which invalidates in-flight URLs across
    /// restarts; pin it for multi-instance or restart-tolerant setups.
    pub signing_key: Option<String>,
    /// Base URL clients can reach this server at; prefixed onto presigned
    /// URLs. Empty yields relative URLs.
    pub public_url: String,
    /// Directory for the filesystem object store; `None` serves from memory.
    pub store_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
            shared_secret: String::new(),
            signing_key: None,
            public_url: String::new(),
            store_dir: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ServerConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Platform-appropriate default path for the server config file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("vaultsync")
            .join("server.yaml")
    }

    /// The signing key to use, falling back to a fresh random key.
    #[must_use]
    pub fn signing_key_or_random(&self) -> Vec<u8> {
        match &self.signing_key {
            Some(key) => key.as_bytes().to_vec(),
            None => uuid::Uuid::new_v4().as_bytes().to_vec(),
        }
    }
}
