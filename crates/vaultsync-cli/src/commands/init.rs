//! `vaultsync init` - write an initial settings file

use clap::Args;
use std::path::PathBuf;

use vaultsync_core::config::Settings;
use vaultsync_core::DeviceId;

use crate::commands::settings_path;
use crate::output::{emit, OutputFormat};

#[derive(Debug, Args)]
pub struct InitCommand {
    /// Manifest service endpoint, e.g. https://sync.example.com
    #[arg(long)]
    endpoint: String,

    /// Device token (mint one with 'vaultsync token')
    #[arg(long)]
    token: String,

    /// Vault directory to synchronize
    #[arg(long)]
    vault: PathBuf,

    /// Seconds between automatic cycles (0 = manual only)
    #[arg(long, default_value_t = 300)]
    interval: u64,

    /// Overwrite an existing settings file
    #[arg(long)]
    force: bool,
}

impl InitCommand {
    pub async fn execute(self, format: OutputFormat, config: Option<&str>) -> anyhow::Result<()> {
        let path = settings_path(config);
        if path.exists() && !self.force {
            anyhow::bail!(
                "settings already exist at {}; pass --force to overwrite",
                path.display()
            );
        }

        let settings = Settings {
            vault_root: self.vault,
            endpoint: self.endpoint,
            token: self.token,
            device_id: DeviceId::generate(),
            sync_interval: self.interval,
            ..Settings::default()
        };
        settings.save(&path)?;

        emit(
            format,
            serde_json::json!({
                "ok": true,
                "path": path.display().to_string(),
                "deviceId": settings.device_id.as_str(),
            }),
            || {
                println!("Settings written to {}", path.display());
                println!("Device id: {}", settings.device_id);
            },
        );
        Ok(())
    }
}
