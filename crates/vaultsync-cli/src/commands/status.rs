//! `vaultsync status` - show settings, device state, and server health

use clap::Args;

use vaultsync_api::HttpTransport;
use vaultsync_core::config::Settings;
use vaultsync_core::ports::StateStore;
use vaultsync_engine::state_file::JsonStateStore;

use crate::commands::load_settings;
use crate::output::{emit, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Skip the server health probe
    #[arg(long)]
    offline: bool,
}

impl StatusCommand {
    pub async fn execute(self, format: OutputFormat, config: Option<&str>) -> anyhow::Result<()> {
        let settings = load_settings(config)?;

        let state = JsonStateStore::new(Settings::default_state_path())
            .load()
            .await?;
        let (base_files, last_etag) = match &state {
            Some(state) => (
                Some(state.base_manifest.len()),
                state.last_etag.as_ref().map(|e| e.as_str().to_string()),
            ),
            None => (None, None),
        };

        let health = if self.offline || settings.endpoint.is_empty() {
            None
        } else {
            let transport = HttpTransport::new(&settings.endpoint, &settings.token);
            Some(transport.health().await)
        };

        let server_ok = health.as_ref().map(|h| h.is_ok());

        emit(
            format,
            serde_json::json!({
                "deviceId": settings.device_id.as_str(),
                "endpoint": settings.endpoint,
                "vaultRoot": settings.vault_root.display().to_string(),
                "syncInterval": settings.sync_interval,
                "baseManifestFiles": base_files,
                "lastEtag": last_etag,
                "serverReachable": server_ok,
            }),
            || {
                println!("Device:    {}", settings.device_id);
                println!("Endpoint:  {}", settings.endpoint);
                println!("Vault:     {}", settings.vault_root.display());
                match base_files {
                    Some(count) => println!(
                        "Last sync: {count} files tracked (etag {})",
                        last_etag.as_deref().unwrap_or("none")
                    ),
                    None => println!("Last sync: never"),
                }
                match &health {
                    Some(Ok(info)) => println!("Server:    ok (version {})", info.version),
                    Some(Err(err)) => println!("Server:    unreachable ({err})"),
                    None => println!("Server:    not probed"),
                }
            },
        );
        Ok(())
    }
}
