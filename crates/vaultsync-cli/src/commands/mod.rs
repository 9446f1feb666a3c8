//! CLI subcommand implementations

pub mod init;
pub mod serve;
pub mod status;
pub mod sync;
pub mod token;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use vaultsync_api::HttpTransport;
use vaultsync_core::config::Settings;
use vaultsync_engine::state_file::JsonStateStore;
use vaultsync_engine::vault_fs::FsVault;
use vaultsync_engine::SyncEngine;

use crate::prompt::TerminalPrompt;

/// Resolve the settings path from `--config` or the default location.
pub fn settings_path(config: Option<&str>) -> PathBuf {
    config.map_or_else(Settings::default_path, PathBuf::from)
}

/// Load settings, failing with a pointer at `vaultsync init` when absent.
pub fn load_settings(config: Option<&str>) -> anyhow::Result<Settings> {
    let path = settings_path(config);
    Settings::load(&path).with_context(|| {
        format!(
            "No usable settings at {}. Run 'vaultsync init' first.",
            path.display()
        )
    })
}

/// Wire up a ready-to-run engine from settings.
pub fn build_engine(settings: &Settings) -> anyhow::Result<Arc<SyncEngine>> {
    anyhow::ensure!(
        !settings.endpoint.is_empty(),
        "settings have no endpoint configured"
    );
    anyhow::ensure!(!settings.token.is_empty(), "settings have no token configured");

    let transport = Arc::new(HttpTransport::new(&settings.endpoint, &settings.token));
    let vault = Arc::new(FsVault::new(&settings.vault_root)?);
    let state = Arc::new(JsonStateStore::new(Settings::default_state_path()));

    Ok(Arc::new(SyncEngine::new(
        transport,
        vault,
        state,
        Arc::new(TerminalPrompt),
        settings,
    )))
}
