//! `vaultsync serve` - run the manifest service

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use vaultsync_server::auth::TokenVerifier;
use vaultsync_server::presign::UrlSigner;
use vaultsync_server::{
    FsObjectStore, ManifestService, MemoryObjectStore, ObjectStore, ServerConfig, SyncServer,
};

use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Server config file (defaults to the standard location)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the bind address from the config
    #[arg(long)]
    bind: Option<String>,
}

impl ServeCommand {
    pub async fn execute(self, _format: OutputFormat) -> anyhow::Result<()> {
        let path = self.config.unwrap_or_else(ServerConfig::default_path);
        let mut config = if path.exists() {
            ServerConfig::load(&path)?
        } else {
            info!(path = %path.display(), "No server config found, using defaults");
            ServerConfig::default()
        };
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        anyhow::ensure!(
            !config.shared_secret.is_empty(),
            "server config needs a shared_secret (see {})",
            path.display()
        );

        let store: Arc<dyn ObjectStore> = match &config.store_dir {
            Some(dir) => {
                info!(dir = %dir.display(), "Serving from filesystem store");
                Arc::new(FsObjectStore::new(dir)?)
            }
            None => {
                info!("Serving from in-memory store (contents lost on exit)");
                Arc::new(MemoryObjectStore::new())
            }
        };

        let service = Arc::new(ManifestService::new(
            store,
            TokenVerifier::new(config.shared_secret.as_bytes()),
            UrlSigner::new(config.signing_key_or_random(), config.public_url.clone()),
        ));

        let server = SyncServer::new(service, &config.bind)?;
        let shutdown = CancellationToken::new();

        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, shutting down");
                signal_token.cancel();
            }
        });

        server.run(shutdown).await
    }
}
