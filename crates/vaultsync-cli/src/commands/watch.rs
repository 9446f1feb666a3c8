//! `vaultsync watch` - sync on an interval until interrupted

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use vaultsync_engine::scheduler::SyncScheduler;

use crate::commands::{build_engine, load_settings};
use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Override the configured interval (seconds)
    #[arg(long)]
    interval: Option<u64>,

    /// Skip the immediate cycle normally run on startup
    #[arg(long)]
    no_initial: bool,
}

impl WatchCommand {
    pub async fn execute(self, _format: OutputFormat, config: Option<&str>) -> anyhow::Result<()> {
        let settings = load_settings(config)?;
        let engine = build_engine(&settings)?;

        let interval = self.interval.unwrap_or(settings.sync_interval);
        anyhow::ensure!(
            interval > 0,
            "interval is 0 (manual only); use 'vaultsync sync' or pass --interval"
        );

        let cancel = CancellationToken::new();
        let (scheduler, handle) = SyncScheduler::new(engine, interval, cancel.clone());

        let signal_token = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, stopping watch");
                signal_token.cancel();
            }
        });

        if !self.no_initial {
            handle.request_sync();
        }

        scheduler.run().await;
        Ok(())
    }
}
