//! `vaultsync sync` - run one cycle

use clap::Args;

use crate::commands::{build_engine, load_settings};
use crate::output::{emit, OutputFormat};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Ignore the stored base manifest and re-examine everything
    #[arg(long)]
    full: bool,
}

impl SyncCommand {
    pub async fn execute(self, format: OutputFormat, config: Option<&str>) -> anyhow::Result<()> {
        let settings = load_settings(config)?;
        let engine = build_engine(&settings)?;

        let report = engine.sync(self.full).await?;

        emit(
            format,
            serde_json::to_value(&report)?,
            || {
                if report.skipped {
                    println!("Sync skipped: another cycle is in progress");
                    return;
                }
                println!(
                    "Sync complete: {} up, {} down, {} deleted here, {} deleted remotely ({} ms)",
                    report.uploaded,
                    report.downloaded,
                    report.deleted_local,
                    report.deleted_remote,
                    report.duration_ms
                );
                if report.conflicts_resolved > 0 {
                    println!(
                        "Conflicts resolved: {} ({} left markers)",
                        report.conflicts_resolved, report.conflicts_marked
                    );
                }
                for err in &report.soft_errors {
                    println!("warning: {err}");
                }
            },
        );
        Ok(())
    }
}
