//! Interval scheduler
//!
//! Drives periodic sync cycles and forwards manual "sync now" requests.
//! Both paths go through the engine's in-progress guard, so a request
//! landing mid-cycle is dropped rather than queued.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::SyncEngine;

/// Handle for requesting an immediate sync from outside the loop
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<()>,
}

impl SchedulerHandle {
    /// Request a sync now, bypassing the interval timer.
    ///
    /// Returns `false` if the scheduler has shut down.
    pub fn request_sync(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }
}

/// Runs sync cycles on a fixed interval until cancelled
pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    interval_secs: u64,
    rx: mpsc::Receiver<()>,
    cancel: CancellationToken,
}

impl SyncScheduler {
    /// Create a scheduler.
    ///
    /// `interval_secs == 0` disables the timer entirely; only manual
    /// requests through the returned handle trigger cycles.
    pub fn new(
        engine: Arc<SyncEngine>,
        interval_secs: u64,
        cancel: CancellationToken,
    ) -> (Self, SchedulerHandle) {
        let (tx, rx) = mpsc::channel(1);
        (
            Self {
                engine,
                interval_secs,
                rx,
                cancel,
            },
            SchedulerHandle { tx },
        )
    }

    /// Main loop. Returns when the cancellation token fires.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.interval_secs,
            "Sync scheduler starting"
        );

        let mut timer = if self.interval_secs > 0 {
            let mut interval =
                tokio::time::interval(Duration::from_secs(self.interval_secs));
            // Skip the immediate first tick; the caller decides whether to
            // sync on startup.
            interval.tick().await;
            Some(interval)
        } else {
            None
        };

        loop {
            let triggered_by = tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("Sync scheduler shutting down");
                    return;
                }
                request = self.rx.recv() => {
                    match request {
                        Some(()) => "manual",
                        None => {
                            debug!("All scheduler handles dropped, shutting down");
                            return;
                        }
                    }
                }
                () = async {
                    match timer.as_mut() {
                        Some(interval) => {
                            interval.tick().await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                } => "interval",
            };

            debug!(trigger = triggered_by, "Starting scheduled sync cycle");
            match self.engine.sync(false).await {
                Ok(report) if report.skipped => {
                    debug!("Cycle already in flight, request dropped");
                }
                Ok(report) => {
                    debug!(
                        uploaded = report.uploaded,
                        downloaded = report.downloaded,
                        "Scheduled cycle finished"
                    );
                }
                Err(err) => {
                    warn!(error = %err, "Scheduled sync cycle failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_fails_after_shutdown() {
        let (tx, rx) = mpsc::channel(1);
        let handle = SchedulerHandle { tx };
        assert!(handle.request_sync());
        drop(rx);
        assert!(!handle.request_sync());
    }
}
