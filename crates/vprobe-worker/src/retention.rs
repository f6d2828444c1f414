//! Background service evicting finished jobs.
//!
//! Runs periodically and removes `Completed`/`Failed` jobs (record and log)
//! created longer ago than the retention window. Jobs still queued or
//! processing are never touched.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info};

use vprobe_store::JobStore;

use crate::metrics;

/// Retention sweeper service.
pub struct RetentionSweeper {
    store: Arc<JobStore>,
    retention: Duration,
    sweep_interval: Duration,
}

impl RetentionSweeper {
    pub fn new(store: Arc<JobStore>, retention: Duration, sweep_interval: Duration) -> Self {
        Self {
            store,
            retention,
            sweep_interval,
        }
    }

    /// Run sweeps until `shutdown_rx` flips to `true`.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            "Starting retention sweeper (retention: {:?}, interval: {:?})",
            self.retention, self.sweep_interval
        );

        if *shutdown_rx.borrow_and_update() {
            info!("Retention sweeper stopped");
            return;
        }

        let mut ticker = interval(self.sweep_interval);

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Retention sweeper stopped");
                        return;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once() {
                        error!("Retention sweep error: {}", e);
                    }
                }
            }
        }
    }

    /// Run a single eviction pass, returning how many jobs were removed.
    pub fn sweep_once(&self) -> anyhow::Result<usize> {
        let window = chrono::Duration::from_std(self.retention)?;
        let cutoff = Utc::now() - window;

        let evicted = self.store.evict_terminal_created_before(cutoff);
        if evicted > 0 {
            metrics::record_jobs_evicted(evicted);
            info!(
                evicted,
                remaining = self.store.len(),
                "Evicted finished jobs past retention"
            );
        }
        Ok(evicted)
    }
}
