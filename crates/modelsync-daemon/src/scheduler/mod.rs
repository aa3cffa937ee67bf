//! Reconciliation loop and scheduler

pub mod reconciler;

pub use reconciler::{Reconciler, TickReport};

use crate::error::ReconcileError;
use tokio::sync::watch;
use tokio::time::Duration;

/// Runs reconciliation ticks with a fixed pause between them
///
/// A failed tick is logged and the loop carries on; the next tick starts
/// from a fresh observation of both sides.
pub struct Scheduler {
    reconciler: Reconciler,
    interval: Duration,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new(reconciler: Reconciler, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Tick until `shutdown` turns true or its sender is dropped
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Scheduler started");

        let mut ticks: u64 = 0;
        loop {
            if *shutdown.borrow() {
                break;
            }
            ticks += 1;
            self.tick_logged(ticks).await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(ticks, "Scheduler stopped");
    }

    /// Run exactly `n` ticks, pausing between them but not after the last
    pub async fn run_ticks(&self, n: usize) -> Vec<Result<TickReport, ReconcileError>> {
        let mut results = Vec::with_capacity(n);
        for tick in 1..=n {
            results.push(self.tick_logged(tick as u64).await);
            if tick < n {
                tokio::time::sleep(self.interval).await;
            }
        }
        results
    }

    async fn tick_logged(&self, tick: u64) -> Result<TickReport, ReconcileError> {
        let result = self.reconciler.tick().await;
        match &result {
            Ok(report) => tracing::info!(
                tick,
                current_deployments = report.current_deployments,
                created_deployments = report.created_deployments,
                deleted_deployments = report.deleted_deployments,
                new_versions = report.new_versions,
                expired_versions = report.expired_versions,
                deferred_stages = report.deferred_stages,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Reconciliation tick complete"
            ),
            Err(e) => tracing::error!(tick, error = %e, "Reconciliation tick failed"),
        }
        result
    }
}
