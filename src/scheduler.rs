//! Background archive sweeper
//!
//! Runs the lifecycle sweep on a fixed period. Each sweep executes on the
//! blocking pool; the timer task itself never touches the filesystem.
//! [`ArchiveSweeper::shutdown`] stops the loop and interrupts a running
//! sweep between entries.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::DataLake;

/// Handle to a running periodic sweep.
#[derive(Debug)]
pub struct ArchiveSweeper {
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
    sweeps: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl ArchiveSweeper {
    /// Sweep with the lake's configured interval and age threshold.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(lake: Arc<DataLake>) -> Self {
        let interval = lake.sweep_interval();
        let max_age_days = lake.archive_after_days();
        Self::spawn(lake, interval, max_age_days)
    }

    /// Sweep every `interval`, archiving entries older than `max_age_days`.
    /// The first sweep runs immediately.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(lake: Arc<DataLake>, interval: Duration, max_age_days: u32) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let sweeps = Arc::new(AtomicU64::new(0));

        let task = tokio::spawn(run(
            lake,
            interval,
            max_age_days,
            Arc::clone(&stop),
            Arc::clone(&wake),
            Arc::clone(&sweeps),
        ));

        info!(
            "Archive sweeper started: every {}s, max age {} days",
            interval.as_secs_f64(),
            max_age_days
        );

        Self {
            stop,
            wake,
            sweeps,
            task,
        }
    }

    /// Number of sweeps finished so far (successful or not).
    #[must_use]
    pub fn sweeps_completed(&self) -> u64 {
        self.sweeps.load(Ordering::Acquire)
    }

    /// Check whether the loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the loop and wait for it. A sweep in progress stops before its
    /// next entry; moves already made are recorded.
    pub async fn shutdown(self) {
        self.stop.store(true, Ordering::Relaxed);
        self.wake.notify_one();
        if let Err(e) = self.task.await {
            warn!("Archive sweeper task failed: {e}");
        }
        info!("Archive sweeper stopped");
    }
}

async fn run(
    lake: Arc<DataLake>,
    interval: Duration,
    max_age_days: u32,
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
    sweeps: Arc<AtomicU64>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = wake.notified() => {}
        }
        if stop.load(Ordering::Relaxed) {
            break;
        }

        let sweep_lake = Arc::clone(&lake);
        let sweep_stop = Arc::clone(&stop);
        let outcome = tokio::task::spawn_blocking(move || {
            sweep_lake.sweep_until(max_age_days, &sweep_stop)
        })
        .await;

        match outcome {
            Ok(Ok(report)) if report.archived_count() > 0 || !report.failures.is_empty() => {
                info!(
                    "Archive sweep: {} archived, {} skipped",
                    report.archived_count(),
                    report.failures.len()
                );
            }
            Ok(Ok(_)) => debug!("Archive sweep: nothing to archive"),
            Ok(Err(e)) => warn!("Archive sweep failed: {e}"),
            Err(e) => warn!("Archive sweep task failed: {e}"),
        }
        sweeps.fetch_add(1, Ordering::Release);
    }
}
