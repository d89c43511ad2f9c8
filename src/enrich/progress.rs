//! Periodic progress snapshots for long enrichment runs.
//!
//! Counters are owned here and updated atomically by workers; a ticker
//! task logs a snapshot at a fixed interval. The ticker is best-effort
//! observability: it never blocks the pipeline, and a missed tick has
//! no effect on correctness.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tracing::info;

/// Poll granularity for the stop flag between snapshots.
const POLL: Duration = Duration::from_millis(200);

/// Shared counters for one enrichment run.
#[derive(Debug)]
pub struct ProgressReporter {
    completed: AtomicU64,
    tombstoned: AtomicU64,
    errored: AtomicU64,
    module_total: u64,
    version_total: u64,
}

impl ProgressReporter {
    /// Creates a reporter with the planned totals known up front.
    #[must_use]
    pub fn new(module_total: usize, version_total: usize) -> Self {
        Self {
            completed: AtomicU64::new(0),
            tombstoned: AtomicU64::new(0),
            errored: AtomicU64::new(0),
            module_total: module_total as u64,
            version_total: version_total as u64,
        }
    }

    /// Records one fully enriched item.
    pub fn add_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    /// Records `n` tombstoned items.
    pub fn add_tombstoned(&self, n: u64) {
        self.tombstoned.fetch_add(n, Ordering::SeqCst);
    }

    /// Records one failed item.
    pub fn add_errored(&self) {
        self.errored.fetch_add(1, Ordering::SeqCst);
    }

    /// Completed count so far.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Tombstoned count so far.
    #[must_use]
    pub fn tombstoned(&self) -> u64 {
        self.tombstoned.load(Ordering::SeqCst)
    }

    /// Errored count so far.
    #[must_use]
    pub fn errored(&self) -> u64 {
        self.errored.load(Ordering::SeqCst)
    }

    /// Logs one snapshot line.
    pub fn log_snapshot(&self) {
        info!(
            completed = self.completed(),
            tombstoned = self.tombstoned(),
            errored = self.errored(),
            modules = self.module_total,
            versions = self.version_total,
            "progress"
        );
    }

    /// Spawns the ticker task logging a snapshot every `interval`.
    ///
    /// Returns the task handle and a stop flag; the caller sets the flag
    /// and awaits the handle when the run finishes.
    #[must_use]
    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
    ) -> (tokio::task::JoinHandle<()>, Arc<AtomicBool>) {
        let stop = Arc::new(AtomicBool::new(false));
        let reporter = self;
        let stop_flag = Arc::clone(&stop);
        let handle = tokio::spawn(async move {
            let mut since_last = Duration::ZERO;
            loop {
                tokio::time::sleep(POLL).await;
                if stop_flag.load(Ordering::SeqCst) {
                    break;
                }
                since_last += POLL;
                if since_last >= interval {
                    since_last = Duration::ZERO;
                    reporter.log_snapshot();
                }
            }
        });
        (handle, stop)
    }
}
