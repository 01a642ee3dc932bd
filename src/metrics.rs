// Sync metrics module
//
// Provides lightweight counters for the sync operations run by this process

use crate::services::copy::CopyStats;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Process-wide sync metrics
///
/// Uses atomic operations for thread-safe tracking without locks, so the
/// orchestrator can record from blocking tasks. Logged on shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Pulls that completed (including no-op pulls)
    pub pulls: AtomicUsize,

    /// Pushes that sent a commit to the remote
    pub pushes: AtomicUsize,

    /// Pushes that found nothing to commit
    pub nothing_to_push: AtomicUsize,

    /// Pulls that stopped on a merge conflict
    pub conflicts: AtomicUsize,

    /// Operations that failed with an error other than a conflict
    pub failures: AtomicUsize,

    /// Files copied or updated by the copy engine
    pub files_written: AtomicU64,

    /// Files and directories removed by the copy engine
    pub entries_deleted: AtomicU64,

    /// Files compared and left untouched
    pub files_unchanged: AtomicU64,

    /// Total time spent in sync operations in milliseconds
    pub total_sync_time_ms: AtomicU64,

    /// Process start time
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            pulls: AtomicUsize::new(0),
            pushes: AtomicUsize::new(0),
            nothing_to_push: AtomicUsize::new(0),
            conflicts: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            files_written: AtomicU64::new(0),
            entries_deleted: AtomicU64::new(0),
            files_unchanged: AtomicU64::new(0),
            total_sync_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_pull(&self) {
        self.pulls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_push(&self) {
        self.pushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_nothing_to_push(&self) {
        self.nothing_to_push.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Add the counters of one copy pass
    pub fn record_copy(&self, stats: &CopyStats) {
        self.files_written.fetch_add(
            (stats.files_copied + stats.files_updated) as u64,
            Ordering::Relaxed,
        );
        self.entries_deleted.fetch_add(
            (stats.files_deleted + stats.dirs_removed) as u64,
            Ordering::Relaxed,
        );
        self.files_unchanged
            .fetch_add(stats.files_unchanged as u64, Ordering::Relaxed);
    }

    pub fn record_sync_time(&self, duration: Duration) {
        self.total_sync_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Sync Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Pulls: {}, pushes: {} ({} with nothing to push), conflicts: {}, failures: {}",
            self.pulls.load(Ordering::Relaxed),
            self.pushes.load(Ordering::Relaxed),
            self.nothing_to_push.load(Ordering::Relaxed),
            self.conflicts.load(Ordering::Relaxed),
            self.failures.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Files: {} written, {} unchanged, {} entries deleted",
            self.files_written.load(Ordering::Relaxed),
            self.files_unchanged.load(Ordering::Relaxed),
            self.entries_deleted.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Total sync time: {:.2}s",
            self.total_sync_time_ms.load(Ordering::Relaxed) as f64 / 1000.0
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
