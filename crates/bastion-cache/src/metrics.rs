//! Prometheus-style metrics for the cache layer.
//!
//! Recorded through the `metrics` facade; the embedding process installs the
//! exporter.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names.
pub mod names {
    /// Strategy lookups by outcome.
    pub const CACHE_REQUESTS_TOTAL: &str = "bastion_cache_requests_total";
    /// Loader calls made on behalf of a strategy.
    pub const STORE_LOADS_TOTAL: &str = "bastion_store_loads_total";

    /// Rebuild locks acquired.
    pub const LOCK_ACQUIRED_TOTAL: &str = "bastion_lock_acquired_total";
    /// Rebuild lock attempts that found the lock held.
    pub const LOCK_CONTENDED_TOTAL: &str = "bastion_lock_contended_total";

    /// Rebuilds accepted by the executor.
    pub const REBUILD_SUBMITTED_TOTAL: &str = "bastion_rebuild_submitted_total";
    /// Rebuilds finished successfully.
    pub const REBUILD_COMPLETED_TOTAL: &str = "bastion_rebuild_completed_total";
    /// Rebuilds that failed or panicked.
    pub const REBUILD_FAILED_TOTAL: &str = "bastion_rebuild_failed_total";
    /// Rebuilds refused because the queue was full or closed.
    pub const REBUILD_REJECTED_TOTAL: &str = "bastion_rebuild_rejected_total";
    /// Rebuild execution time in seconds.
    pub const REBUILD_DURATION_SECONDS: &str = "bastion_rebuild_duration_seconds";
    /// Rebuilds currently running.
    pub const REBUILD_ACTIVE: &str = "bastion_rebuild_active";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        names::CACHE_REQUESTS_TOTAL,
        "Cache lookups by strategy and outcome"
    );
    describe_counter!(
        names::STORE_LOADS_TOTAL,
        "Loads from the authoritative store by strategy"
    );
    describe_counter!(names::LOCK_ACQUIRED_TOTAL, "Rebuild locks acquired");
    describe_counter!(
        names::LOCK_CONTENDED_TOTAL,
        "Rebuild lock attempts that found the lock already held"
    );
    describe_counter!(
        names::REBUILD_SUBMITTED_TOTAL,
        "Rebuild tasks accepted by the executor"
    );
    describe_counter!(
        names::REBUILD_COMPLETED_TOTAL,
        "Rebuild tasks completed successfully"
    );
    describe_counter!(names::REBUILD_FAILED_TOTAL, "Rebuild tasks that failed");
    describe_counter!(
        names::REBUILD_REJECTED_TOTAL,
        "Rebuild tasks rejected because the queue was full or closed"
    );
    describe_histogram!(
        names::REBUILD_DURATION_SECONDS,
        "Rebuild task execution time in seconds"
    );
    describe_gauge!(names::REBUILD_ACTIVE, "Rebuild tasks currently running");
}

/// Lookup outcome label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Fresh value served from the cache.
    Hit,
    /// Empty marker served from the cache.
    Empty,
    /// Nothing cached.
    Miss,
    /// Logically expired value served while a rebuild runs.
    Stale,
}

impl Outcome {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Empty => "empty",
            Self::Miss => "miss",
            Self::Stale => "stale",
        }
    }
}

/// Strategy-side recorder.
#[derive(Clone)]
pub struct CacheMetrics;

impl CacheMetrics {
    /// Record a lookup outcome.
    pub fn lookup(strategy: &'static str, outcome: Outcome) {
        counter!(
            names::CACHE_REQUESTS_TOTAL,
            "strategy" => strategy,
            "outcome" => outcome.as_str()
        )
        .increment(1);
    }

    /// Record a loader call.
    pub fn store_load(strategy: &'static str) {
        counter!(names::STORE_LOADS_TOTAL, "strategy" => strategy).increment(1);
    }

    /// Record a lock attempt.
    pub fn lock_attempt(acquired: bool) {
        if acquired {
            counter!(names::LOCK_ACQUIRED_TOTAL).increment(1);
        } else {
            counter!(names::LOCK_CONTENDED_TOTAL).increment(1);
        }
    }
}

/// Executor-side recorder.
#[derive(Clone)]
pub struct RebuildMetrics;

impl RebuildMetrics {
    /// Record an accepted submission.
    pub fn submitted() {
        counter!(names::REBUILD_SUBMITTED_TOTAL).increment(1);
    }

    /// Record a refused submission.
    pub fn rejected(reason: &'static str) {
        counter!(names::REBUILD_REJECTED_TOTAL, "reason" => reason).increment(1);
    }

    /// Record a finished rebuild.
    pub fn finished(success: bool, duration: Duration) {
        let status = if success { "completed" } else { "failed" };
        if success {
            counter!(names::REBUILD_COMPLETED_TOTAL).increment(1);
        } else {
            counter!(names::REBUILD_FAILED_TOTAL).increment(1);
        }
        histogram!(names::REBUILD_DURATION_SECONDS, "status" => status)
            .record(duration.as_secs_f64());
    }

    /// Update the running-rebuild gauge.
    pub fn active(executor_id: &str, running: usize) {
        gauge!(names::REBUILD_ACTIVE, "executor_id" => executor_id.to_string())
            .set(gauge_value(running));
    }
}

/// Gauge value for a count, saturating at `u32::MAX`.
fn gauge_value(count: usize) -> f64 {
    f64::from(u32::try_from(count).unwrap_or(u32::MAX))
}
