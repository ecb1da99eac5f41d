//! Opt-in job metrics (SPEC_FULL §2, §4.10), gated behind the `metrics`
//! feature. Tracks the counters a real deployment would want to export:
//! tasks dispatched/completed, bytes shuffled, and partition evictions.

use std::sync::atomic::{AtomicU64, Ordering};

/// A thread-safe collector, shared by every worker slot and the driver
/// during one job run.
#[derive(Default)]
pub struct MetricsCollector {
    tasks_dispatched: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    bytes_shuffled: AtomicU64,
    partitions_evicted: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_dispatched(&self) {
        self.tasks_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_completed(&self) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn shuffle_bytes_written(&self, n: u64) {
        self.bytes_shuffled.fetch_add(n, Ordering::Relaxed);
    }

    pub fn partition_evicted(&self) {
        self.partitions_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_dispatched: self.tasks_dispatched.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            bytes_shuffled: self.bytes_shuffled.load(Ordering::Relaxed),
            partitions_evicted: self.partitions_evicted.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time read of a [`MetricsCollector`]'s counters.
#[derive(Clone, Copy, Debug, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    pub tasks_dispatched: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub bytes_shuffled: u64,
    pub partitions_evicted: u64,
}
