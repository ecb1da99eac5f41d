//! Ambient runner configuration (SPEC_FULL §4.9), in the shape of the
//! teacher's `Runner { mode, default_partitions, .. }` builder struct.

use std::path::PathBuf;

/// Job-wide tunables: worker count, dispatch window default, memory
/// ceiling, shuffle scratch location, and flush cadence.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// `None` means "derive from `num_cpus::get()`" (SPEC_FULL §4.9).
    pub worker_count: Option<usize>,
    /// Default `maxBusy` for actions that don't override it (spec §4.5).
    pub max_busy: Option<usize>,
    /// `storageMemory` ceiling per worker, in bytes (spec §4.2).
    pub storage_memory_limit: u64,
    /// Root directory for shuffle scratch files.
    pub scratch_dir: PathBuf,
    /// Shuffle writer flush threshold, in bytes (spec §4.6).
    pub shuffle_flush_bytes: usize,
    /// Number of buffered elements between memory-manager size samples
    /// (spec §4.2).
    pub sample_every: u64,
    /// Bounded task-retry override at the dispatch layer (spec §7, §9 open
    /// question) — `0` disables retry, matching the conservative default
    /// recorded in DESIGN.md.
    pub task_retry_limit: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            max_busy: None,
            storage_memory_limit: 512 * 1024 * 1024,
            scratch_dir: std::env::temp_dir().join("shardflow-shuffle"),
            shuffle_flush_bytes: crate::shuffle::FLUSH_BYTES,
            sample_every: crate::partition::SAMPLE_EVERY,
            task_retry_limit: 0,
        }
    }
}

impl RunnerConfig {
    pub fn with_worker_count(mut self, n: usize) -> Self {
        self.worker_count = Some(n);
        self
    }

    pub fn with_max_busy(mut self, n: usize) -> Self {
        self.max_busy = Some(n);
        self
    }

    pub fn with_storage_memory_limit(mut self, bytes: u64) -> Self {
        self.storage_memory_limit = bytes;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn with_task_retry_limit(mut self, n: u32) -> Self {
        self.task_retry_limit = n;
        self
    }
}
