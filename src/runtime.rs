//! Runtime ports (spec §6's external interfaces, expanded in SPEC_FULL §4.8):
//! the typed seams the core calls through instead of hard-coding a cluster
//! transport, plus `LocalPool`/`LocalTransport`, the in-process reference
//! implementations used by tests and single-machine runs.

use crate::config::RunnerConfig;
use crate::erased::Block;
use crate::partition::MemoryManager;
use crate::shuffle::{ScratchDir, ShuffleDescriptor, read_records};
use std::sync::Arc;

/// One worker's private resources: its memory manager and its shuffle
/// scratch directory (spec §3 "each worker exclusively owns its partitions'
/// in-memory buffers and its shuffle-output files").
pub struct WorkerSlot {
    pub memory: MemoryManager,
    pub scratch: ScratchDir,
}

/// A unit of work dispatched to a worker: given that worker's slot, produce
/// a result block or fail (spec §6 `runTask(task, callback)`).
pub type BoxedTask = Box<dyn FnOnce(&WorkerSlot) -> anyhow::Result<Block> + Send>;

/// A handle to an in-flight task's eventual result.
pub struct TaskHandle {
    rx: crossbeam_channel::Receiver<anyhow::Result<Block>>,
}

impl TaskHandle {
    /// Block until the task completes (spec §5 suspension point (a)).
    pub fn recv(self) -> anyhow::Result<Block> {
        self.rx
            .recv()
            .map_err(|_| anyhow::anyhow!("worker dropped task result channel"))?
    }
}

/// `runTask` (spec §6): dispatch one task to a worker and get back a handle
/// to its eventual result.
pub trait WorkerPool: Send + Sync {
    fn worker_count(&self) -> usize;

    /// `worker_hint` lets the dispatcher express a preferred worker (e.g. to
    /// honor a source partition's preferred-location hint, spec §4.7); a
    /// `LocalPool` simply maps it modulo its worker count.
    fn run_task(&self, worker_hint: usize, task: BoxedTask) -> TaskHandle;
}

/// `getReadStream` (spec §6): obtain the bytes of a shuffle file written by
/// any worker.
pub trait ShuffleTransport: Send + Sync {
    fn read(&self, descriptor: &ShuffleDescriptor) -> std::io::Result<Vec<Vec<u8>>>;
}

/// Single-process reference worker pool, backed by a `rayon::ThreadPool`
/// (spec.md's "multiple workers may execute in parallel", §5). Each
/// simulated worker owns one [`WorkerSlot`], named `worker-{n}` (SPEC_FULL
/// §4.8).
pub struct LocalPool {
    pool: rayon::ThreadPool,
    workers: Vec<Arc<WorkerSlot>>,
}

impl LocalPool {
    pub fn new(worker_count: usize, config: &RunnerConfig) -> anyhow::Result<Self> {
        let worker_count = worker_count.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .build()?;
        let workers = (0..worker_count)
            .map(|i| {
                Arc::new(WorkerSlot {
                    memory: MemoryManager::new(config.storage_memory_limit),
                    scratch: ScratchDir::new(
                        config.scratch_dir.join(format!("worker-{i}")),
                        format!("worker-{i}"),
                    ),
                })
            })
            .collect();
        Ok(Self { pool, workers })
    }

    /// Build a default-sized pool (`num_cpus::get()` workers) against the
    /// given config, mirroring how the teacher derives `default_partitions`
    /// from `num_cpus`.
    pub fn default_sized(config: &RunnerConfig) -> anyhow::Result<Self> {
        Self::new(config.worker_count.unwrap_or_else(num_cpus::get), config)
    }

    pub fn worker(&self, idx: usize) -> &Arc<WorkerSlot> {
        &self.workers[idx % self.workers.len()]
    }
}

impl WorkerPool for LocalPool {
    fn worker_count(&self) -> usize {
        self.workers.len()
    }

    fn run_task(&self, worker_hint: usize, task: BoxedTask) -> TaskHandle {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let worker = Arc::clone(self.worker(worker_hint));
        log::debug!("dispatching task to worker {}", worker.scratch.host());
        self.pool.spawn(move || {
            let result = task(&worker);
            if let Err(err) = &result {
                log::warn!("task on worker {} failed: {err}", worker.scratch.host());
            }
            let _ = tx.send(result);
        });
        TaskHandle { rx }
    }
}

/// Same-process shuffle transport: reads shuffle files directly off the
/// local filesystem. Stands in for the spec's remote `getReadStream` port
/// when every worker is simulated within one process (SPEC_FULL §4.8).
pub struct LocalTransport;

impl ShuffleTransport for LocalTransport {
    fn read(&self, descriptor: &ShuffleDescriptor) -> std::io::Result<Vec<Vec<u8>>> {
        read_records(descriptor)
    }
}
