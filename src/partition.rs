//! Partition metadata and the per-worker memory manager (spec §3, §4.2).

use crate::dataset_id::DatasetId;
use crate::erased::Block;
use std::sync::Mutex;

/// A unit of parallel work within one dataset.
///
/// Mirrors spec §3's Partition node: owning dataset id, index, an optional
/// parent-partition index (set for narrow 1:1 mappings), an optional
/// preferred-location hint (honored by the scheduler, not enforced here),
/// an optional backing path for file-rooted sources, and a data buffer that
/// is populated only when the owning dataset is persisted.
pub struct Partition {
    pub dataset: DatasetId,
    pub index: usize,
    pub parent_index: Option<usize>,
    pub preferred_location: Option<String>,
    pub path: Option<String>,
    buffer: Mutex<PartitionBuffer>,
}

#[derive(Default)]
enum PartitionBuffer {
    #[default]
    Empty,
    Populated(Block),
    Evicted,
}

impl Partition {
    pub fn new(dataset: DatasetId, index: usize) -> Self {
        Self {
            dataset,
            index,
            parent_index: None,
            preferred_location: None,
            path: None,
            buffer: Mutex::new(PartitionBuffer::Empty),
        }
    }

    pub fn with_parent_index(mut self, idx: usize) -> Self {
        self.parent_index = Some(idx);
        self
    }

    pub fn with_preferred_location(mut self, host: impl Into<String>) -> Self {
        self.preferred_location = Some(host.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// True once this partition's buffer has been evicted and must not be
    /// re-populated (eviction is monotonic per partition, spec §4.2).
    pub fn is_evicted(&self) -> bool {
        matches!(*self.buffer.lock().unwrap(), PartitionBuffer::Evicted)
    }

    /// The persisted buffer, if one is currently populated.
    pub fn buffered(&self) -> Option<()> {
        match *self.buffer.lock().unwrap() {
            PartitionBuffer::Populated(_) => Some(()),
            _ => None,
        }
    }

    /// Clone out the buffered block via `ops`, if one is currently
    /// populated. Used by the pipeline executor to replay a persisted
    /// partition without recomputing from parents (spec §4.4).
    pub(crate) fn get_buffer(&self, ops: &dyn crate::erased::BlockOps) -> Option<Block> {
        let guard = self.buffer.lock().unwrap();
        match &*guard {
            PartitionBuffer::Populated(b) => ops.clone_block(b),
            _ => None,
        }
    }

    pub(crate) fn set_buffer(&self, block: Block) {
        let mut guard = self.buffer.lock().unwrap();
        if !matches!(*guard, PartitionBuffer::Evicted) {
            *guard = PartitionBuffer::Populated(block);
        }
    }

    pub(crate) fn evict(&self) {
        *self.buffer.lock().unwrap() = PartitionBuffer::Evicted;
    }
}

/// Size-sampling cadence: every this many buffered elements, the manager
/// takes a fresh size sample of the most recent batch (spec §4.2).
pub const SAMPLE_EVERY: u64 = 10_000;

/// Tracks one worker's `storageMemory` counter and evicts persisted
/// partitions when it would exceed the configured ceiling.
///
/// Eviction is monotonic per partition: once a partition has been evicted,
/// [`MemoryManager::record_batch`] stops accounting for it and its buffer is
/// never repopulated within the same job (spec §4.2).
pub struct MemoryManager {
    ceiling_bytes: u64,
    state: Mutex<MemoryState>,
}

struct MemoryState {
    storage_memory: u64,
    per_partition: std::collections::HashMap<(DatasetId, usize), PartitionAccounting>,
}

struct PartitionAccounting {
    elements_seen: u64,
    estimated_bytes: u64,
    evicted: bool,
}

impl MemoryManager {
    pub fn new(ceiling_bytes: u64) -> Self {
        Self {
            ceiling_bytes,
            state: Mutex::new(MemoryState {
                storage_memory: 0,
                per_partition: std::collections::HashMap::new(),
            }),
        }
    }

    pub fn storage_memory(&self) -> u64 {
        self.state.lock().unwrap().storage_memory
    }

    /// Record that `count` elements were just appended to `(dataset, partition)`'s
    /// buffer, estimated to cost `recent_batch_bytes` in total for this batch.
    ///
    /// Returns `true` if the partition should continue persisting, `false` if
    /// it was just evicted (ceiling exceeded) and the caller must drop its
    /// buffer and fall back to recomputing from parents from now on.
    pub fn record_batch(
        &self,
        dataset: DatasetId,
        partition: usize,
        count: u64,
        recent_batch_bytes: u64,
    ) -> bool {
        let key = (dataset, partition);
        let mut state = self.state.lock().unwrap();

        if state
            .per_partition
            .get(&key)
            .is_some_and(|p| p.evicted)
        {
            return false;
        }

        let entry = state
            .per_partition
            .entry(key)
            .or_insert_with(|| PartitionAccounting {
                elements_seen: 0,
                estimated_bytes: 0,
                evicted: false,
            });

        let before = entry.elements_seen;
        entry.elements_seen += count;

        // Sample at every SAMPLE_EVERY-element boundary crossed by this batch.
        let crossed = entry.elements_seen / SAMPLE_EVERY > before / SAMPLE_EVERY;
        if !crossed {
            return true;
        }

        entry.estimated_bytes += recent_batch_bytes;
        state.storage_memory += recent_batch_bytes;

        if state.storage_memory > self.ceiling_bytes {
            let entry = state.per_partition.get_mut(&key).unwrap();
            entry.evicted = true;
            state.storage_memory = state.storage_memory.saturating_sub(entry.estimated_bytes);
            log::warn!(
                "evicting partition {partition} of dataset {dataset}: storage memory ceiling \
                 ({} bytes) exceeded",
                self.ceiling_bytes
            );
            false
        } else {
            true
        }
    }

    pub fn is_evicted(&self, dataset: DatasetId, partition: usize) -> bool {
        self.state
            .lock()
            .unwrap()
            .per_partition
            .get(&(dataset, partition))
            .is_some_and(|p| p.evicted)
    }
}
