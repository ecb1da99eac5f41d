//! The dataset graph registry (spec §3): a thread-safe store of dataset
//! nodes and their parent edges, equivalent in shape to the teacher's
//! `Pipeline`/`PipelineInner` but renamed `Context` to keep "pipeline"
//! free for this crate's per-task narrow-operator chain (spec §4.4).

use crate::dataset_id::DatasetId;
use crate::erased::BlockOps;
use crate::operator::Operator;
use crate::partition::Partition;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A dataset vertex as stored in the graph (spec §3's Dataset node).
///
/// Each node is kept behind its own `Arc` in the registry so that
/// `Context::partitions_of`/`partitioner_of` can release the registry's
/// coarse lock before running a `compute` closure that may itself walk back
/// into the graph (e.g. to read a parent's partition count) — otherwise a
/// compute closure recursing into the registry would deadlock on its own
/// `std::sync::Mutex`, which is not reentrant.
pub(crate) struct DatasetNode {
    pub parents: Vec<DatasetId>,
    pub operator: Operator,
    pub persistent: Mutex<bool>,
    /// Lazily materialized the first time `getPartitions` runs for this
    /// dataset; retained for the dataset's lifetime (spec §3 Lifecycles).
    pub partitions: Mutex<Option<Arc<Vec<Partition>>>>,
    /// Lazily computed partitioner for keyed (wide) results; `None` once
    /// computed means "this dataset carries no partitioner".
    pub partitioner: Mutex<Option<Option<Arc<dyn Any + Send + Sync>>>>,
    /// For wide datasets needing a range-partitioner sampling sub-job
    /// (spec §4.1), the closure that runs it exactly once before the map
    /// stage is dispatched (invoked by the stage planner, see `stage.rs`).
    pub range_init: Option<Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>>,
    /// Type-erased clone/size-estimation for this node's materialized
    /// `Block`, supplied by the caller at construction time since only it
    /// knows the concrete element type. Used by the persistence path
    /// (spec §4.2, §4.4); see [`crate::erased::BlockOps`].
    pub block_ops: Arc<dyn BlockOps>,
}

struct ContextInner {
    next_id: u64,
    nodes: HashMap<DatasetId, Arc<DatasetNode>>,
}

/// Thread-safe registry of dataset nodes, shared by every `Dataset<T>`
/// handle built against it.
///
/// Cheaply cloneable: clones share the same underlying graph, matching the
/// teacher's `Pipeline` (`Arc<Mutex<PipelineInner>>`).
pub struct Context {
    inner: Arc<Mutex<ContextInner>>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ContextInner {
                next_id: 0,
                nodes: HashMap::new(),
            })),
        }
    }
}

impl Clone for Context {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Context {
    /// Insert a new dataset node with the given parents and operator,
    /// returning its freshly assigned id. Ids are handed out in construction
    /// order (spec §3 invariant). `block_ops` is this dataset's type-erased
    /// clone/size-estimation vtable (spec §4.2, §4.4's persistence path),
    /// supplied by the caller since only it knows the concrete element type.
    pub(crate) fn insert_node(
        &self,
        parents: Vec<DatasetId>,
        operator: Operator,
        block_ops: Arc<dyn BlockOps>,
    ) -> DatasetId {
        self.insert_node_inner(parents, operator, block_ops, None)
    }

    /// Like [`Context::insert_node`], but registers a range-partitioner
    /// sampling sub-job to run once before this dataset's map stage is
    /// dispatched (spec §4.1's recursive init sub-job).
    pub(crate) fn insert_node_with_range_init(
        &self,
        parents: Vec<DatasetId>,
        operator: Operator,
        block_ops: Arc<dyn BlockOps>,
        range_init: Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>,
    ) -> DatasetId {
        self.insert_node_inner(parents, operator, block_ops, Some(range_init))
    }

    fn insert_node_inner(
        &self,
        parents: Vec<DatasetId>,
        operator: Operator,
        block_ops: Arc<dyn BlockOps>,
        range_init: Option<Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>>,
    ) -> DatasetId {
        let mut g = self.inner.lock().unwrap();
        let id = DatasetId::new(g.next_id);
        g.next_id += 1;
        g.nodes.insert(
            id,
            Arc::new(DatasetNode {
                parents,
                operator,
                persistent: Mutex::new(false),
                partitions: Mutex::new(None),
                partitioner: Mutex::new(None),
                range_init,
                block_ops,
            }),
        );
        id
    }

    /// Run this dataset's range-partitioner init sub-job if it has one and
    /// it hasn't run yet. No-op for datasets without one.
    pub(crate) fn ensure_range_init(&self, id: DatasetId) -> anyhow::Result<()> {
        if let Some(init) = self.node(id).range_init.clone() {
            init()?;
        }
        Ok(())
    }

    /// This dataset's type-erased clone/size-estimation vtable (spec §4.2,
    /// §4.4's persistence path).
    pub(crate) fn block_ops_of(&self, id: DatasetId) -> Arc<dyn BlockOps> {
        Arc::clone(&self.node(id).block_ops)
    }

    fn node(&self, id: DatasetId) -> Arc<DatasetNode> {
        self.inner
            .lock()
            .unwrap()
            .nodes
            .get(&id)
            .expect("dataset id must exist in its own context")
            .clone()
    }

    pub(crate) fn mark_persistent(&self, id: DatasetId) {
        *self.node(id).persistent.lock().unwrap() = true;
    }

    pub(crate) fn is_persistent(&self, id: DatasetId) -> bool {
        *self.node(id).persistent.lock().unwrap()
    }

    pub(crate) fn parents_of(&self, id: DatasetId) -> Vec<DatasetId> {
        self.node(id).parents.clone()
    }

    /// Clone out a dataset's operator payload.
    pub(crate) fn operator_of(&self, id: DatasetId) -> Operator {
        self.node(id).operator.clone()
    }

    /// Run `getPartitions` for `id` if it hasn't been computed yet, memoizing
    /// the result for the dataset's lifetime (spec §3 Lifecycles, §4.5 step 1).
    ///
    /// The registry lock is released before `compute` runs, so `compute` may
    /// freely call back into `self` (e.g. to realize a parent's partitions).
    pub(crate) fn partitions_of(
        &self,
        id: DatasetId,
        compute: impl FnOnce() -> Vec<Partition>,
    ) -> Arc<Vec<Partition>> {
        let node = self.node(id);
        let mut slot = node.partitions.lock().unwrap();
        if let Some(existing) = slot.as_ref() {
            return Arc::clone(existing);
        }
        let computed = Arc::new(compute());
        *slot = Some(Arc::clone(&computed));
        computed
    }

    pub(crate) fn partitioner_of(
        &self,
        id: DatasetId,
        compute: impl FnOnce() -> Option<Arc<dyn Any + Send + Sync>>,
    ) -> Option<Arc<dyn Any + Send + Sync>> {
        let node = self.node(id);
        let mut slot = node.partitioner.lock().unwrap();
        if let Some(existing) = slot.as_ref() {
            return existing.clone();
        }
        let computed = compute();
        *slot = Some(computed.clone());
        computed
    }

    /// All dataset ids currently registered, for DAG-walk/debugging helpers.
    pub(crate) fn all_ids(&self) -> Vec<DatasetId> {
        self.inner.lock().unwrap().nodes.keys().copied().collect()
    }
}

/// Number of partitions `id` resolves to, computing (and memoizing) them if
/// necessary by walking the operator's shape (spec §3 partition-count
/// invariants).
pub(crate) fn partition_count(context: &Context, id: DatasetId) -> usize {
    context
        .partitions_of(id, || build_partitions(context, id))
        .len()
}

/// The full per-partition metadata list for `id`, computing (and memoizing)
/// it if necessary. Used by the persistence-aware execution path to look up
/// the [`Partition`] handle backing a dispatched task (spec §4.2, §4.4).
pub(crate) fn partitions_for(context: &Context, id: DatasetId) -> Arc<Vec<Partition>> {
    context.partitions_of(id, || build_partitions(context, id))
}

fn build_partitions(context: &Context, id: DatasetId) -> Vec<Partition> {
    match context.operator_of(id) {
        Operator::Source { partition_hints, .. } => partition_hints
            .iter()
            .enumerate()
            .map(|(i, hint)| {
                let mut p = Partition::new(id, i);
                if let Some(loc) = &hint.preferred_location {
                    p = p.with_preferred_location(loc.clone());
                }
                if let Some(path) = &hint.path {
                    p = p.with_path(path.clone());
                }
                p
            })
            .collect(),
        Operator::Narrow(_) => {
            let parent = context.parents_of(id)[0];
            let n = partition_count(context, parent);
            (0..n).map(|i| Partition::new(id, i).with_parent_index(i)).collect()
        }
        Operator::Union => {
            let parents = context.parents_of(id);
            let n0 = partition_count(context, parents[0]);
            let n1 = partition_count(context, parents[1]);
            (0..n0 + n1).map(|i| Partition::new(id, i)).collect()
        }
        Operator::Wide(w) => (0..w.output_partitions).map(|i| Partition::new(id, i)).collect(),
    }
}
