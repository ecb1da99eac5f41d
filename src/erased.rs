//! Type-erased payload helpers.
//!
//! The engine materializes intermediate per-partition data as opaque `Block`
//! values (a boxed `Any`). Operators downcast these to the expected concrete
//! type (`Vec<T>`, `HashMap<K, A>`, ...) when applying their work, exactly as
//! the source payload on a [`Source`](crate::operator::Operator::Source) node is
//! downcast via [`VecOps`].

use std::any::{Any, TypeId, type_name};
use std::marker::PhantomData;
use std::sync::Arc;

/// An in-flight per-partition buffer carried between operators at runtime.
pub type Block = Box<dyn Any + Send + Sync>;

/// A lightweight runtime type tag, attached to `Source` nodes so the planner
/// can assert element types across dataset boundaries without a generic
/// parameter on the graph itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeTag {
    /// Stable Rust type identifier.
    pub id: TypeId,
    /// Human-readable type name (best-effort, for diagnostics).
    pub name: &'static str,
}

impl TypeTag {
    /// Construct a tag for `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }
}

/// Type-erased helpers for a source's backing `Vec<T>`-shaped payload.
///
/// The planner uses `VecOps` to compute a source's logical length (used for
/// partition-count defaults and range-partitioner sampling) and to split it
/// into `n` partitions the first time `getPartitions` runs for the dataset.
pub trait VecOps: Send + Sync {
    /// Number of elements in `data`, or `None` if the dynamic type mismatches.
    fn len(&self, data: &dyn Any) -> Option<usize>;

    /// Split `data` into up to `n` contiguous partitions, preserving order
    /// within each chunk.
    fn split(&self, data: &dyn Any, n: usize) -> Option<Vec<Block>>;
}

struct VecOpsImpl<T>(PhantomData<T>);

impl<T: Clone + Send + Sync + 'static> VecOps for VecOpsImpl<T> {
    fn len(&self, data: &dyn Any) -> Option<usize> {
        data.downcast_ref::<Vec<T>>().map(Vec::len)
    }

    fn split(&self, data: &dyn Any, n: usize) -> Option<Vec<Block>> {
        let v = data.downcast_ref::<Vec<T>>()?;
        let len = v.len();
        if n <= 1 || len <= 1 {
            return Some(vec![Box::new(v.clone()) as Block]);
        }
        let chunk = len.div_ceil(n);
        Some(
            v.chunks(chunk)
                .map(|c| Box::new(c.to_vec()) as Block)
                .collect(),
        )
    }
}

/// Create a type-erased [`VecOps`] for `Vec<T>`.
pub fn vec_ops_for<T: Clone + Send + Sync + 'static>() -> Arc<dyn VecOps> {
    Arc::new(VecOpsImpl::<T>(PhantomData))
}

/// Type-erased cloning and size-estimation for a dataset node's per-partition
/// payload, attached to every node at construction time (not just `Source`
/// nodes) so the persistence path (spec §4.2, §4.4) can buffer and evict a
/// materialized `Block` without the executor itself knowing the dataset's
/// concrete element type.
pub trait BlockOps: Send + Sync {
    /// Clone `block` into a fresh owned `Block`, or `None` if the dynamic
    /// type doesn't match.
    fn clone_block(&self, block: &Block) -> Option<Block>;

    /// Element count and an estimated total byte size for `block`, feeding
    /// the memory manager's sampling cadence (spec §4.2).
    fn size_hint(&self, block: &Block) -> Option<(u64, u64)>;
}

struct BlockOpsImpl<T>(PhantomData<T>);

impl<T: Clone + Send + Sync + 'static> BlockOps for BlockOpsImpl<T> {
    fn clone_block(&self, block: &Block) -> Option<Block> {
        block.downcast_ref::<Vec<T>>().map(|v| Box::new(v.clone()) as Block)
    }

    fn size_hint(&self, block: &Block) -> Option<(u64, u64)> {
        block
            .downcast_ref::<Vec<T>>()
            .map(|v| (v.len() as u64, (v.len() * std::mem::size_of::<T>()) as u64))
    }
}

/// Create a type-erased [`BlockOps`] for `Vec<T>`.
pub fn block_ops_for<T: Clone + Send + Sync + 'static>() -> Arc<dyn BlockOps> {
    Arc::new(BlockOpsImpl::<T>(PhantomData))
}
