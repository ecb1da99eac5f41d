//! The operator catalog (spec §4.3): the tagged node payload that hangs off
//! every dataset in a [`Context`](crate::graph::Context).
//!
//! Narrow operators ([`NarrowOp`]) are fused into a single per-element chain
//! by the [pipeline executor](crate::pipeline_exec); wide operators own both
//! a map-side bucketing step and a reduce-side per-output-partition step,
//! unified here as [`WideOp`] so `AggregateByKey`, `SortBy`, `PartitionBy`,
//! and `Cartesian` all run through the same shuffle machinery (§4.3, §4.6).

use crate::erased::{Block, TypeTag, VecOps};
use std::any::Any;
use std::sync::Arc;

/// A stateless, per-partition transform participating in pipeline fusion.
///
/// Mirrors the teacher's `DynOp`: implementors receive one partition's worth
/// of data and return the transformed partition. The capability flags let
/// the stage planner reason about reordering, though this crate's planner
/// only relies on `apply` for correctness — the flags are informational,
/// matching the teacher's own usage.
pub trait NarrowOp: Send + Sync {
    /// Apply this operator to one partition's data.
    fn apply(&self, input: Block) -> Block;

    /// True if `(K, V)` keys pass through unchanged.
    fn key_preserving(&self) -> bool {
        false
    }

    /// True if only the value half of `(K, V)` rows is touched.
    fn value_only(&self) -> bool {
        false
    }

    /// True if safely reorderable with other `value_only` ops.
    fn reorder_safe_with_value_only(&self) -> bool {
        false
    }

    /// Heuristic cost, smaller runs earlier when reordering is considered.
    fn cost_hint(&self) -> u8 {
        10
    }
}

/// A single shuffle record pulled off the reduce side of a bucket.
pub type RawRecord = Vec<u8>;

/// The shuffle-bearing half of the operator catalog (spec §4.3's wide
/// transforms), generalized so `AggregateByKey`/`SortBy`/`PartitionBy`/
/// `Cartesian` share one shuffle-write/shuffle-read machinery.
///
/// `map_side` runs once per upstream (parent, source-partition) pair and
/// returns `(bucket_id, serialized_record)` pairs to spill. `reduce_side`
/// runs once per output partition and is handed a reader that, given a
/// bucket id, yields every raw record ever written to it; it returns the
/// materialized output `Block` for that output partition.
///
/// Cartesian's "one file per source partition" quirk (§4.3) is expressed by
/// giving it `bucket_count = left_partitions + right_partitions`: map-side
/// records from left partition `i` land in bucket `i`, and from right
/// partition `j` land in bucket `left_partitions + j`; its `reduce_side`
/// computes `p1 = p / right_partitions` and `p2 = (p % right_partitions) +
/// left_partitions` to find which two buckets to pair (spec §4.3).
pub struct WideOp {
    pub name: &'static str,
    /// Number of shuffle buckets the map side writes into. Equal to
    /// `output_partitions` for every wide op except `Cartesian`, whose
    /// bucket space is `left_partitions + right_partitions` (spec §4.3).
    pub bucket_count: usize,
    /// Number of partitions this dataset itself exposes downstream.
    pub output_partitions: usize,
    /// Returns `Err` on a (de)serialization failure, which is fatal to the
    /// job (spec §4.6, §7) rather than a worker-thread panic.
    pub map_side: Arc<dyn Fn(Block, usize, usize) -> anyhow::Result<Vec<(usize, RawRecord)>> + Send + Sync>,
    /// Returns `Err` on a (de)serialization failure, for the same reason as
    /// `map_side`.
    pub reduce_side:
        Arc<dyn Fn(usize, &dyn Fn(usize) -> Vec<RawRecord>) -> anyhow::Result<Block> + Send + Sync>,
}

impl Clone for WideOp {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            bucket_count: self.bucket_count,
            output_partitions: self.output_partitions,
            map_side: Arc::clone(&self.map_side),
            reduce_side: Arc::clone(&self.reduce_side),
        }
    }
}

/// The payload hung off a dataset node (spec §3's "operator payload").
#[derive(Clone)]
pub enum Operator {
    /// A source with no parents: an in-memory payload plus the type-erased
    /// ops needed to split it into partitions (spec §4.3, §4.7).
    Source {
        payload: Arc<dyn Any + Send + Sync>,
        vec_ops: Arc<dyn VecOps>,
        elem_tag: TypeTag,
        /// Precomputed partition count and, for file sources, preferred
        /// locations / paths (spec §4.7). `None` entries mean "no hint".
        partition_hints: Arc<Vec<PartitionHint>>,
    },

    /// A fused chain of narrow operators (spec §4.3, §4.4): exactly one
    /// parent, same partition count as that parent.
    Narrow(Vec<Arc<dyn NarrowOp>>),

    /// Identity transform over two parents: partition count is the sum of
    /// both parents', partition `i` proxies `parent0[i]` or `parent1[i -
    /// |parent0|]` (spec §4.3).
    Union,

    /// A shuffle-bounded operator (spec §4.3's AggregateByKey / SortBy /
    /// PartitionBy / Cartesian family).
    Wide(WideOp),
}

/// Per-partition placement metadata attached to a source (spec §4.7).
#[derive(Clone, Debug, Default)]
pub struct PartitionHint {
    pub preferred_location: Option<String>,
    pub path: Option<String>,
}
