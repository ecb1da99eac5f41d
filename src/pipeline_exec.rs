//! The fused per-partition pipeline executor (spec §4.4): for a narrow
//! tail, builds the ordered chain of narrow transforms from the last
//! shuffle boundary (or source) up to the action, and applies them without
//! materializing intermediate batches.

use crate::dataset_id::DatasetId;
use crate::erased::Block;
use crate::graph::Context;
use crate::operator::{NarrowOp, Operator};
use crate::partition::{MemoryManager, Partition};
use std::sync::Arc;

/// A linearized narrow chain: every op from `boundary` (exclusive) to the
/// dataset the chain was built for, in application order.
#[derive(Clone)]
pub struct PipelineChain {
    pub boundary: DatasetId,
    pub ops: Vec<Arc<dyn NarrowOp>>,
}

/// Walk backward from `tail` through `Operator::Narrow` nodes, concatenating
/// their operator lists, until hitting a non-narrow boundary (a `Source`,
/// `Union`, or `Wide` dataset). This is the "fused loop" construction named
/// in spec §4.4 — no intermediate partition is materialized between narrow
/// transforms within the chain.
pub fn linearize(context: &Context, tail: DatasetId) -> PipelineChain {
    match context.operator_of(tail) {
        Operator::Narrow(ops_here) => {
            let parent = context.parents_of(tail)[0];
            let mut chain = linearize(context, parent);
            chain.ops.extend(ops_here);
            chain
        }
        _ => PipelineChain {
            boundary: tail,
            ops: Vec::new(),
        },
    }
}

/// Apply every op in `chain` to `block` in order.
pub fn run_chain(chain: &PipelineChain, mut block: Block) -> Block {
    for op in &chain.ops {
        block = op.apply(block);
    }
    block
}

/// Run `chain` over `block`, honoring persistence for `tail` (spec §4.4's
/// persistence transform, spec §4.2's eviction).
///
/// If `tail` is persistent and partition `partition_index` already has a
/// buffered value, that buffer is replayed directly (no recomputation).
/// Otherwise the chain runs fresh; if `tail` is persistent and the partition
/// has not been evicted, the result is copied into the partition's buffer
/// (subject to the memory manager's eviction check) before being returned.
///
/// Type-erased via `tail`'s registered `BlockOps` rather than a generic
/// parameter, since the stage planner's map-stage dispatch (`stage.rs`) has
/// no concrete element type for an arbitrary upstream chain's tail.
pub fn run_chain_persisting(
    context: &Context,
    chain: &PipelineChain,
    tail: DatasetId,
    partition: &Partition,
    memory: &MemoryManager,
    block: Block,
) -> Block {
    let block_ops = context.block_ops_of(tail);

    if context.is_persistent(tail) {
        if let Some(buffered) = partition.get_buffer(block_ops.as_ref()) {
            return buffered;
        }
    }

    let out = run_chain(chain, block);

    if context.is_persistent(tail) && !partition.is_evicted() {
        if let Some((count, estimated_bytes)) = block_ops.size_hint(&out) {
            let keep = memory.record_batch(tail, partition.index, count, estimated_bytes);
            if keep {
                if let Some(copy) = block_ops.clone_block(&out) {
                    partition.set_buffer(copy);
                }
            } else {
                partition.evict();
                log::warn!(
                    "dataset {tail} partition {} evicted during pipeline execution",
                    partition.index
                );
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::from_vec;

    #[test]
    fn linearize_concatenates_chained_narrow_ops() {
        let context = Context::default();
        let src = from_vec(&context, vec![1, 2, 3], 1);
        let doubled = src.map(|x: &i32| x * 2);
        let filtered = doubled.filter(|x: &i32| *x > 2);

        let chain = linearize(&context, filtered.id());
        assert_eq!(chain.boundary, src.id());
        assert_eq!(chain.ops.len(), 2);
    }

    #[test]
    fn run_chain_applies_ops_in_order() {
        let context = Context::default();
        let src = from_vec(&context, vec![1, 2, 3], 1);
        let doubled = src.map(|x: &i32| x * 2);
        let filtered = doubled.filter(|x: &i32| *x > 2);

        let chain = linearize(&context, filtered.id());
        let out = run_chain(&chain, Box::new(vec![1, 2, 3]));
        let out = out.downcast::<Vec<i32>>().unwrap();
        assert_eq!(*out, vec![4, 6]);
    }
}
