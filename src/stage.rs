//! Stage planner (spec §4.5): cuts the dataset DAG at shuffle boundaries
//! into map stages (one per upstream dependency of each wide dataset) and
//! supplies the boundary-materialization used by both map stages and the
//! final result stage in `driver::run_job`.

use crate::dataset_id::DatasetId;
use crate::erased::Block;
use crate::graph::{Context, partition_count, partitions_for};
use crate::operator::Operator;
use crate::pipeline_exec::{linearize, run_chain, run_chain_persisting};
use crate::runtime::{ShuffleTransport, WorkerPool};
use crate::shuffle::{ShuffleRegistry, ShuffleWriter};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Every wide dataset upstream of `tail` (inclusive, if `tail` itself is
/// wide), ordered so a wide dataset's own wide ancestors always precede it.
///
/// This is the order map stages must run in: by the time `W`'s map stage
/// dispatches, every wide dataset it (transitively) reads through has
/// already finished writing its buckets, so `materialize_boundary`'s `Wide`
/// branch can read them synchronously.
pub fn wide_datasets_topo(context: &Context, tail: DatasetId) -> Vec<DatasetId> {
    let mut order = Vec::new();
    let mut seen = HashSet::new();
    visit(context, tail, &mut seen, &mut order);
    order
}

fn visit(context: &Context, id: DatasetId, seen: &mut HashSet<DatasetId>, order: &mut Vec<DatasetId>) {
    if !seen.insert(id) {
        return;
    }
    for parent in context.parents_of(id) {
        visit(context, parent, seen, order);
    }
    if matches!(context.operator_of(id), Operator::Wide(_)) {
        order.push(id);
    }
}

/// Resolve one partition's data for a dataset acting as a pipeline boundary
/// (a `Source`, `Union`, or `Wide` dataset — never `Narrow`, which
/// `linearize` always walks through).
pub fn materialize_boundary(
    context: &Context,
    registry: &ShuffleRegistry,
    transport: &dyn ShuffleTransport,
    boundary: DatasetId,
    partition_index: usize,
) -> anyhow::Result<Block> {
    match context.operator_of(boundary) {
        Operator::Source {
            payload,
            vec_ops,
            partition_hints,
            ..
        } => {
            let parts = vec_ops
                .split(payload.as_ref(), partition_hints.len().max(1))
                .ok_or_else(|| anyhow::anyhow!("source payload type mismatch for dataset {boundary}"))?;
            parts
                .into_iter()
                .nth(partition_index)
                .ok_or_else(|| anyhow::anyhow!("partition {partition_index} out of range for source {boundary}"))
        }
        Operator::Union => {
            let parents = context.parents_of(boundary);
            let n0 = partition_count(context, parents[0]);
            let (parent, local_index) = if partition_index < n0 {
                (parents[0], partition_index)
            } else {
                (parents[1], partition_index - n0)
            };
            let chain = linearize(context, parent);
            let input = materialize_boundary(context, registry, transport, chain.boundary, local_index)?;
            Ok(run_chain(&chain, input))
        }
        Operator::Wide(w) => {
            let read_fn = |bucket: usize| -> Vec<Vec<u8>> {
                registry
                    .descriptors_for(boundary, bucket)
                    .iter()
                    .flat_map(|d| transport.read(d).unwrap_or_default())
                    .collect()
            };
            (w.reduce_side)(partition_index, &read_fn)
        }
        Operator::Narrow(_) => unreachable!("linearize always stops at a non-narrow boundary"),
    }
}

/// Run the full map stage for wide dataset `wide_id`: one task per
/// (dependency, upstream source partition) pair, dispatched through `pool`
/// and writing shuffle buckets into `registry` (spec §4.5 step 2, §4.6).
///
/// Must be called with `wide_id`'s wide ancestors already fully staged (see
/// [`wide_datasets_topo`]); runs the dataset's range-partitioner init sub-job
/// first, if it has one (spec §4.1).
pub fn run_map_stage(
    context: &Context,
    pool: &dyn WorkerPool,
    transport: Arc<dyn ShuffleTransport>,
    registry: Arc<ShuffleRegistry>,
    wide_id: DatasetId,
) -> anyhow::Result<()> {
    context.ensure_range_init(wide_id)?;

    let wide = match context.operator_of(wide_id) {
        Operator::Wide(w) => w,
        _ => anyhow::bail!("dataset {wide_id} is not a wide dataset"),
    };
    let parents = context.parents_of(wide_id);

    let mut handles = Vec::new();
    for (parent_idx, parent) in parents.iter().enumerate() {
        let source_partitions = partition_count(context, *parent);
        let chain = linearize(context, *parent);
        let parent_partitions = partitions_for(context, *parent);
        let parent_id = *parent;

        for source_partition in 0..source_partitions {
            let chain_for_task = chain.clone();
            let boundary = chain.boundary;
            let wide = wide.clone();
            let context = context.clone();
            let transport = Arc::clone(&transport);
            let registry = Arc::clone(&registry);
            let parent_partitions = Arc::clone(&parent_partitions);

            let handle = pool.run_task(
                source_partition,
                Box::new(move |slot| {
                    let input =
                        materialize_boundary(&context, registry.as_ref(), transport.as_ref(), boundary, source_partition)?;
                    let block = run_chain_persisting(
                        &context,
                        &chain_for_task,
                        parent_id,
                        &parent_partitions[source_partition],
                        &slot.memory,
                        input,
                    );
                    let pairs = (wide.map_side)(block, parent_idx, source_partition)?;

                    let mut by_bucket: HashMap<usize, Vec<Vec<u8>>> = HashMap::new();
                    for (bucket, record) in pairs {
                        by_bucket.entry(bucket).or_default().push(record);
                    }

                    for (bucket, records) in by_bucket {
                        let path = slot.scratch.new_shuffle_file_path();
                        let mut writer = ShuffleWriter::create(&path)?;
                        for record in &records {
                            writer.write_record(record)?;
                        }
                        let descriptor = writer.finish(slot.scratch.host().to_string())?;
                        registry.register(wide_id, wide.bucket_count, bucket, descriptor);
                    }

                    Ok(Box::new(()) as Block)
                }),
            );
            handles.push(handle);
        }
    }

    for handle in handles {
        handle.recv()?;
    }
    Ok(())
}
