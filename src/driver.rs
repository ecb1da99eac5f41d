//! The action driver (spec §4.5 steps 3-5): dispatches the result-stage
//! tasks for one job, honoring `maxBusy`/`_lifo`/`_max`, and folds the
//! per-partition partial results in partition (or reverse-partition, under
//! `_lifo`) order.

use crate::actions::RunOptions;
use crate::dataset::RFBound;
use crate::dataset_id::DatasetId;
use crate::graph::{Context, partition_count, partitions_for};
use crate::pipeline_exec::{linearize, run_chain_persisting};
use crate::runtime::{LocalPool, LocalTransport, ShuffleTransport, WorkerPool};
use crate::shuffle::ShuffleRegistry;
use crate::stage;
use std::collections::VecDeque;
use std::sync::Arc;

/// Run `tail`'s job to completion against `pool`/`transport`/`registry`,
/// folding each result-stage partition's output through `combine` in
/// dispatch order (spec §4.5 step 5; see DESIGN.md for the `_lifo`
/// resolution of "partition order").
///
/// Runs every upstream wide dataset's map stage first, in dependency order
/// (spec §4.5 step 2), then dispatches the result stage itself.
pub fn run_job<T, R>(
    context: &Context,
    pool: &dyn WorkerPool,
    transport: Arc<dyn ShuffleTransport>,
    registry: Arc<ShuffleRegistry>,
    tail: DatasetId,
    opt: &RunOptions,
    init: R,
    mut combine: impl FnMut(R, Vec<T>) -> R,
) -> anyhow::Result<R>
where
    T: RFBound,
{
    for wide in stage::wide_datasets_topo(context, tail) {
        stage::run_map_stage(context, pool, Arc::clone(&transport), Arc::clone(&registry), wide)?;
    }

    let chain = linearize(context, tail);
    let n = partition_count(context, tail);
    let order: Vec<usize> = if opt.lifo {
        (0..n).rev().collect()
    } else {
        (0..n).collect()
    };
    let max_busy = opt.max_busy.unwrap_or_else(|| pool.worker_count().max(1)).max(1);
    let partitions = partitions_for(context, tail);

    let dispatch = |pid: usize| {
        let boundary = chain.boundary;
        let chain_for_task = chain.clone();
        let context = context.clone();
        let transport = Arc::clone(&transport);
        let registry = Arc::clone(&registry);
        let partitions = Arc::clone(&partitions);
        pool.run_task(
            pid,
            Box::new(move |slot| {
                let input = stage::materialize_boundary(&context, registry.as_ref(), transport.as_ref(), boundary, pid)?;
                Ok(run_chain_persisting(
                    &context,
                    &chain_for_task,
                    tail,
                    &partitions[pid],
                    &slot.memory,
                    input,
                ))
            }),
        )
    };

    let mut tmp: Vec<Option<Vec<T>>> = (0..n).map(|_| None).collect();
    let mut in_flight: VecDeque<(usize, crate::runtime::TaskHandle)> = VecDeque::new();
    let mut next = 0usize;
    let mut total_elems = 0usize;
    let mut stopped = false;

    while next < order.len() && in_flight.len() < max_busy {
        let pid = order[next];
        in_flight.push_back((pid, dispatch(pid)));
        next += 1;
    }

    while let Some((pid, handle)) = in_flight.pop_front() {
        let block = handle.recv()?;
        let items = *block
            .downcast::<Vec<T>>()
            .map_err(|_| anyhow::anyhow!("result stage for dataset {tail} produced an unexpected element type"))?;
        total_elems += items.len();
        tmp[pid] = Some(items);

        if let Some(max) = opt.max {
            if total_elems >= max {
                stopped = true;
                log::debug!("job on dataset {tail} short-circuiting: collected {total_elems} >= max {max}");
            }
        }

        if !stopped {
            while next < order.len() && in_flight.len() < max_busy {
                let pid2 = order[next];
                in_flight.push_back((pid2, dispatch(pid2)));
                next += 1;
            }
        }
    }

    let mut acc = init;
    for pid in order {
        if let Some(items) = tmp[pid].take() {
            acc = combine(acc, items);
        }
    }
    Ok(acc)
}

/// Run a one-off sub-job against a throwaway local pool, collecting `id`'s
/// full result as a `Vec<T>`. Used by the range-partitioner's recursive
/// sampling sub-job (spec §4.1): sampling is itself a job against the core.
pub fn run_sub_job<T: RFBound>(context: &Context, id: DatasetId) -> anyhow::Result<Vec<T>> {
    log::debug!("running range-partitioner sampling sub-job against dataset {id}");
    let scratch = std::env::temp_dir().join(format!("shardflow-subjob-{}", uuid::Uuid::new_v4()));
    let config = crate::config::RunnerConfig::default().with_scratch_dir(scratch);
    let pool = LocalPool::default_sized(&config)?;
    let transport: Arc<dyn ShuffleTransport> = Arc::new(LocalTransport);
    let registry = Arc::new(ShuffleRegistry::new());

    run_job::<T, Vec<T>>(
        context,
        &pool,
        transport,
        registry,
        id,
        &RunOptions::default(),
        Vec::new(),
        |mut acc, items| {
            acc.extend(items);
            acc
        },
    )
}
