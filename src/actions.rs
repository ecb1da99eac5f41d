//! The action surface (spec §6): terminal operations that trigger a job run
//! against a dataset and return a concrete result.
//!
//! Each method here is a thin, ephemeral-`LocalPool` front end over
//! [`crate::driver::run_job`], mirroring how the teacher's `PCollection`
//! methods (`collect_seq`, `collect_par`, ...) are thin wrappers over
//! `Runner::run_collect`.

use crate::config::RunnerConfig;
use crate::dataset::{Dataset, RFBound};
use crate::error::{EngineError, Result};
use crate::runtime::{LocalPool, LocalTransport, ShuffleTransport, WorkerPool};
use crate::shuffle::ShuffleRegistry;
use std::sync::Arc;

/// Dispatch-window/short-circuit/order options for one job run (spec §4.5
/// step 4, §6's per-action option column).
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    /// Stop dispatching once the accumulated result has at least this many
    /// elements (`take`/`top`).
    pub max: Option<usize>,
    /// Outstanding-task window size; defaults to the pool's worker count.
    pub max_busy: Option<usize>,
    /// Dispatch (and combine) partitions in descending order instead of
    /// ascending (`top`).
    pub lifo: bool,
}

impl RunOptions {
    pub fn with_max(mut self, n: usize) -> Self {
        self.max = Some(n);
        self
    }

    pub fn with_max_busy(mut self, n: usize) -> Self {
        self.max_busy = Some(n);
        self
    }

    pub fn with_lifo(mut self, lifo: bool) -> Self {
        self.lifo = lifo;
        self
    }
}

impl<T: RFBound> Dataset<T> {
    /// Build a throwaway local pool/transport/registry for `config` and run
    /// this dataset's job to completion, folding each result partition
    /// through `combine`.
    fn run<R>(
        &self,
        config: &RunnerConfig,
        opt: &RunOptions,
        init: R,
        combine: impl FnMut(R, Vec<T>) -> R,
    ) -> Result<R> {
        let pool = LocalPool::default_sized(config)
            .map_err(|e| EngineError::ProgrammerError(format!("failed to start local worker pool: {e}")))?;
        let transport: Arc<dyn ShuffleTransport> = Arc::new(LocalTransport);
        let registry = Arc::new(ShuffleRegistry::new());

        crate::driver::run_job(&self.context, &pool, transport, registry, self.id, opt, init, combine).map_err(|source| {
            EngineError::TaskError {
                stage: 0,
                partition: 0,
                source,
            }
        })
    }

    /// `count`: sum of per-partition counts.
    pub fn count(&self, config: &RunnerConfig) -> Result<usize> {
        self.run(config, &RunOptions::default(), 0usize, |acc, items| acc + items.len())
    }

    /// `collect`: concatenate per-partition lists in partition order.
    pub fn collect(&self, config: &RunnerConfig) -> Result<Vec<T>> {
        self.run(config, &RunOptions::default(), Vec::new(), |mut acc, items| {
            acc.extend(items);
            acc
        })
    }

    /// `reduce(f, init)`: fold `f` across every element, partition by
    /// partition, starting from `None` (empty datasets yield `None`).
    pub fn reduce(&self, config: &RunnerConfig, f: impl Fn(&T, &T) -> T + Send + Sync + 'static) -> Result<Option<T>> {
        self.run(config, &RunOptions::default(), None, move |acc: Option<T>, items| {
            items.into_iter().fold(acc, |acc, item| match acc {
                Some(existing) => Some(f(&existing, &item)),
                None => Some(item),
            })
        })
    }

    /// `aggregate(r, c, init, opt)`: `seq_op` folds `init` across one
    /// partition's elements, `comb_op` folds that partial into the running
    /// accumulator across partitions.
    pub fn aggregate<A: Clone + Send + 'static>(
        &self,
        config: &RunnerConfig,
        opt: &RunOptions,
        init: A,
        seq_op: impl Fn(A, &T) -> A + Send + Sync + 'static,
        comb_op: impl Fn(A, A) -> A + Send + Sync + 'static,
    ) -> Result<A> {
        let partition_init = init.clone();
        self.run(config, opt, init, move |acc, items| {
            let partial = items.iter().fold(partition_init.clone(), |a, item| seq_op(a, item));
            comb_op(acc, partial)
        })
    }

    /// `take(N)`: the first `N` elements in partition-then-index order,
    /// dispatching at most one task at a time.
    pub fn take(&self, config: &RunnerConfig, n: usize) -> Result<Vec<T>> {
        let opt = RunOptions::default().with_max(n).with_max_busy(1);
        let mut out = self.run(config, &opt, Vec::new(), |mut acc, items| {
            acc.extend(items);
            acc
        })?;
        out.truncate(n);
        Ok(out)
    }

    /// `top(N)`: the last `N` elements, found by dispatching partitions in
    /// reverse order, reversing each partition's own elements, and stopping
    /// as soon as `N` elements have been seen (spec §8: "equals the last n
    /// elements in reverse partition order").
    pub fn top(&self, config: &RunnerConfig, n: usize) -> Result<Vec<T>> {
        let opt = RunOptions::default().with_max(n).with_max_busy(1).with_lifo(true);
        let mut out = self.run(config, &opt, Vec::new(), |mut acc, mut items| {
            items.reverse();
            acc.extend(items);
            acc
        })?;
        out.truncate(n);
        Ok(out)
    }

    /// `first`: `take(1)` then project the lone element, if any.
    pub fn first(&self, config: &RunnerConfig) -> Result<Option<T>> {
        Ok(self.take(config, 1)?.into_iter().next())
    }

    /// `forEach(f)`: run the job purely for side effects, in partition
    /// order, with no accumulation.
    pub fn for_each(&self, config: &RunnerConfig, f: impl Fn(&T) + Send + Sync + 'static) -> Result<()> {
        self.run(config, &RunOptions::default(), (), move |(), items| {
            for item in &items {
                f(item);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::from_vec;
    use crate::graph::Context;

    #[test]
    fn collect_preserves_order() {
        let context = Context::default();
        let ds = from_vec(&context, vec![1, 2, 3, 4], 2).map(|x: &i32| x * 2);
        let result = ds.collect(&RunnerConfig::default()).unwrap();
        assert_eq!(result, vec![2, 4, 6, 8]);
    }

    #[test]
    fn count_matches_filter_cardinality() {
        let context = Context::default();
        let ds = from_vec(&context, (0..10).collect::<Vec<i32>>(), 3).filter(|x: &i32| x % 2 == 0);
        assert_eq!(ds.count(&RunnerConfig::default()).unwrap(), 5);
    }

    #[test]
    fn reduce_sums_all_elements() {
        let context = Context::default();
        let ds = from_vec(&context, vec![1, 2, 3, 4], 2);
        let sum = ds.reduce(&RunnerConfig::default(), |a, b| a + b).unwrap();
        assert_eq!(sum, Some(10));
    }

    #[test]
    fn take_returns_prefix() {
        let context = Context::default();
        let ds = from_vec(&context, (0..1000).collect::<Vec<i32>>(), 4);
        let out = ds.take(&RunnerConfig::default(), 3).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out, vec![0, 1, 2]);
    }

    #[test]
    fn top_returns_last_n_in_reverse_partition_order() {
        let context = Context::default();
        let ds = from_vec(&context, (0..1000).collect::<Vec<i32>>(), 4);
        let out = ds.top(&RunnerConfig::default(), 3).unwrap();
        assert_eq!(out, vec![999, 998, 997]);
    }

    #[test]
    fn first_projects_lone_element() {
        let context = Context::default();
        let ds = from_vec(&context, vec![42, 7], 2);
        assert_eq!(ds.first(&RunnerConfig::default()).unwrap(), Some(42));
    }
}
