//! `Dataset<T>`: the typed, lazy handle users chain transforms on (spec §3's
//! Dataset node). Narrow transforms are defined here for any element type;
//! keyed (wide) transforms are defined in the `impl Dataset<(K, V)>` block.

use crate::canonical::canonical_key;
use crate::erased::{TypeTag, block_ops_for, vec_ops_for};
use crate::graph::{Context, partition_count};
use crate::narrow_ops::{FilterOp, FlatMapOp, FlatMapValuesOp, MapOp, MapValuesOp, SampleOp};
use crate::operator::{Operator, PartitionHint, RawRecord, WideOp};
use crate::partitioner::{HashPartitioner, Partitioner, RangePartitioner, SharedPartitioner};
use anyhow::Context as _;
use serde::{Serialize, de::DeserializeOwned};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

/// The blanket bound for every element type flowing through a `Dataset`.
///
/// Elements must be `'static + Send + Sync + Clone` to move across worker
/// threads and partitions, and `Serialize + DeserializeOwned` because any
/// element may need to cross a shuffle boundary (spec §4.6).
pub trait RFBound: 'static + Send + Sync + Clone + Serialize + DeserializeOwned {}
impl<T> RFBound for T where T: 'static + Send + Sync + Clone + Serialize + DeserializeOwned {}

/// A typed, lazy dataset: a handle onto one node of a [`Context`] graph.
///
/// `Dataset<T>` carries no data itself — cloning it is cheap and shares the
/// same underlying node, matching the teacher's `PCollection<T>` (spec §3
/// "Dataset nodes... hold no data").
pub struct Dataset<T> {
    pub(crate) context: Context,
    pub(crate) id: crate::dataset_id::DatasetId,
    pub(crate) _t: PhantomData<fn() -> T>,
}

impl<T> Clone for Dataset<T> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            id: self.id,
            _t: PhantomData,
        }
    }
}

impl<T> Dataset<T> {
    pub(crate) fn new(context: Context, id: crate::dataset_id::DatasetId) -> Self {
        Self {
            context,
            id,
            _t: PhantomData,
        }
    }

    /// The dataset's identifier within its context.
    pub fn id(&self) -> crate::dataset_id::DatasetId {
        self.id
    }

    /// The context (graph registry) this dataset belongs to.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Number of partitions this dataset resolves to (spec §3, §4.5 step 1).
    pub fn num_partitions(&self) -> usize {
        partition_count(&self.context, self.id)
    }
}

/// Build a source dataset from an in-memory `Vec<T>`, split into `n`
/// contiguous partitions (spec §4.3 "generic index-driven source").
pub fn from_vec<T: RFBound>(context: &Context, data: Vec<T>, n: usize) -> Dataset<T> {
    let n = n.max(1);
    let hints = (0..n).map(|_| PartitionHint::default()).collect();
    let id = context.insert_node(
        vec![],
        Operator::Source {
            payload: Arc::new(data),
            vec_ops: vec_ops_for::<T>(),
            elem_tag: TypeTag::of::<T>(),
            partition_hints: Arc::new(hints),
        },
        block_ops_for::<T>(),
    );
    Dataset::new(context.clone(), id)
}

impl<T: RFBound> Dataset<T> {
    fn push_narrow(&self, op: Arc<dyn crate::operator::NarrowOp>) -> Dataset<T> {
        let id = self
            .context
            .insert_node(vec![self.id], Operator::Narrow(vec![op]), block_ops_for::<T>());
        Dataset::new(self.context.clone(), id)
    }

    pub fn map<U: RFBound>(&self, f: impl Fn(&T) -> U + Send + Sync + 'static) -> Dataset<U> {
        let id = self.context.insert_node(
            vec![self.id],
            Operator::Narrow(vec![Arc::new(MapOp::<T, U>::new(f))]),
            block_ops_for::<U>(),
        );
        Dataset::new(self.context.clone(), id)
    }

    pub fn flat_map<U: RFBound>(
        &self,
        f: impl Fn(&T) -> Vec<U> + Send + Sync + 'static,
    ) -> Dataset<U> {
        let id = self.context.insert_node(
            vec![self.id],
            Operator::Narrow(vec![Arc::new(FlatMapOp::<T, U>::new(f))]),
            block_ops_for::<U>(),
        );
        Dataset::new(self.context.clone(), id)
    }

    pub fn filter(&self, pred: impl Fn(&T) -> bool + Send + Sync + 'static) -> Dataset<T> {
        self.push_narrow(Arc::new(FilterOp::<T>::new(pred)))
    }

    /// Bernoulli (`with_replacement = false`) or Poisson sampling (spec §4.3).
    pub fn sample(&self, with_replacement: bool, fraction: f64, seed: u32) -> Dataset<T> {
        self.push_narrow(Arc::new(SampleOp::<T>::new(with_replacement, fraction, seed)))
    }

    /// Identity-transform union: partition count is the sum of both parents'
    /// (spec §4.3).
    pub fn union(&self, other: &Dataset<T>) -> Dataset<T> {
        let id = self
            .context
            .insert_node(vec![self.id, other.id], Operator::Union, block_ops_for::<T>());
        Dataset::new(self.context.clone(), id)
    }

    /// Mark this dataset persistent: its partitions' buffers are retained
    /// across iterations (subject to eviction, spec §4.2) rather than
    /// recomputed from parents each time.
    pub fn persist(self) -> Self {
        self.context.mark_persistent(self.id);
        self
    }

    /// Sort by a user key function using a range partitioner (spec §4.1,
    /// §4.3 `SortBy`).
    pub fn sort_by<K>(&self, key_fn: impl Fn(&T) -> K + Send + Sync + 'static, ascending: bool, num_partitions: usize) -> Dataset<T>
    where
        K: Ord + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let n = num_partitions.max(1);
        let key_fn = Arc::new(key_fn);
        let cell: Arc<Mutex<Option<Arc<RangePartitioner<K>>>>> = Arc::new(Mutex::new(None));

        let sample_seed = self.id.raw() as u32;
        let sampled: Dataset<K> = {
            let key_fn = Arc::clone(&key_fn);
            self.map(move |t| key_fn(t)).sample(false, 0.5, sample_seed)
        };
        let sampled_id = sampled.id;
        let ctx_for_init = self.context.clone();
        let cell_for_init = Arc::clone(&cell);
        let range_init = Arc::new(move || -> anyhow::Result<()> {
            if cell_for_init.lock().unwrap().is_some() {
                return Ok(());
            }
            let keys: Vec<K> = crate::driver::run_sub_job::<K>(&ctx_for_init, sampled_id)
                .context("sort_by: range-partitioner sampling sub-job failed")?;
            let rp = Arc::new(RangePartitioner::from_sample(keys, n));
            *cell_for_init.lock().unwrap() = Some(rp);
            Ok(())
        });

        let map_key_fn = Arc::clone(&key_fn);
        let map_cell = Arc::clone(&cell);
        let map_side = Arc::new(
            move |block: crate::erased::Block, _parent: usize, _src: usize| -> anyhow::Result<Vec<(usize, RawRecord)>> {
                let items = *block
                    .downcast::<Vec<T>>()
                    .map_err(|_| anyhow::anyhow!("sort_by map-side: wrong element type"))?;
                let rp = map_cell
                    .lock()
                    .unwrap()
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("range partitioner must be initialized before dispatch"))?;
                items
                    .into_iter()
                    .map(|t| {
                        let k = map_key_fn(&t);
                        let bucket = rp.partition_of(&k);
                        let record = serde_json::to_vec(&t).context("sortable element must serialize")?;
                        Ok((bucket, record))
                    })
                    .collect()
            },
        );

        let reduce_key_fn = Arc::clone(&key_fn);
        let reduce_side = Arc::new(
            move |output_partition: usize, read: &dyn Fn(usize) -> Vec<Vec<u8>>| -> anyhow::Result<crate::erased::Block> {
                let records = read(output_partition);
                let mut items: Vec<T> = records
                    .iter()
                    .map(|r| serde_json::from_slice(r).context("shuffled element must deserialize"))
                    .collect::<anyhow::Result<_>>()?;
                items.sort_by(|a, b| {
                    let ord = reduce_key_fn(a).cmp(&reduce_key_fn(b));
                    if ascending { ord } else { ord.reverse() }
                });
                Ok(Box::new(items) as crate::erased::Block)
            },
        );

        let wide = WideOp {
            name: "sort_by",
            bucket_count: n,
            output_partitions: n,
            map_side,
            reduce_side,
        };
        let id = self.context.insert_node_with_range_init(
            vec![self.id],
            Operator::Wide(wide),
            block_ops_for::<T>(),
            range_init,
        );
        Dataset::new(self.context.clone(), id)
    }
}

/// A user-supplied per-key aggregator (spec §4.3 `AggregateByKey`): `create`
/// builds a fresh accumulator, `add` folds one value in, `merge` combines
/// two accumulators from different map-side contributors, and `finish`
/// projects the final accumulator to the output type.
pub trait Aggregator<V, A, O>: Send + Sync {
    fn create(&self) -> A;
    fn add(&self, acc: &mut A, value: V);
    fn merge(&self, acc: &mut A, other: A);
    fn finish(&self, acc: A) -> O;
}

impl<K, V> Dataset<(K, V)>
where
    K: RFBound + Eq + Hash,
    V: RFBound,
{
    fn push_narrow(&self, op: Arc<dyn crate::operator::NarrowOp>) -> Dataset<(K, V)> {
        let id = self.context.insert_node(
            vec![self.id],
            Operator::Narrow(vec![op]),
            block_ops_for::<(K, V)>(),
        );
        Dataset::new(self.context.clone(), id)
    }

    pub fn map_values<W: RFBound>(
        &self,
        f: impl Fn(&V) -> W + Send + Sync + 'static,
    ) -> Dataset<(K, W)> {
        let id = self.context.insert_node(
            vec![self.id],
            Operator::Narrow(vec![Arc::new(MapValuesOp::<K, V, W>::new(f))]),
            block_ops_for::<(K, W)>(),
        );
        Dataset::new(self.context.clone(), id)
    }

    pub fn flat_map_values<W: RFBound>(
        &self,
        f: impl Fn(&V) -> Vec<W> + Send + Sync + 'static,
    ) -> Dataset<(K, W)> {
        let id = self.context.insert_node(
            vec![self.id],
            Operator::Narrow(vec![Arc::new(FlatMapValuesOp::<K, V, W>::new(f))]),
            block_ops_for::<(K, W)>(),
        );
        Dataset::new(self.context.clone(), id)
    }

    pub fn filter_values(&self, pred: impl Fn(&V) -> bool + Send + Sync + 'static) -> Dataset<(K, V)> {
        self.push_narrow(Arc::new(FilterOp::<(K, V)>::new(move |(_, v)| pred(v))))
    }

    /// `AggregateByKey` (spec §4.3): also the building block for
    /// `reduce_by_key` and `group_by_key` below.
    pub fn aggregate_by_key<A, O>(
        &self,
        agg: impl Aggregator<V, A, O> + 'static,
        num_partitions: usize,
    ) -> Dataset<(K, O)>
    where
        A: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
        O: RFBound,
    {
        let n = num_partitions.max(1);
        let agg = Arc::new(agg);
        let partitioner: SharedPartitioner<K> = Arc::new(HashPartitioner::<K>::new(n));

        let map_agg = Arc::clone(&agg);
        let map_partitioner = Arc::clone(&partitioner);
        let map_side = Arc::new(
            move |block: crate::erased::Block, _parent: usize, _src: usize| -> anyhow::Result<Vec<(usize, RawRecord)>> {
                let items = *block
                    .downcast::<Vec<(K, V)>>()
                    .map_err(|_| anyhow::anyhow!("aggregate_by_key map-side: wrong element type"))?;
                let mut acc_map: HashMap<K, A> = HashMap::new();
                for (k, v) in items {
                    let entry = acc_map.entry(k).or_insert_with(|| map_agg.create());
                    map_agg.add(entry, v);
                }
                acc_map
                    .into_iter()
                    .map(|(k, a)| {
                        let bucket = map_partitioner.partition_of(&k);
                        let record = serde_json::to_vec(&(k, a)).context("key/accumulator must serialize")?;
                        Ok((bucket, record))
                    })
                    .collect()
            },
        );

        let reduce_agg = Arc::clone(&agg);
        let reduce_side = Arc::new(
            move |output_partition: usize, read: &dyn Fn(usize) -> Vec<Vec<u8>>| -> anyhow::Result<crate::erased::Block> {
                let records = read(output_partition);
                let mut acc_map: HashMap<K, A> = HashMap::new();
                for record in records {
                    let (k, a): (K, A) = serde_json::from_slice(&record)
                        .context("shuffled key/accumulator must deserialize")?;
                    match acc_map.remove(&k) {
                        Some(mut existing) => {
                            reduce_agg.merge(&mut existing, a);
                            acc_map.insert(k, existing);
                        }
                        None => {
                            acc_map.insert(k, a);
                        }
                    }
                }
                let out: Vec<(K, O)> = acc_map
                    .into_iter()
                    .map(|(k, a)| (k, reduce_agg.finish(a)))
                    .collect();
                Ok(Box::new(out) as crate::erased::Block)
            },
        );

        let wide = WideOp {
            name: "aggregate_by_key",
            bucket_count: n,
            output_partitions: n,
            map_side,
            reduce_side,
        };
        let id = self.context.insert_node(
            vec![self.id],
            Operator::Wide(wide),
            block_ops_for::<(K, O)>(),
        );
        Dataset::new(self.context.clone(), id)
    }

    /// `reduceByKey`: fold values for each key using an associative `f`.
    pub fn reduce_by_key(
        &self,
        f: impl Fn(&V, &V) -> V + Send + Sync + 'static,
        num_partitions: usize,
    ) -> Dataset<(K, V)> {
        struct ReduceAgg<V, F> {
            f: F,
            _m: PhantomData<V>,
        }
        impl<V: Clone + Send + Sync, F: Fn(&V, &V) -> V + Send + Sync> Aggregator<V, Option<V>, V>
            for ReduceAgg<V, F>
        {
            fn create(&self) -> Option<V> {
                None
            }
            fn add(&self, acc: &mut Option<V>, value: V) {
                *acc = Some(match acc.take() {
                    Some(existing) => (self.f)(&existing, &value),
                    None => value,
                });
            }
            fn merge(&self, acc: &mut Option<V>, other: Option<V>) {
                if let Some(o) = other {
                    self.add(acc, o);
                }
            }
            fn finish(&self, acc: Option<V>) -> V {
                acc.expect("reduce_by_key: key present with no accumulated value")
            }
        }
        self.aggregate_by_key(
            ReduceAgg {
                f,
                _m: PhantomData,
            },
            num_partitions,
        )
    }

    /// `groupByKey`.
    pub fn group_by_key(&self, num_partitions: usize) -> Dataset<(K, Vec<V>)> {
        struct GroupAgg<V>(PhantomData<V>);
        impl<V: Clone + Send + Sync> Aggregator<V, Vec<V>, Vec<V>> for GroupAgg<V> {
            fn create(&self) -> Vec<V> {
                Vec::new()
            }
            fn add(&self, acc: &mut Vec<V>, value: V) {
                acc.push(value);
            }
            fn merge(&self, acc: &mut Vec<V>, other: Vec<V>) {
                acc.extend(other);
            }
            fn finish(&self, acc: Vec<V>) -> Vec<V> {
                acc
            }
        }
        self.aggregate_by_key(GroupAgg(PhantomData), num_partitions)
    }

    /// `PartitionBy`: identical map side to `aggregate_by_key` but emits raw
    /// records with no reduction; reduce side concatenates (spec §4.3).
    pub fn partition_by(&self, partitioner: SharedPartitioner<K>) -> Dataset<(K, V)> {
        let n = partitioner.num_partitions();
        let map_partitioner = Arc::clone(&partitioner);
        let map_side = Arc::new(
            move |block: crate::erased::Block, _parent: usize, _src: usize| -> anyhow::Result<Vec<(usize, RawRecord)>> {
                let items = *block
                    .downcast::<Vec<(K, V)>>()
                    .map_err(|_| anyhow::anyhow!("partition_by map-side: wrong element type"))?;
                items
                    .into_iter()
                    .map(|(k, v)| {
                        let bucket = map_partitioner.partition_of(&k);
                        let record = serde_json::to_vec(&(k, v)).context("record must serialize")?;
                        Ok((bucket, record))
                    })
                    .collect()
            },
        );
        let reduce_side = Arc::new(
            move |output_partition: usize, read: &dyn Fn(usize) -> Vec<Vec<u8>>| -> anyhow::Result<crate::erased::Block> {
                let records = read(output_partition);
                let out: Vec<(K, V)> = records
                    .iter()
                    .map(|r| serde_json::from_slice(r).context("shuffled record must deserialize"))
                    .collect::<anyhow::Result<_>>()?;
                Ok(Box::new(out) as crate::erased::Block)
            },
        );
        let wide = WideOp {
            name: "partition_by",
            bucket_count: n,
            output_partitions: n,
            map_side,
            reduce_side,
        };
        let id = self.context.insert_node(
            vec![self.id],
            Operator::Wide(wide),
            block_ops_for::<(K, V)>(),
        );
        Dataset::new(self.context.clone(), id)
    }

    /// `sortByKey`: convenience over [`Dataset::sort_by`] using the pair's
    /// own key.
    pub fn sort_by_key(&self, ascending: bool, num_partitions: usize) -> Dataset<(K, V)>
    where
        K: Ord,
    {
        let base: Dataset<(K, V)> = Dataset::new(self.context.clone(), self.id);
        base.sort_by(|(k, _)| k.clone(), ascending, num_partitions)
    }

    /// `coGroup`: two `(K, _)` parents grouped by key into
    /// `(K, (Vec<V>, Vec<W>))` (spec §4.3).
    pub fn co_group<W>(&self, other: &Dataset<(K, W)>, num_partitions: usize) -> Dataset<(K, (Vec<V>, Vec<W>))>
    where
        W: RFBound,
    {
        #[derive(Serialize, serde::Deserialize)]
        enum Side<V, W> {
            L(Vec<V>),
            R(Vec<W>),
        }

        let n = num_partitions.max(1);
        let partitioner: SharedPartitioner<K> = Arc::new(HashPartitioner::<K>::new(n));

        let left_partitioner = Arc::clone(&partitioner);
        let right_partitioner = Arc::clone(&partitioner);
        let map_side = Arc::new(
            move |block: crate::erased::Block, parent: usize, _src: usize| -> anyhow::Result<Vec<(usize, RawRecord)>> {
                if parent == 0 {
                    let items = *block
                        .downcast::<Vec<(K, V)>>()
                        .map_err(|_| anyhow::anyhow!("co_group map-side: wrong left element type"))?;
                    let mut grouped: HashMap<K, Vec<V>> = HashMap::new();
                    for (k, v) in items {
                        grouped.entry(k).or_default().push(v);
                    }
                    grouped
                        .into_iter()
                        .map(|(k, vs)| {
                            let bucket = left_partitioner.partition_of(&k);
                            let payload: Side<V, W> = Side::L(vs);
                            let record =
                                serde_json::to_vec(&(k, payload)).context("co_group record must serialize")?;
                            Ok((bucket, record))
                        })
                        .collect()
                } else {
                    let items = *block
                        .downcast::<Vec<(K, W)>>()
                        .map_err(|_| anyhow::anyhow!("co_group map-side: wrong right element type"))?;
                    let mut grouped: HashMap<K, Vec<W>> = HashMap::new();
                    for (k, w) in items {
                        grouped.entry(k).or_default().push(w);
                    }
                    grouped
                        .into_iter()
                        .map(|(k, ws)| {
                            let bucket = right_partitioner.partition_of(&k);
                            let payload: Side<V, W> = Side::R(ws);
                            let record =
                                serde_json::to_vec(&(k, payload)).context("co_group record must serialize")?;
                            Ok((bucket, record))
                        })
                        .collect()
                }
            },
        );

        let reduce_side = Arc::new(
            move |output_partition: usize, read: &dyn Fn(usize) -> Vec<Vec<u8>>| -> anyhow::Result<crate::erased::Block> {
                let records = read(output_partition);
                let mut acc: HashMap<K, (Vec<V>, Vec<W>)> = HashMap::new();
                for record in records {
                    let (k, side): (K, Side<V, W>) = serde_json::from_slice(&record)
                        .context("co_group shuffled record must deserialize")?;
                    let entry = acc.entry(k).or_default();
                    match side {
                        Side::L(vs) => entry.0.extend(vs),
                        Side::R(ws) => entry.1.extend(ws),
                    }
                }
                Ok(Box::new(acc.into_iter().collect::<Vec<_>>()) as crate::erased::Block)
            },
        );

        let wide = WideOp {
            name: "co_group",
            bucket_count: n,
            output_partitions: n,
            map_side,
            reduce_side,
        };
        let id = self.context.insert_node(
            vec![self.id, other.id],
            Operator::Wide(wide),
            block_ops_for::<(K, (Vec<V>, Vec<W>))>(),
        );
        Dataset::new(self.context.clone(), id)
    }
}

impl<T: RFBound> Dataset<T> {
    /// `Cartesian`: map side spills all input as one bucket per source
    /// partition; reduce side pairs every record of left partition `p /
    /// right_count` with every record of right partition `(p %
    /// right_count) + left_count` (spec §4.3).
    pub fn cartesian<U: RFBound>(&self, other: &Dataset<U>) -> Dataset<(T, U)> {
        let left_count = self.num_partitions();
        let right_count = other.num_partitions();
        let bucket_count = left_count + right_count;
        let output_partitions = left_count * right_count;

        let map_side = Arc::new(
            move |block: crate::erased::Block, parent: usize, src: usize| -> anyhow::Result<Vec<(usize, RawRecord)>> {
                if parent == 0 {
                    let items = *block
                        .downcast::<Vec<T>>()
                        .map_err(|_| anyhow::anyhow!("cartesian map-side: wrong left element type"))?;
                    let bucket = src;
                    items
                        .into_iter()
                        .map(|t| {
                            let record = serde_json::to_vec(&t).context("element must serialize")?;
                            Ok((bucket, record))
                        })
                        .collect()
                } else {
                    let items = *block
                        .downcast::<Vec<U>>()
                        .map_err(|_| anyhow::anyhow!("cartesian map-side: wrong right element type"))?;
                    let bucket = left_count + src;
                    items
                        .into_iter()
                        .map(|u| {
                            let record = serde_json::to_vec(&u).context("element must serialize")?;
                            Ok((bucket, record))
                        })
                        .collect()
                }
            },
        );

        let reduce_side = Arc::new(
            move |output_partition: usize, read: &dyn Fn(usize) -> Vec<Vec<u8>>| -> anyhow::Result<crate::erased::Block> {
                let p1 = output_partition / right_count.max(1);
                let p2 = (output_partition % right_count.max(1)) + left_count;
                let left: Vec<T> = read(p1)
                    .iter()
                    .map(|r| serde_json::from_slice(r).context("cartesian left element must deserialize"))
                    .collect::<anyhow::Result<_>>()?;
                let right: Vec<U> = read(p2)
                    .iter()
                    .map(|r| serde_json::from_slice(r).context("cartesian right element must deserialize"))
                    .collect::<anyhow::Result<_>>()?;
                let mut out = Vec::with_capacity(left.len() * right.len());
                for l in &left {
                    for r in &right {
                        out.push((l.clone(), r.clone()));
                    }
                }
                Ok(Box::new(out) as crate::erased::Block)
            },
        );

        let wide = WideOp {
            name: "cartesian",
            bucket_count,
            output_partitions,
            map_side,
            reduce_side,
        };
        let id = self.context.insert_node(
            vec![self.id, other.id],
            Operator::Wide(wide),
            block_ops_for::<(T, U)>(),
        );
        Dataset::new(self.context.clone(), id)
    }
}

impl<T: RFBound> Dataset<T> {
    /// `distinct`: dedupe elements via a hash shuffle keyed by the whole
    /// element's canonical serialization (spec §8's `distinct().count() ==
    /// |set(collect())|` property; not itself in the §4.3 operator catalog,
    /// but built from the same `AggregateByKey`-style shuffle machinery).
    pub fn distinct(&self, num_partitions: usize) -> Dataset<T> {
        let n = num_partitions.max(1);
        let partitioner: SharedPartitioner<T> = Arc::new(HashPartitioner::<T>::new(n));

        let map_partitioner = Arc::clone(&partitioner);
        let map_side = Arc::new(
            move |block: crate::erased::Block, _parent: usize, _src: usize| -> anyhow::Result<Vec<(usize, RawRecord)>> {
                let items = *block
                    .downcast::<Vec<T>>()
                    .map_err(|_| anyhow::anyhow!("distinct map-side: wrong element type"))?;
                let mut seen: HashSet<String> = HashSet::new();
                items
                    .into_iter()
                    .filter_map(|t| {
                        if seen.insert(canonical_key(&t)) {
                            let bucket = map_partitioner.partition_of(&t);
                            Some(
                                serde_json::to_vec(&t)
                                    .context("element must serialize")
                                    .map(|record| (bucket, record)),
                            )
                        } else {
                            None
                        }
                    })
                    .collect()
            },
        );

        let reduce_side = Arc::new(
            move |output_partition: usize, read: &dyn Fn(usize) -> Vec<Vec<u8>>| -> anyhow::Result<crate::erased::Block> {
                let records = read(output_partition);
                let mut seen: HashSet<String> = HashSet::new();
                let mut out: Vec<T> = Vec::new();
                for record in records {
                    let t: T = serde_json::from_slice(&record).context("shuffled element must deserialize")?;
                    if seen.insert(canonical_key(&t)) {
                        out.push(t);
                    }
                }
                Ok(Box::new(out) as crate::erased::Block)
            },
        );

        let wide = WideOp {
            name: "distinct",
            bucket_count: n,
            output_partitions: n,
            map_side,
            reduce_side,
        };
        let id = self
            .context
            .insert_node(vec![self.id], Operator::Wide(wide), block_ops_for::<T>());
        Dataset::new(self.context.clone(), id)
    }
}

/// Hash the key of a `(K, V)` pair via its canonical textual serialization,
/// used by tests that want to assert the hash partitioner's routing
/// directly rather than through a full shuffle.
pub fn debug_hash_bucket<K: Serialize>(key: &K, n: usize) -> usize {
    crate::partitioner::hash_bucket(&canonical_key(key), n)
}
