//! Concrete narrow transforms (spec §4.3): `Map`, `FlatMap`, `MapValues`,
//! `FlatMapValues`, `Filter`, `Sample`.

use crate::erased::Block;
use crate::operator::NarrowOp;
use crate::rng::{bernoulli_sample, poisson_sample};

/// `T -> U`, applied element-wise.
pub struct MapOp<T, U> {
    f: Box<dyn Fn(&T) -> U + Send + Sync>,
    _marker: std::marker::PhantomData<fn(T) -> U>,
}

impl<T: Send + Sync + 'static, U: Send + Sync + 'static> MapOp<T, U> {
    pub fn new(f: impl Fn(&T) -> U + Send + Sync + 'static) -> Self {
        Self {
            f: Box::new(f),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: Send + Sync + 'static, U: Send + Sync + 'static> NarrowOp for MapOp<T, U> {
    fn apply(&self, input: Block) -> Block {
        let items = input
            .downcast::<Vec<T>>()
            .expect("Map operator received a batch of the wrong element type");
        let out: Vec<U> = items.iter().map(|t| (self.f)(t)).collect();
        Box::new(out)
    }

    fn cost_hint(&self) -> u8 {
        5
    }
}

/// `T -> Vec<U>`, flattened across the batch.
pub struct FlatMapOp<T, U> {
    f: Box<dyn Fn(&T) -> Vec<U> + Send + Sync>,
    _marker: std::marker::PhantomData<fn(T) -> U>,
}

impl<T: Send + Sync + 'static, U: Send + Sync + 'static> FlatMapOp<T, U> {
    pub fn new(f: impl Fn(&T) -> Vec<U> + Send + Sync + 'static) -> Self {
        Self {
            f: Box::new(f),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: Send + Sync + 'static, U: Send + Sync + 'static> NarrowOp for FlatMapOp<T, U> {
    fn apply(&self, input: Block) -> Block {
        let items = input
            .downcast::<Vec<T>>()
            .expect("FlatMap operator received a batch of the wrong element type");
        let out: Vec<U> = items.iter().flat_map(|t| (self.f)(t)).collect();
        Box::new(out)
    }
}

/// `(K, V) -> (K, W)`; preserves the key, touches only the value.
pub struct MapValuesOp<K, V, W> {
    f: Box<dyn Fn(&V) -> W + Send + Sync>,
    _marker: std::marker::PhantomData<fn(K, V) -> W>,
}

impl<K: Send + Sync + 'static, V: Send + Sync + 'static, W: Send + Sync + 'static>
    MapValuesOp<K, V, W>
{
    pub fn new(f: impl Fn(&V) -> W + Send + Sync + 'static) -> Self {
        Self {
            f: Box::new(f),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<K, V, W> NarrowOp for MapValuesOp<K, V, W>
where
    K: Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    W: Send + Sync + 'static,
{
    fn apply(&self, input: Block) -> Block {
        let items = input
            .downcast::<Vec<(K, V)>>()
            .expect("MapValues operator received a batch of the wrong element type");
        let out: Vec<(K, W)> = items
            .into_iter()
            .map(|(k, v)| (k, (self.f)(&v)))
            .collect();
        Box::new(out)
    }

    fn key_preserving(&self) -> bool {
        true
    }

    fn value_only(&self) -> bool {
        true
    }

    fn reorder_safe_with_value_only(&self) -> bool {
        true
    }

    fn cost_hint(&self) -> u8 {
        5
    }
}

/// `(K, V) -> (K, W)` one-to-many over the value, key preserved.
pub struct FlatMapValuesOp<K, V, W> {
    f: Box<dyn Fn(&V) -> Vec<W> + Send + Sync>,
    _marker: std::marker::PhantomData<fn(K, V) -> W>,
}

impl<K: Send + Sync + 'static, V: Send + Sync + 'static, W: Send + Sync + 'static>
    FlatMapValuesOp<K, V, W>
{
    pub fn new(f: impl Fn(&V) -> Vec<W> + Send + Sync + 'static) -> Self {
        Self {
            f: Box::new(f),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<K, V, W> NarrowOp for FlatMapValuesOp<K, V, W>
where
    K: Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    W: Send + Sync + 'static,
{
    fn apply(&self, input: Block) -> Block {
        let items = input
            .downcast::<Vec<(K, V)>>()
            .expect("FlatMapValues operator received a batch of the wrong element type");
        let out: Vec<(K, W)> = items
            .into_iter()
            .flat_map(|(k, v)| {
                (self.f)(&v)
                    .into_iter()
                    .map(move |w| (k.clone(), w))
            })
            .collect();
        Box::new(out)
    }

    fn key_preserving(&self) -> bool {
        true
    }

    fn value_only(&self) -> bool {
        true
    }
}

/// Keeps elements for which the predicate returns `true`.
pub struct FilterOp<T> {
    pred: Box<dyn Fn(&T) -> bool + Send + Sync>,
    _marker: std::marker::PhantomData<fn(T)>,
}

impl<T: Send + Sync + 'static> FilterOp<T> {
    pub fn new(pred: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            pred: Box::new(pred),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: Send + Sync + 'static> NarrowOp for FilterOp<T> {
    fn apply(&self, input: Block) -> Block {
        let items = input
            .downcast::<Vec<T>>()
            .expect("Filter operator received a batch of the wrong element type");
        let out: Vec<T> = items.into_iter().filter(|t| (self.pred)(t)).collect();
        Box::new(out)
    }

    fn cost_hint(&self) -> u8 {
        3
    }
}

/// Bernoulli (`with_replacement = false`) or Poisson (`with_replacement =
/// true`) sampling, driven by the deterministic xorshift generator in
/// [`crate::rng`] (spec §4.3, §9).
pub struct SampleOp<T> {
    pub with_replacement: bool,
    pub fraction: f64,
    pub seed: u32,
    _marker: std::marker::PhantomData<fn(T)>,
}

impl<T: Send + Sync + 'static> SampleOp<T> {
    pub fn new(with_replacement: bool, fraction: f64, seed: u32) -> Self {
        Self {
            with_replacement,
            fraction,
            seed,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> NarrowOp for SampleOp<T> {
    fn apply(&self, input: Block) -> Block {
        let items = *input
            .downcast::<Vec<T>>()
            .expect("Sample operator received a batch of the wrong element type");
        let out = if self.with_replacement {
            poisson_sample(items, self.fraction, self.seed)
        } else {
            bernoulli_sample(items, self.fraction, self.seed)
        };
        Box::new(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_doubles_values() {
        let op = MapOp::<i32, i32>::new(|x| x * 2);
        let out = op.apply(Box::new(vec![1, 2, 3]));
        let out = out.downcast::<Vec<i32>>().unwrap();
        assert_eq!(*out, vec![2, 4, 6]);
    }

    #[test]
    fn flat_map_expands_and_flattens() {
        let op = FlatMapOp::<i32, i32>::new(|x| vec![*x, *x]);
        let out = op.apply(Box::new(vec![1, 2]));
        let out = out.downcast::<Vec<i32>>().unwrap();
        assert_eq!(*out, vec![1, 1, 2, 2]);
    }

    #[test]
    fn map_values_preserves_keys() {
        let op = MapValuesOp::<String, i32, i32>::new(|v| v + 1);
        let out = op.apply(Box::new(vec![("a".to_string(), 1), ("b".to_string(), 2)]));
        let out = out.downcast::<Vec<(String, i32)>>().unwrap();
        assert_eq!(
            *out,
            vec![("a".to_string(), 2), ("b".to_string(), 3)]
        );
    }

    #[test]
    fn filter_keeps_matching_elements() {
        let op = FilterOp::<i32>::new(|x| x % 2 == 0);
        let out = op.apply(Box::new(vec![1, 2, 3, 4]));
        let out = out.downcast::<Vec<i32>>().unwrap();
        assert_eq!(*out, vec![2, 4]);
    }

    #[test]
    fn sample_without_replacement_never_duplicates() {
        let op = SampleOp::<i32>::new(false, 0.5, 9);
        let input: Vec<i32> = (0..1000).collect();
        let out = op.apply(Box::new(input.clone()));
        let out = *out.downcast::<Vec<i32>>().unwrap();
        let mut seen = std::collections::HashSet::new();
        for v in &out {
            assert!(seen.insert(*v), "duplicate element under sampling without replacement");
        }
        assert!(out.len() < input.len());
    }
}
