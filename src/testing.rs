//! Test-support utilities (SPEC_FULL §8), grounded in the teacher's
//! `testing`/`testing::assertions` modules: a thin `Context` wrapper plus the
//! collection-comparison assertions the rest of this crate's own test suite
//! (and downstream users') rely on.

use crate::graph::Context;
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;

/// A thin wrapper around [`Context`] for tests, mirroring the teacher's
/// `TestPipeline`. Exists as a distinct type so test helpers can grow
/// test-only conveniences without cluttering the production `Context` API.
#[derive(Clone, Default)]
pub struct TestContext {
    context: Context,
}

impl TestContext {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::ops::Deref for TestContext {
    type Target = Context;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}

impl AsRef<Context> for TestContext {
    fn as_ref(&self) -> &Context {
        &self.context
    }
}

/// Assert that two collections are equal in order and content (spec §8's
/// order-dependent properties: `collect`, `take`, `top`, `sort_by`).
///
/// # Panics
/// Panics with a diff-style message if lengths or elements differ.
pub fn assert_collections_equal<T: Debug + PartialEq>(actual: &[T], expected: &[T]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "collection length mismatch\n  expected: {expected:?}\n  actual:   {actual:?}"
    );
    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert_eq!(a, e, "mismatch at index {i}\n  expected: {expected:?}\n  actual:   {actual:?}");
    }
}

/// Assert that two collections contain the same elements, ignoring order
/// (spec §8's partition-order-independent properties: `group_by_key`,
/// `distinct`, any unordered `collect`).
///
/// # Panics
/// Panics if the multisets of elements differ.
pub fn assert_collections_unordered_equal<T: Debug + Eq + Hash>(actual: &[T], expected: &[T]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "collection length mismatch\n  expected: {expected:?}\n  actual:   {actual:?}"
    );
    let actual_set: HashSet<_> = actual.iter().collect();
    let expected_set: HashSet<_> = expected.iter().collect();
    if actual_set != expected_set {
        let missing: Vec<_> = expected_set.difference(&actual_set).collect();
        let extra: Vec<_> = actual_set.difference(&expected_set).collect();
        panic!("collection content mismatch\n  missing: {missing:?}\n  extra:   {extra:?}");
    }
}

/// Assert that two key-value collections are equal once both are sorted by
/// key (spec §8: keyed results are only guaranteed up to partition order).
///
/// # Panics
/// Panics if the sorted collections differ.
pub fn assert_kv_collections_equal<K, V>(mut actual: Vec<(K, V)>, mut expected: Vec<(K, V)>)
where
    K: Debug + Ord,
    V: Debug + PartialEq,
{
    actual.sort_by(|a, b| a.0.cmp(&b.0));
    expected.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        actual.len(),
        expected.len(),
        "collection length mismatch\n  expected: {expected:?}\n  actual:   {actual:?}"
    );
    for (i, ((ak, av), (ek, ev))) in actual.iter().zip(expected.iter()).enumerate() {
        assert!(
            ak == ek && av == ev,
            "mismatch at sorted index {i}\n  expected: ({ek:?}, {ev:?})\n  actual:   ({ak:?}, {av:?})"
        );
    }
}

/// Assert that two grouped key-value collections (e.g. `group_by_key`
/// output) are equal: keys compared in sorted order, each key's values
/// compared as an unordered set.
///
/// # Panics
/// Panics if keys or grouped value sets differ.
pub fn assert_grouped_kv_equal<K, V>(mut actual: Vec<(K, Vec<V>)>, mut expected: Vec<(K, Vec<V>)>)
where
    K: Debug + Ord,
    V: Debug + Eq + Hash,
{
    actual.sort_by(|a, b| a.0.cmp(&b.0));
    expected.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(actual.len(), expected.len(), "grouped collection length mismatch");
    for (i, ((ak, av), (ek, ev))) in actual.iter().zip(expected.iter()).enumerate() {
        assert_eq!(ak, ek, "key mismatch at index {i}");
        let av_set: HashSet<_> = av.iter().collect();
        let ev_set: HashSet<_> = ev.iter().collect();
        assert_eq!(av_set, ev_set, "value mismatch for key {ak:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collections_equal_passes_on_matching_order() {
        assert_collections_equal(&[1, 2, 3], &[1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "mismatch at index")]
    fn collections_equal_panics_on_reordered_elements() {
        assert_collections_equal(&[1, 2, 3], &[1, 3, 2]);
    }

    #[test]
    fn collections_unordered_equal_ignores_order() {
        assert_collections_unordered_equal(&[3, 1, 2], &[1, 2, 3]);
    }

    #[test]
    fn kv_collections_equal_ignores_key_order() {
        assert_kv_collections_equal(vec![("b", 2), ("a", 1)], vec![("a", 1), ("b", 2)]);
    }

    #[test]
    fn grouped_kv_equal_ignores_value_order_within_key() {
        assert_grouped_kv_equal(vec![("a", vec![1, 2])], vec![("a", vec![2, 1])]);
    }

    #[test]
    fn test_context_derefs_to_context() {
        let tc = TestContext::new();
        let ds = crate::dataset::from_vec(tc.as_ref(), vec![1, 2, 3], 1);
        assert_eq!(ds.num_partitions(), 1);
    }
}
