//! End-to-end exercises of the action surface (spec §6, §8) against small
//! multi-partition pipelines, including the classic word-count shape from
//! this crate's own quick-start doc example.

use shardflow::actions::RunOptions;
use shardflow::combiners::{Average, Count, Max, Min, Sum};
use shardflow::config::RunnerConfig;
use shardflow::dataset::from_vec;
use shardflow::graph::Context;
use shardflow::testing::assert_kv_collections_equal;

fn word_lines() -> Vec<String> {
    vec![
        "the quick brown fox".to_string(),
        "the lazy dog".to_string(),
        "the fox and the dog".to_string(),
    ]
}

#[test]
fn word_count_pipeline_matches_a_manual_tally() {
    let context = Context::default();
    let config = RunnerConfig::default();

    let counts = from_vec(&context, word_lines(), 2)
        .flat_map(|line: &String| line.split_whitespace().map(|w| w.to_string()).collect::<Vec<_>>())
        .map(|w: &String| (w.clone(), 1u64))
        .reduce_by_key(|a: &u64, b: &u64| a + b, 2)
        .collect(&config)
        .unwrap();

    let mut expected: std::collections::HashMap<String, u64> = std::collections::HashMap::new();
    for line in word_lines() {
        for w in line.split_whitespace() {
            *expected.entry(w.to_string()).or_insert(0) += 1;
        }
    }
    assert_kv_collections_equal(counts, expected.into_iter().collect());
}

#[test]
fn aggregate_by_key_with_sum_matches_reduce_by_key() {
    let context = Context::default();
    let config = RunnerConfig::default();

    let pairs = vec![
        ("a".to_string(), 1u64), ("b".to_string(), 2), ("a".to_string(), 3), ("b".to_string(), 4),
    ];

    let via_reduce = from_vec(&context, pairs.clone(), 2)
        .reduce_by_key(|a: &u64, b: &u64| a + b, 2)
        .collect(&config)
        .unwrap();
    let via_aggregate = from_vec(&context, pairs, 2)
        .aggregate_by_key(Sum::<u64>::new(), 2)
        .collect(&config)
        .unwrap();

    assert_kv_collections_equal(via_reduce, via_aggregate);
}

#[test]
fn aggregate_by_key_with_count_min_max() {
    let context = Context::default();
    let config = RunnerConfig::default();

    // Min/Max require Ord, so integer values here (f64 only has PartialOrd).
    let pairs: Vec<(String, i64)> = vec![
        ("a".to_string(), 10), ("a".to_string(), 20), ("a".to_string(), 30),
        ("b".to_string(), 5),
    ];

    let counts = from_vec(&context, pairs.clone(), 2).aggregate_by_key(Count::new(), 2).collect(&config).unwrap();
    assert_kv_collections_equal(counts, vec![("a".to_string(), 3u64), ("b".to_string(), 1)]);

    let mins = from_vec(&context, pairs.clone(), 2).aggregate_by_key(Min::<i64>::new(), 2).collect(&config).unwrap();
    assert_kv_collections_equal(mins, vec![("a".to_string(), 10), ("b".to_string(), 5)]);

    let maxes = from_vec(&context, pairs, 2).aggregate_by_key(Max::<i64>::new(), 2).collect(&config).unwrap();
    assert_kv_collections_equal(maxes, vec![("a".to_string(), 30), ("b".to_string(), 5)]);
}

#[test]
fn aggregate_by_key_with_average() {
    let context = Context::default();
    let config = RunnerConfig::default();

    let pairs: Vec<(String, f64)> = vec![
        ("a".to_string(), 10.0), ("a".to_string(), 20.0), ("a".to_string(), 30.0),
        ("b".to_string(), 5.0),
    ];

    let averages = from_vec(&context, pairs, 2).aggregate_by_key(Average, 2).collect(&config).unwrap();
    let avg_map: std::collections::HashMap<_, _> = averages.into_iter().collect();
    assert_eq!(*avg_map.get("a").unwrap(), 20.0);
    assert_eq!(*avg_map.get("b").unwrap(), 5.0);
}

#[test]
fn aggregate_action_folds_sequentially_then_combines() {
    let context = Context::default();
    let config = RunnerConfig::default();

    let ds = from_vec(&context, (1..=10).collect::<Vec<i32>>(), 4);
    let sum = ds
        .aggregate(&config, &RunOptions::default(), 0i64, |acc, x| acc + *x as i64, |a, b| a + b)
        .unwrap();
    assert_eq!(sum, 55);
}

#[test]
fn take_respects_max_busy_one_and_stops_early() {
    let context = Context::default();
    let config = RunnerConfig::default();

    let ds = from_vec(&context, (0..10_000).collect::<Vec<i32>>(), 8);
    let first_five = ds.take(&config, 5).unwrap();
    assert_eq!(first_five, vec![0, 1, 2, 3, 4]);
}

#[test]
fn for_each_visits_every_element_exactly_once() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let context = Context::default();
    let config = RunnerConfig::default();
    let seen = Arc::new(AtomicUsize::new(0));
    let seen_for_closure = Arc::clone(&seen);

    let ds = from_vec(&context, (0..37).collect::<Vec<i32>>(), 5);
    ds.for_each(&config, move |_| {
        seen_for_closure.fetch_add(1, Ordering::Relaxed);
    })
    .unwrap();

    assert_eq!(seen.load(Ordering::Relaxed), 37);
}

#[test]
fn empty_dataset_reduce_yields_none() {
    let context = Context::default();
    let config = RunnerConfig::default();

    let ds = from_vec(&context, Vec::<i32>::new(), 3);
    assert_eq!(ds.reduce(&config, |a, b| a + b).unwrap(), None);
    assert_eq!(ds.count(&config).unwrap(), 0);
}
