//! Correctness of the wide (shuffle) operators across multiple partitions
//! (spec §4.3, §4.6): every record written on the map side must reappear
//! exactly once on the reduce side, routed to the bucket its key hashes to.

use shardflow::config::RunnerConfig;
use shardflow::dataset::from_vec;
use shardflow::graph::Context;
use shardflow::partitioner::HashPartitioner;
use shardflow::testing::{assert_collections_unordered_equal, assert_grouped_kv_equal, assert_kv_collections_equal};
use std::sync::Arc;

#[test]
fn group_by_key_collects_every_value_for_every_key() {
    let context = Context::default();
    let config = RunnerConfig::default();

    let pairs = vec![
        ("a".to_string(), 1), ("b".to_string(), 2), ("a".to_string(), 3),
        ("c".to_string(), 4), ("b".to_string(), 5), ("a".to_string(), 6),
    ];
    let grouped = from_vec(&context, pairs, 4).group_by_key(3).collect(&config).unwrap();

    assert_grouped_kv_equal(
        grouped,
        vec![
            ("a".to_string(), vec![1, 3, 6]),
            ("b".to_string(), vec![2, 5]),
            ("c".to_string(), vec![4]),
        ],
    );
}

#[test]
fn partition_by_preserves_every_record_under_a_custom_partitioner() {
    let context = Context::default();
    let config = RunnerConfig::default();

    let pairs: Vec<(i32, String)> = (0..40).map(|i| (i, format!("v{i}"))).collect();
    let partitioner: Arc<HashPartitioner<i32>> = Arc::new(HashPartitioner::new(6));
    let repartitioned = from_vec(&context, pairs.clone(), 3)
        .partition_by(partitioner)
        .collect(&config)
        .unwrap();

    assert_kv_collections_equal(repartitioned, pairs);
}

#[test]
fn co_group_pairs_up_every_key_present_on_either_side() {
    let context = Context::default();
    let config = RunnerConfig::default();

    let left = from_vec(
        &context,
        vec![("x".to_string(), 1), ("y".to_string(), 2), ("x".to_string(), 3)],
        2,
    );
    let right = from_vec(
        &context,
        vec![("x".to_string(), "hello".to_string()), ("z".to_string(), "world".to_string())],
        2,
    );

    let joined = left.co_group(&right, 3).collect(&config).unwrap();
    let mut by_key: std::collections::HashMap<String, (Vec<i32>, Vec<String>)> = std::collections::HashMap::new();
    for (k, v) in joined {
        by_key.insert(k, v);
    }

    let (xv, xw) = by_key.get("x").unwrap();
    assert_collections_unordered_equal(xv, &[1, 3]);
    assert_collections_unordered_equal(xw, &["hello".to_string()]);

    let (yv, yw) = by_key.get("y").unwrap();
    assert_eq!(yv, &[2]);
    assert!(yw.is_empty());

    let (zv, zw) = by_key.get("z").unwrap();
    assert!(zv.is_empty());
    assert_eq!(zw, &["world".to_string()]);
}

#[test]
fn cartesian_produces_the_full_cross_product() {
    let context = Context::default();
    let config = RunnerConfig::default();

    let left = from_vec(&context, vec![1, 2, 3], 2);
    let right = from_vec(&context, vec!["a".to_string(), "b".to_string()], 2);

    let mut product = left.cartesian(&right).collect(&config).unwrap();
    product.sort();

    let mut expected: Vec<(i32, String)> = Vec::new();
    for l in [1, 2, 3] {
        for r in ["a", "b"] {
            expected.push((l, r.to_string()));
        }
    }
    expected.sort();
    assert_eq!(product, expected);
}

#[test]
fn distinct_removes_duplicates_across_partition_boundaries() {
    let context = Context::default();
    let config = RunnerConfig::default();

    let values = vec![1, 2, 2, 3, 1, 4, 3, 3, 5];
    let mut deduped = from_vec(&context, values, 3).distinct(4).collect(&config).unwrap();
    deduped.sort();
    assert_eq!(deduped, vec![1, 2, 3, 4, 5]);
}

#[test]
fn distinct_count_matches_set_cardinality() {
    let context = Context::default();
    let config = RunnerConfig::default();

    let values: Vec<i32> = (0..200).map(|i| i % 17).collect();
    let expected_count = (0..17).count();
    let actual_count = from_vec(&context, values, 5).distinct(3).count(&config).unwrap();
    assert_eq!(actual_count, expected_count);
}
