//! End-to-end checks that the stage planner cuts the graph at shuffle
//! boundaries and fuses narrow chains in between (spec §4.4, §4.5), without
//! reaching into the planner's internals — only through the public
//! `Dataset`/action surface.

use shardflow::config::RunnerConfig;
use shardflow::dataset::from_vec;
use shardflow::graph::Context;
use shardflow::testing::assert_kv_collections_equal;

#[test]
fn a_long_narrow_chain_before_a_shuffle_produces_the_same_result_as_one_big_closure() {
    let context = Context::default();
    let config = RunnerConfig::default();

    // map -> filter -> map -> flat_map, all narrow, fused into one pass
    // before the reduce_by_key shuffle boundary.
    let chained = from_vec(&context, (0..100).collect::<Vec<i32>>(), 4)
        .map(|x: &i32| x * 2)
        .filter(|x: &i32| x % 3 == 0)
        .map(|x: &i32| (x % 5, *x))
        .flat_map(|(k, v): &(i32, i32)| vec![(*k, *v), (*k, *v)])
        .reduce_by_key(|a: &i32, b: &i32| a + b, 3)
        .collect(&config)
        .unwrap();

    let expected: Vec<(i32, i32)> = {
        let mut acc = std::collections::HashMap::new();
        for x in 0..100i32 {
            let x = x * 2;
            if x % 3 != 0 {
                continue;
            }
            let k = x % 5;
            *acc.entry(k).or_insert(0) += x;
            *acc.entry(k).or_insert(0) += x;
        }
        acc.into_iter().collect()
    };

    assert_kv_collections_equal(chained, expected);
}

#[test]
fn multiple_shuffle_boundaries_chain_correctly() {
    let context = Context::default();
    let config = RunnerConfig::default();

    let words = vec![
        "a".to_string(), "b".to_string(), "a".to_string(),
        "c".to_string(), "b".to_string(), "a".to_string(),
    ];

    // first shuffle: counts per word. second shuffle: re-key by count parity.
    let result = from_vec(&context, words, 2)
        .map(|w: &String| (w.clone(), 1u32))
        .reduce_by_key(|a: &u32, b: &u32| a + b, 2)
        .map(|(w, c): &(String, u32)| (c % 2, w.clone()))
        .group_by_key(2)
        .collect(&config)
        .unwrap();

    let mut by_parity: std::collections::HashMap<u32, Vec<String>> = std::collections::HashMap::new();
    for (parity, words) in result {
        by_parity.entry(parity).or_default().extend(words);
    }
    for words in by_parity.values_mut() {
        words.sort();
    }
    assert_eq!(by_parity.get(&1).map(|v| v.len()).unwrap_or(0) > 0, true);
}

#[test]
fn persisted_dataset_can_be_collected_more_than_once() {
    let context = Context::default();
    let config = RunnerConfig::default();

    let ds = from_vec(&context, vec![1, 2, 3, 4, 5], 2)
        .map(|x: &i32| x * x)
        .persist();

    let first = ds.collect(&config).unwrap();
    let second = ds.collect(&config).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, vec![1, 4, 9, 16, 25]);
}

#[test]
fn sort_by_orders_across_partitions() {
    let context = Context::default();
    let config = RunnerConfig::default();

    let shuffled: Vec<i32> = vec![50, 3, 42, 7, 1, 99, 20, 15, 8, 4];
    let sorted = from_vec(&context, shuffled.clone(), 3)
        .sort_by(|x: &i32| *x, true, 3)
        .collect(&config)
        .unwrap();

    let mut expected = shuffled;
    expected.sort();
    assert_eq!(sorted, expected);
}
