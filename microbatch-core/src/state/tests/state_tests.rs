use std::collections::BTreeMap;

use super::*;
use crate::graph::{InputQueue, NodeKind, QueueInput};
use crate::types::NodeId;

fn t(secs: i64) -> BatchTime {
    BatchTime::from_secs(secs)
}

fn info(id: NodeId, kind: NodeKind, parents: Vec<NodeId>) -> NodeInfo {
    NodeInfo::new(id, kind, 1000, BatchTime::ZERO, parents)
}

fn queue_of(batches: Vec<Vec<(String, i64)>>) -> NodeRef<(String, i64)> {
    let queue = InputQueue::from_batches(batches.into_iter().map(|b| Dataset::parallelize(b, 2)));
    NodeRef::new(Arc::new(QueueInput::new(
        info(0, NodeKind::Input, vec![]),
        queue,
        true,
        None,
    )))
}

fn running_sum() -> UpdateFn<i64, i64> {
    Arc::new(|values: &[i64], state: Option<&i64>| {
        Some(values.iter().sum::<i64>() + state.copied().unwrap_or(0))
    })
}

fn state_node(
    parent: NodeRef<(String, i64)>,
    update: UpdateFn<i64, i64>,
    initial: Option<&Dataset<(String, i64)>>,
) -> Arc<StateNode<String, i64, i64>> {
    Arc::new(StateNode::new(
        info(1, NodeKind::StateByKey, vec![0]),
        parent,
        update,
        2,
        initial,
    ))
}

fn as_map(ds: &Dataset<(String, i64)>) -> BTreeMap<String, i64> {
    ds.collect().into_iter().collect()
}

fn kv(k: &str, v: i64) -> (String, i64) {
    (k.to_string(), v)
}

#[test]
fn test_store_put_remove_apply() {
    let mut store: KeyedStateStore<String, i64> = KeyedStateStore::new();
    assert!(store.is_empty());
    assert_eq!(store.put("a".to_string(), 1), None);
    assert_eq!(store.put("a".to_string(), 2), Some(1));
    store.apply(&"b".to_string(), Some(5));
    assert_eq!(store.get(&"b".to_string()), Some(&5));
    store.apply(&"a".to_string(), None);
    assert_eq!(store.get(&"a".to_string()), None);
    assert_eq!(store.remove(&"b".to_string()), Some(5));
    assert_eq!(store.len(), 0);
}

#[test]
fn test_store_to_dataset_is_hash_partitioned() {
    let mut store: KeyedStateStore<String, i64> = KeyedStateStore::new();
    for i in 0..10 {
        store.put(format!("k{i}"), i);
    }
    let ds = store.to_dataset(3);
    assert_eq!(ds.num_partitions(), 3);
    assert!(ds.is_hash_partitioned());
    assert_eq!(ds.count(), 10);

    let back = KeyedStateStore::from_dataset(&ds);
    assert_eq!(back.len(), 10);
    assert_eq!(back.get(&"k7".to_string()), Some(&7));
}

#[test]
fn test_running_sum_scenario() {
    let input = queue_of(vec![vec![kv("k", 1)], vec![kv("k", 2)]]);
    let node = state_node(input, running_sum(), None);
    assert_eq!(as_map(&node.get_or_compute(t(1)).unwrap().unwrap())["k"], 1);
    assert_eq!(as_map(&node.get_or_compute(t(2)).unwrap().unwrap())["k"], 3);
}

#[test]
fn test_keys_without_new_values_are_still_updated() {
    let input = queue_of(vec![vec![kv("a", 1), kv("b", 1)], vec![kv("a", 1)]]);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let update: UpdateFn<i64, i64> = Arc::new(move |values: &[i64], state: Option<&i64>| {
        log.lock().unwrap().push(values.len());
        Some(values.len() as i64 + state.copied().unwrap_or(0))
    });
    let node = state_node(input, update, None);
    node.get_or_compute(t(1)).unwrap();
    seen.lock().unwrap().clear();
    let out = as_map(&node.get_or_compute(t(2)).unwrap().unwrap());
    assert_eq!(out, BTreeMap::from([kv("a", 2), kv("b", 1)]));
    let mut calls = seen.lock().unwrap().clone();
    calls.sort();
    assert_eq!(calls, vec![0, 1]);
}

#[test]
fn test_tombstone_removes_key_until_reintroduced() {
    let input = queue_of(vec![
        vec![kv("a", 1), kv("b", 1)],
        vec![kv("a", -1)],
        vec![],
        vec![kv("a", 4)],
    ]);
    // A negative value expires the key.
    let update: UpdateFn<i64, i64> = Arc::new(|values: &[i64], state: Option<&i64>| {
        if values.iter().any(|v| *v < 0) {
            return None;
        }
        Some(values.iter().sum::<i64>() + state.copied().unwrap_or(0))
    });
    let node = state_node(input, update, None);

    assert_eq!(
        as_map(&node.get_or_compute(t(1)).unwrap().unwrap()),
        BTreeMap::from([kv("a", 1), kv("b", 1)])
    );
    assert_eq!(
        as_map(&node.get_or_compute(t(2)).unwrap().unwrap()),
        BTreeMap::from([kv("b", 1)])
    );
    assert_eq!(
        as_map(&node.get_or_compute(t(3)).unwrap().unwrap()),
        BTreeMap::from([kv("b", 1)])
    );
    assert_eq!(node.state_len().unwrap(), 1);
    assert_eq!(
        as_map(&node.get_or_compute(t(4)).unwrap().unwrap()),
        BTreeMap::from([kv("a", 4), kv("b", 1)])
    );
}

#[test]
fn test_initial_state_seeds_first_batch() {
    let input = queue_of(vec![vec![kv("a", 1)]]);
    let initial = Dataset::parallelize(vec![kv("a", 10), kv("z", 5)], 1);
    let node = state_node(input, running_sum(), Some(&initial));
    assert_eq!(
        as_map(&node.get_or_compute(t(1)).unwrap().unwrap()),
        BTreeMap::from([kv("a", 11), kv("z", 5)])
    );
}

#[test]
fn test_memoised_time_is_idempotent_but_cleared_past_time_fails() {
    let input = queue_of(vec![vec![kv("a", 1)], vec![kv("a", 1)]]);
    let node = state_node(input, running_sum(), None);
    node.get_or_compute(t(1)).unwrap();
    node.get_or_compute(t(2)).unwrap();
    // Memoised: same answer, no second update.
    assert_eq!(as_map(&node.get_or_compute(t(2)).unwrap().unwrap())["a"], 2);

    node.clear_metadata(t(4)).unwrap();
    let err = node.get_or_compute(t(2)).unwrap_err();
    assert!(err.to_string().contains("can no longer be recomputed"), "unexpected error: {err}");
}

#[test]
fn test_restore_reseeds_table() {
    let input = queue_of(vec![vec![kv("a", 1)]]);
    let node = state_node(input, running_sum(), None);
    node.restore_batch(t(5), Dataset::parallelize(vec![kv("a", 7)], 1))
        .unwrap();

    assert_eq!(as_map(&node.get_or_compute(t(5)).unwrap().unwrap())["a"], 7);
    // The queue's first batch arrives at the next tick.
    assert_eq!(as_map(&node.get_or_compute(t(6)).unwrap().unwrap())["a"], 8);
}
