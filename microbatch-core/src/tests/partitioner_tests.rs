use super::*;

#[test]
fn test_hash_partitioner_same_key_same_partition() {
    let partitioner = HashPartitioner::<String>::new(4);
    let p1 = partitioner.partition(&"user_1".to_string());
    let p2 = partitioner.partition(&"user_1".to_string());
    assert_eq!(p1, p2);
}

#[test]
fn test_hash_partitioner_distribution() {
    let partitioner = HashPartitioner::<String>::new(4);

    let mut counts = vec![0; 4];
    for i in 0..1000 {
        counts[partitioner.partition(&format!("user_{}", i))] += 1;
    }

    // Each partition should get roughly 250 keys (1000 / 4).
    for count in counts {
        assert!(
            count > 200 && count < 300,
            "Unbalanced distribution: {}",
            count
        );
    }
}

#[test]
fn test_hash_partitioner_within_bounds() {
    let partitioner = HashPartitioner::<i64>::new(8);
    for i in 0..100 {
        assert!(partitioner.partition(&i) < 8);
    }
}

#[test]
fn test_custom_hash_fn() {
    // Route every key by its own value.
    let partitioner = HashPartitioner::with_hash_fn(3, Arc::new(|k: &u64| *k));
    assert_eq!(partitioner.partition(&0), 0);
    assert_eq!(partitioner.partition(&4), 1);
    assert_eq!(partitioner.partition(&5), 2);
}

#[test]
fn test_portable_hash_is_stable() {
    assert_eq!(portable_hash("word"), portable_hash(&"word".to_string()));
}

#[test]
fn test_round_robin_partitioner() {
    let partitioner = RoundRobinPartitioner::new(4);
    let seen: Vec<usize> = (0..5)
        .map(|_| Partitioner::<()>::partition(&partitioner, &()))
        .collect();
    assert_eq!(seen, vec![0, 1, 2, 3, 0]);
}
