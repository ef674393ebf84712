//! # Partitioner
//!
//! Strategies for routing records to the partitions of a [`Dataset`](crate::dataset::Dataset).

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ahash::AHasher;

/// User-supplied key hash used by `partition_by`.
pub type HashFn<K> = Arc<dyn Fn(&K) -> u64 + Send + Sync>;

/// Default key hash: stable across processes for the same key.
///
/// Uses ahash with its fixed default keys.
pub fn portable_hash<K: Hash + ?Sized>(key: &K) -> u64 {
    let mut hasher = AHasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Trait for assigning values to one of `num_partitions()` partitions.
pub trait Partitioner<T>: Send + Sync {
    /// Number of target partitions.
    fn num_partitions(&self) -> usize;

    /// Determine which partition (0..num_partitions) this value should go to.
    fn partition(&self, value: &T) -> usize;
}

/// Hash partitioner over keys.
pub struct HashPartitioner<K> {
    num_partitions: usize,
    hash_fn: HashFn<K>,
}

impl<K: Hash + 'static> HashPartitioner<K> {
    /// Partition by [`portable_hash`] of the key.
    pub fn new(num_partitions: usize) -> Self {
        Self::with_hash_fn(num_partitions, Arc::new(|k: &K| portable_hash(k)))
    }
}

impl<K> HashPartitioner<K> {
    /// Partition by a custom key hash.
    pub fn with_hash_fn(num_partitions: usize, hash_fn: HashFn<K>) -> Self {
        Self {
            num_partitions: num_partitions.max(1),
            hash_fn,
        }
    }
}

impl<K> Clone for HashPartitioner<K> {
    fn clone(&self) -> Self {
        Self {
            num_partitions: self.num_partitions,
            hash_fn: Arc::clone(&self.hash_fn),
        }
    }
}

impl<K> Partitioner<K> for HashPartitioner<K> {
    fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    fn partition(&self, key: &K) -> usize {
        ((self.hash_fn)(key) % self.num_partitions as u64) as usize
    }
}

/// Round-robin partitioner used by `repartition`.
pub struct RoundRobinPartitioner {
    num_partitions: usize,
    counter: AtomicUsize,
}

impl RoundRobinPartitioner {
    pub fn new(num_partitions: usize) -> Self {
        Self {
            num_partitions: num_partitions.max(1),
            counter: AtomicUsize::new(0),
        }
    }
}

impl<T> Partitioner<T> for RoundRobinPartitioner {
    fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    fn partition(&self, _value: &T) -> usize {
        self.counter.fetch_add(1, Ordering::Relaxed) % self.num_partitions
    }
}

#[cfg(test)]
#[path = "tests/partitioner_tests.rs"]
mod tests;
