//! # Dataset
//!
//! The per-batch parallel collection the dataflow graph composes calls into.
//!
//! A [`Dataset`] is an immutable handle over a list of partitions. Every
//! operation builds a new handle and never mutates its input, so a dataset
//! generated for one batch can be shared by any number of downstream nodes.
//!
//! This is the in-process executor: partitions are plain vectors evaluated
//! eagerly on the calling thread. Keyed operations shuffle through a
//! [`HashPartitioner`](crate::partitioner::HashPartitioner) and merge values
//! in input-partition order, so a list-append reduce sees values in the
//! order they arrived.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::partitioner::{Partitioner, RoundRobinPartitioner};

mod keyed;

/// An immutable, partitioned collection of `T`.
pub struct Dataset<T> {
    partitions: Arc<Vec<Vec<T>>>,
    /// True when rows are `(K, V)` laid out by the default key hash.
    hash_partitioned: bool,
}

impl<T> Clone for Dataset<T> {
    fn clone(&self) -> Self {
        Self {
            partitions: Arc::clone(&self.partitions),
            hash_partitioned: self.hash_partitioned,
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Dataset<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("partitions", &self.partitions)
            .finish()
    }
}

impl<T> Default for Dataset<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Dataset<T> {
    /// A dataset with no partitions.
    pub fn empty() -> Self {
        Self::from_partitions(Vec::new())
    }

    /// Wrap pre-built partitions.
    pub fn from_partitions(partitions: Vec<Vec<T>>) -> Self {
        Self {
            partitions: Arc::new(partitions),
            hash_partitioned: false,
        }
    }

    pub(crate) fn with_hash_partitioning(mut self, hash_partitioned: bool) -> Self {
        self.hash_partitioned = hash_partitioned;
        self
    }

    /// Split `data` into `num_partitions` contiguous slices.
    pub fn parallelize(data: Vec<T>, num_partitions: usize) -> Self {
        let num_partitions = num_partitions.max(1);
        let len = data.len();
        let mut partitions: Vec<Vec<T>> = (0..num_partitions).map(|_| Vec::new()).collect();
        for (i, item) in data.into_iter().enumerate() {
            // Same slicing as `i * n / len`, kept contiguous and ordered.
            partitions[i * num_partitions / len.max(1)].push(item);
        }
        Self::from_partitions(partitions)
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    pub fn partitions(&self) -> &[Vec<T>] {
        &self.partitions
    }

    pub fn count(&self) -> usize {
        self.partitions.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Iterate all elements, partition by partition.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.partitions.iter().flat_map(|p| p.iter())
    }

    pub fn is_hash_partitioned(&self) -> bool {
        self.hash_partitioned
    }
}

impl<T: Clone> Dataset<T> {
    /// Gather every element, in partition order.
    pub fn collect(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    /// The first `n` elements in partition order.
    pub fn take(&self, n: usize) -> Vec<T> {
        self.iter().take(n).cloned().collect()
    }

    pub fn map<U, F>(&self, f: F) -> Dataset<U>
    where
        F: Fn(&T) -> U,
    {
        let partitions = self
            .partitions
            .iter()
            .map(|p| p.iter().map(&f).collect())
            .collect();
        Dataset::from_partitions(partitions)
    }

    pub fn flat_map<U, I, F>(&self, f: F) -> Dataset<U>
    where
        I: IntoIterator<Item = U>,
        F: Fn(&T) -> I,
    {
        let partitions = self
            .partitions
            .iter()
            .map(|p| p.iter().flat_map(&f).collect())
            .collect();
        Dataset::from_partitions(partitions)
    }

    pub fn filter<F>(&self, f: F) -> Dataset<T>
    where
        F: Fn(&T) -> bool,
    {
        let partitions = self
            .partitions
            .iter()
            .map(|p| p.iter().filter(|x| f(x)).cloned().collect())
            .collect();
        Dataset::from_partitions(partitions).with_hash_partitioning(self.hash_partitioned)
    }

    /// Apply `f` to each partition together with its index.
    ///
    /// With `preserves_partitioning` the output keeps the input's key layout,
    /// which lets a later shuffle with the same partition count be skipped.
    pub fn map_partitions_with_index<U, F>(&self, f: F, preserves_partitioning: bool) -> Dataset<U>
    where
        F: Fn(usize, &[T]) -> Vec<U>,
    {
        let partitions = self
            .partitions
            .iter()
            .enumerate()
            .map(|(i, p)| f(i, p))
            .collect();
        Dataset::from_partitions(partitions)
            .with_hash_partitioning(preserves_partitioning && self.hash_partitioned)
    }

    pub fn map_partitions<U, F>(&self, f: F, preserves_partitioning: bool) -> Dataset<U>
    where
        F: Fn(&[T]) -> Vec<U>,
    {
        self.map_partitions_with_index(|_, p| f(p), preserves_partitioning)
    }

    /// One element per partition holding all of that partition's rows.
    pub fn glom(&self) -> Dataset<Vec<T>> {
        self.map_partitions(|p| vec![p.to_vec()], false)
    }

    /// Fold all elements with `f`; `None` for an empty dataset.
    pub fn reduce<F>(&self, f: F) -> Option<T>
    where
        F: Fn(T, T) -> T,
    {
        self.iter().cloned().reduce(f)
    }

    /// Concatenate the partitions of both datasets.
    pub fn union(&self, other: &Dataset<T>) -> Dataset<T> {
        let mut partitions = Vec::with_capacity(self.num_partitions() + other.num_partitions());
        partitions.extend(self.partitions.iter().cloned());
        partitions.extend(other.partitions.iter().cloned());
        Dataset::from_partitions(partitions)
    }

    /// Concatenate many datasets in order.
    pub fn union_all<'a, I>(datasets: I) -> Dataset<T>
    where
        I: IntoIterator<Item = &'a Dataset<T>>,
        T: 'a,
    {
        let partitions = datasets
            .into_iter()
            .flat_map(|d| d.partitions.iter().cloned())
            .collect();
        Dataset::from_partitions(partitions)
    }

    /// Redistribute rows round-robin over `num_partitions` partitions.
    pub fn repartition(&self, num_partitions: usize) -> Dataset<T> {
        let partitioner = RoundRobinPartitioner::new(num_partitions);
        let mut partitions: Vec<Vec<T>> = (0..num_partitions.max(1)).map(|_| Vec::new()).collect();
        for item in self.iter() {
            partitions[partitioner.partition(item)].push(item.clone());
        }
        Dataset::from_partitions(partitions)
    }
}

impl<T: Serialize> Dataset<T> {
    /// Serialize the partitions for checkpoint storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(&*self.partitions).context("serialize dataset snapshot failed")
    }
}

impl<T: DeserializeOwned> Dataset<T> {
    /// Rebuild a dataset serialized with [`Dataset::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let partitions: Vec<Vec<T>> =
            bincode::deserialize(bytes).context("deserialize dataset snapshot failed")?;
        Ok(Self::from_partitions(partitions))
    }
}

#[cfg(test)]
#[path = "tests/dataset_tests.rs"]
mod tests;
