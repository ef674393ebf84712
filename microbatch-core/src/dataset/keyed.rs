use std::collections::HashMap;
use std::hash::Hash;

use super::Dataset;
use crate::partitioner::{HashPartitioner, Partitioner};

/// Per-partition key table that remembers first-seen key order.
struct KeyedBuckets<K, C> {
    index: HashMap<K, usize>,
    entries: Vec<(K, Option<C>)>,
}

impl<K: Clone + Eq + Hash, C> KeyedBuckets<K, C> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }

    fn slot(&mut self, key: &K) -> &mut Option<C> {
        let pos = match self.index.get(key) {
            Some(&pos) => pos,
            None => {
                let pos = self.entries.len();
                self.index.insert(key.clone(), pos);
                self.entries.push((key.clone(), None));
                pos
            }
        };
        &mut self.entries[pos].1
    }

    fn into_rows(self) -> Vec<(K, C)> {
        self.entries
            .into_iter()
            .filter_map(|(k, c)| c.map(|c| (k, c)))
            .collect()
    }
}

fn buckets<K: Clone + Eq + Hash, C>(n: usize) -> Vec<KeyedBuckets<K, C>> {
    (0..n).map(|_| KeyedBuckets::new()).collect()
}

impl<K: Clone, V: Clone> Dataset<(K, V)> {
    /// Transform values, keeping keys and their partition layout.
    pub fn map_values<U, F>(&self, f: F) -> Dataset<(K, U)>
    where
        F: Fn(&V) -> U,
    {
        let partitions = self
            .partitions
            .iter()
            .map(|p| p.iter().map(|(k, v)| (k.clone(), f(v))).collect())
            .collect();
        Dataset::from_partitions(partitions).with_hash_partitioning(self.hash_partitioned)
    }

    pub fn flat_map_values<U, I, F>(&self, f: F) -> Dataset<(K, U)>
    where
        I: IntoIterator<Item = U>,
        F: Fn(&V) -> I,
    {
        let partitions = self
            .partitions
            .iter()
            .map(|p| {
                p.iter()
                    .flat_map(|(k, v)| f(v).into_iter().map(move |u| (k.clone(), u)))
                    .collect()
            })
            .collect();
        Dataset::from_partitions(partitions).with_hash_partitioning(self.hash_partitioned)
    }
}

impl<K, V> Dataset<(K, V)>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone,
{
    /// Hash-partition rows by key into `num_partitions` partitions.
    ///
    /// A dataset already laid out by the default hash with the same
    /// partition count is returned as is.
    pub fn partition_by(&self, num_partitions: usize) -> Dataset<(K, V)> {
        let num_partitions = num_partitions.max(1);
        if self.hash_partitioned && self.num_partitions() == num_partitions {
            return self.clone();
        }
        self.shuffle(&HashPartitioner::new(num_partitions))
            .with_hash_partitioning(true)
    }

    /// Partition rows with a caller-supplied partitioner.
    pub fn partition_by_with(&self, partitioner: &HashPartitioner<K>) -> Dataset<(K, V)> {
        self.shuffle(partitioner)
    }

    fn shuffle(&self, partitioner: &HashPartitioner<K>) -> Dataset<(K, V)> {
        let mut partitions: Vec<Vec<(K, V)>> = (0..partitioner.num_partitions())
            .map(|_| Vec::new())
            .collect();
        for (k, v) in self.iter() {
            partitions[partitioner.partition(k)].push((k.clone(), v.clone()));
        }
        Dataset::from_partitions(partitions)
    }

    /// Generic per-key aggregation.
    ///
    /// Values are combined within each input partition first, then the
    /// partial combiners are shuffled and merged in input-partition order.
    pub fn combine_by_key<C, Cr, Mv, Mc>(
        &self,
        create_combiner: Cr,
        merge_value: Mv,
        merge_combiners: Mc,
        num_partitions: usize,
    ) -> Dataset<(K, C)>
    where
        Cr: Fn(V) -> C,
        Mv: Fn(C, V) -> C,
        Mc: Fn(C, C) -> C,
    {
        let partitioner = HashPartitioner::new(num_partitions);
        let mut merged = buckets::<K, C>(partitioner.num_partitions());
        for partition in self.partitions.iter() {
            let mut local = KeyedBuckets::new();
            for (k, v) in partition {
                let slot = local.slot(k);
                *slot = Some(match slot.take() {
                    Some(c) => merge_value(c, v.clone()),
                    None => create_combiner(v.clone()),
                });
            }
            for (k, c) in local.into_rows() {
                let slot = merged[partitioner.partition(&k)].slot(&k);
                *slot = Some(match slot.take() {
                    Some(acc) => merge_combiners(acc, c),
                    None => c,
                });
            }
        }
        let partitions = merged.into_iter().map(KeyedBuckets::into_rows).collect();
        Dataset::from_partitions(partitions).with_hash_partitioning(true)
    }

    /// Merge the values of each key with an associative function.
    pub fn reduce_by_key<F>(&self, f: F, num_partitions: usize) -> Dataset<(K, V)>
    where
        F: Fn(V, V) -> V,
    {
        self.combine_by_key(|v| v, |a, b| f(a, b), |a, b| f(a, b), num_partitions)
    }

    /// Collect the values of each key, in arrival order.
    pub fn group_by_key(&self, num_partitions: usize) -> Dataset<(K, Vec<V>)> {
        self.combine_by_key(
            |v| vec![v],
            |mut acc, v| {
                acc.push(v);
                acc
            },
            |mut a, b| {
                a.extend(b);
                a
            },
            num_partitions,
        )
    }

    /// Group both datasets by key; every key of either side appears once.
    pub fn cogroup<W: Clone>(
        &self,
        other: &Dataset<(K, W)>,
        num_partitions: usize,
    ) -> Dataset<(K, (Vec<V>, Vec<W>))> {
        let partitioner = HashPartitioner::new(num_partitions);
        let mut groups = buckets::<K, (Vec<V>, Vec<W>)>(partitioner.num_partitions());
        for (k, v) in self.iter() {
            groups[partitioner.partition(k)]
                .slot(k)
                .get_or_insert_with(|| (Vec::new(), Vec::new()))
                .0
                .push(v.clone());
        }
        for (k, w) in other.iter() {
            groups[partitioner.partition(k)]
                .slot(k)
                .get_or_insert_with(|| (Vec::new(), Vec::new()))
                .1
                .push(w.clone());
        }
        let partitions = groups.into_iter().map(KeyedBuckets::into_rows).collect();
        Dataset::from_partitions(partitions).with_hash_partitioning(true)
    }

    /// Inner join on key.
    pub fn join<W: Clone>(&self, other: &Dataset<(K, W)>, num_partitions: usize) -> Dataset<(K, (V, W))> {
        self.cogroup(other, num_partitions).map_partitions(
            |rows| {
                let mut out = Vec::new();
                for (k, (vs, ws)) in rows {
                    for v in vs {
                        for w in ws {
                            out.push((k.clone(), (v.clone(), w.clone())));
                        }
                    }
                }
                out
            },
            true,
        )
    }

    /// Every left row, paired with each matching right value or `None`.
    pub fn left_outer_join<W: Clone>(
        &self,
        other: &Dataset<(K, W)>,
        num_partitions: usize,
    ) -> Dataset<(K, (V, Option<W>))> {
        self.cogroup(other, num_partitions).map_partitions(
            |rows| {
                let mut out = Vec::new();
                for (k, (vs, ws)) in rows {
                    for v in vs {
                        if ws.is_empty() {
                            out.push((k.clone(), (v.clone(), None)));
                        }
                        for w in ws {
                            out.push((k.clone(), (v.clone(), Some(w.clone()))));
                        }
                    }
                }
                out
            },
            true,
        )
    }

    /// Every right row, paired with each matching left value or `None`.
    pub fn right_outer_join<W: Clone>(
        &self,
        other: &Dataset<(K, W)>,
        num_partitions: usize,
    ) -> Dataset<(K, (Option<V>, W))> {
        self.cogroup(other, num_partitions).map_partitions(
            |rows| {
                let mut out = Vec::new();
                for (k, (vs, ws)) in rows {
                    for w in ws {
                        if vs.is_empty() {
                            out.push((k.clone(), (None, w.clone())));
                        }
                        for v in vs {
                            out.push((k.clone(), (Some(v.clone()), w.clone())));
                        }
                    }
                }
                out
            },
            true,
        )
    }

    /// Rows of both sides; unmatched values are paired with `None`.
    pub fn full_outer_join<W: Clone>(
        &self,
        other: &Dataset<(K, W)>,
        num_partitions: usize,
    ) -> Dataset<(K, (Option<V>, Option<W>))> {
        self.cogroup(other, num_partitions).map_partitions(
            |rows| {
                let mut out = Vec::new();
                for (k, (vs, ws)) in rows {
                    match (vs.is_empty(), ws.is_empty()) {
                        (true, _) => {
                            out.extend(ws.iter().map(|w| (k.clone(), (None, Some(w.clone())))));
                        }
                        (false, true) => {
                            out.extend(vs.iter().map(|v| (k.clone(), (Some(v.clone()), None))));
                        }
                        (false, false) => {
                            for v in vs {
                                for w in ws {
                                    out.push((k.clone(), (Some(v.clone()), Some(w.clone()))));
                                }
                            }
                        }
                    }
                }
                out
            },
            true,
        )
    }
}
