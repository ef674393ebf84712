use super::*;

/// Owned key-to-state table carried across batches.
#[derive(Debug, Clone)]
pub struct KeyedStateStore<K, S> {
    entries: HashMap<K, S>,
    /// Batch time of the last update applied.
    last_time: Option<BatchTime>,
}

impl<K, S> Default for KeyedStateStore<K, S> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            last_time: None,
        }
    }
}

impl<K: StreamKey, S: StreamData> KeyedStateStore<K, S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store from `(key, state)` rows; a later row wins over an earlier one.
    pub fn from_dataset(data: &Dataset<(K, S)>) -> Self {
        Self {
            entries: data.iter().cloned().collect(),
            last_time: None,
        }
    }

    pub fn get(&self, key: &K) -> Option<&S> {
        self.entries.get(key)
    }

    pub fn put(&mut self, key: K, state: S) -> Option<S> {
        self.entries.insert(key, state)
    }

    pub fn remove(&mut self, key: &K) -> Option<S> {
        self.entries.remove(key)
    }

    /// Store `Some` state for `key`, or delete the key on `None`.
    pub fn apply(&mut self, key: &K, state: Option<S>) {
        match state {
            Some(state) => {
                self.entries.insert(key.clone(), state);
            }
            None => {
                self.entries.remove(key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_time(&self) -> Option<BatchTime> {
        self.last_time
    }

    pub fn set_last_time(&mut self, time: BatchTime) {
        self.last_time = Some(time);
    }

    /// Current table as a dataset hash-partitioned into `num_partitions`.
    pub fn to_dataset(&self, num_partitions: usize) -> Dataset<(K, S)> {
        let rows: Vec<(K, S)> = self
            .entries
            .iter()
            .map(|(k, s)| (k.clone(), s.clone()))
            .collect();
        Dataset::parallelize(rows, 1).partition_by(num_partitions)
    }
}
