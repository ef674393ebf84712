use tracing::debug;

use super::*;

/// Node running `update_state_by_key`: co-groups the previous state table
/// with the batch's values and applies the update function to every key
/// present on either side.
///
/// The output element type is the state type, and the node carries memory
/// across batches, so it is never fused with its consumers.
pub struct StateNode<K: StreamKey, V: StreamData, S: StreamData> {
    info: NodeInfo,
    parent: NodeRef<(K, V)>,
    update: UpdateFn<V, S>,
    num_partitions: usize,
    store: Mutex<KeyedStateStore<K, S>>,
    generated: GeneratedBatches<(K, S)>,
}

impl<K: StreamKey, V: StreamData, S: StreamData> StateNode<K, V, S> {
    pub fn new(
        info: NodeInfo,
        parent: NodeRef<(K, V)>,
        update: UpdateFn<V, S>,
        num_partitions: usize,
        initial: Option<&Dataset<(K, S)>>,
    ) -> Self {
        let store = initial
            .map(KeyedStateStore::from_dataset)
            .unwrap_or_default();
        Self {
            info,
            parent,
            update,
            num_partitions: num_partitions.max(1),
            store: Mutex::new(store),
            generated: GeneratedBatches::new(),
        }
    }

    /// Number of keys currently holding state.
    pub fn state_len(&self) -> Result<usize> {
        Ok(self
            .store
            .lock()
            .map_err(|_| anyhow!("state store lock poisoned"))?
            .len())
    }
}

impl<K: StreamKey, V: StreamData, S: StreamData> Node for StateNode<K, V, S> {
    type Output = (K, S);

    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn parents(&self) -> Vec<Arc<dyn AnyNode>> {
        vec![Arc::clone(self.parent.erased())]
    }

    fn compute(&self, time: BatchTime) -> Result<Option<Dataset<(K, S)>>> {
        let batch = self.parent.get_or_compute(time)?.unwrap_or_default();
        let mut store = self
            .store
            .lock()
            .map_err(|_| anyhow!("state store lock poisoned"))?;
        if let Some(last) = store.last_time() {
            if time <= last {
                return Err(anyhow!(
                    "state of node {} has advanced to {last}; batch {time} can no longer be recomputed",
                    self.info.id()
                ));
            }
        }

        let grouped = store
            .to_dataset(self.num_partitions)
            .cogroup(&batch, self.num_partitions);
        let mut removed = 0usize;
        for (key, (states, values)) in grouped.iter() {
            let next = (self.update)(values, states.first());
            if next.is_none() {
                removed += 1;
            }
            store.apply(key, next);
        }
        store.set_last_time(time);
        debug!(
            node = self.info.id(),
            %time,
            keys = store.len(),
            removed,
            "updated keyed state"
        );
        Ok(Some(store.to_dataset(self.num_partitions)))
    }

    fn generated(&self) -> &GeneratedBatches<(K, S)> {
        &self.generated
    }

    fn restore_batch(&self, time: BatchTime, data: Dataset<(K, S)>) -> Result<()> {
        let mut restored = KeyedStateStore::from_dataset(&data);
        restored.set_last_time(time);
        *self
            .store
            .lock()
            .map_err(|_| anyhow!("state store lock poisoned"))? = restored;
        self.generated.insert(time, data)
    }
}
