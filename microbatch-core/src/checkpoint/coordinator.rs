use super::*;

/// Writes periodic snapshots of checkpointed nodes and restores them on recovery.
///
/// A node is due at `t` when `t - zero_time` is a multiple of its checkpoint
/// interval. All nodes due at the same tick share one checkpoint.
pub struct CheckpointCoordinator {
    storage: Arc<dyn CheckpointStorage>,
    app_name: String,
    retained_checkpoints: usize,
    nodes: Mutex<Vec<Arc<dyn AnyNode>>>,
}

impl CheckpointCoordinator {
    pub fn new(storage: Arc<dyn CheckpointStorage>, app_name: impl Into<String>) -> Self {
        Self {
            storage,
            app_name: app_name.into(),
            retained_checkpoints: 3,
            nodes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_retained_checkpoints(mut self, retained_checkpoints: usize) -> Self {
        self.retained_checkpoints = retained_checkpoints.max(1);
        self
    }

    pub fn storage(&self) -> &Arc<dyn CheckpointStorage> {
        &self.storage
    }

    /// Track a checkpointed node. Registering the same id twice is a no-op.
    pub fn register(&self, node: Arc<dyn AnyNode>) -> Result<()> {
        let mut nodes = self
            .nodes
            .lock()
            .map_err(|_| anyhow!("checkpoint node registry lock poisoned"))?;
        let id = node.node_info().id();
        if !nodes.iter().any(|n| n.node_info().id() == id) {
            nodes.push(node);
        }
        Ok(())
    }

    pub fn registered_ids(&self) -> Result<Vec<NodeId>> {
        Ok(self
            .nodes
            .lock()
            .map_err(|_| anyhow!("checkpoint node registry lock poisoned"))?
            .iter()
            .map(|n| n.node_info().id())
            .collect())
    }

    fn due_nodes(&self, time: BatchTime) -> Result<Vec<Arc<dyn AnyNode>>> {
        Ok(self
            .nodes
            .lock()
            .map_err(|_| anyhow!("checkpoint node registry lock poisoned"))?
            .iter()
            .filter(|node| {
                let info = node.node_info();
                match info.checkpoint_interval_ms() {
                    Some(interval) => {
                        time > info.zero_time() && time.is_aligned(info.zero_time(), interval)
                    }
                    None => false,
                }
            })
            .cloned()
            .collect())
    }

    /// Snapshot every node due at `time`. Returns the written metadata, or
    /// `None` when nothing was due.
    pub fn maybe_checkpoint(&self, time: BatchTime) -> Result<Option<CheckpointMetadata>> {
        let due = self.due_nodes(time)?;
        if due.is_empty() {
            return Ok(None);
        }

        let mut node_ids = Vec::with_capacity(due.len());
        for node in due {
            let id = node.node_info().id();
            // Checkpointed nodes are evaluated even when no output reached them.
            node.get_or_compute_any(time)
                .with_context(|| format!("failed to evaluate node {id} for checkpoint"))?;
            let Some(bytes) = node.snapshot(time)? else {
                continue;
            };
            self.storage.save_node_state(time, id, bytes)?;
            node_ids.push(id);
        }
        if node_ids.is_empty() {
            return Ok(None);
        }

        let metadata = CheckpointMetadata {
            batch_time: time,
            app_name: self.app_name.clone(),
            node_ids,
        };
        self.storage.save_checkpoint(metadata.clone())?;
        self.storage.purge(self.retained_checkpoints)?;
        info!(
            %time,
            nodes = metadata.node_ids.len(),
            "checkpoint written"
        );
        Ok(Some(metadata))
    }

    /// Re-seed registered nodes from the latest checkpoint and return its
    /// batch time. Saved nodes that are no longer registered are skipped.
    pub fn recover(&self) -> Result<Option<BatchTime>> {
        let Some(metadata) = self.storage.latest()? else {
            return Ok(None);
        };
        if metadata.app_name != self.app_name {
            warn!(
                saved = %metadata.app_name,
                current = %self.app_name,
                "checkpoint was written by another application"
            );
        }
        let time = metadata.batch_time;
        let nodes = self
            .nodes
            .lock()
            .map_err(|_| anyhow!("checkpoint node registry lock poisoned"))?
            .clone();
        for id in &metadata.node_ids {
            let Some(node) = nodes.iter().find(|n| n.node_info().id() == *id) else {
                warn!(node = id, %time, "checkpointed node is not in the current graph");
                continue;
            };
            let bytes = self.storage.load_node_state(time, *id)?;
            node.restore(time, &bytes)
                .with_context(|| format!("failed to restore node {id} at {time}"))?;
        }
        info!(%time, nodes = metadata.node_ids.len(), "recovered from checkpoint");
        Ok(Some(time))
    }
}
