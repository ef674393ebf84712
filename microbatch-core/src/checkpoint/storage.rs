use super::*;

/// Storage interface for checkpoint metadata and per-node snapshots.
pub trait CheckpointStorage: Send + Sync {
    fn save_checkpoint(&self, metadata: CheckpointMetadata) -> Result<()>;
    fn save_node_state(&self, batch_time: BatchTime, node_id: NodeId, state: Vec<u8>)
        -> Result<()>;
    fn load_checkpoint(&self, batch_time: BatchTime) -> Result<CheckpointMetadata>;
    fn load_node_state(&self, batch_time: BatchTime, node_id: NodeId) -> Result<Vec<u8>>;
    /// Batch times with saved metadata, oldest first.
    fn list_checkpoints(&self) -> Result<Vec<BatchTime>>;
    fn purge(&self, keep_last_n: usize) -> Result<()>;

    /// Metadata of the newest complete checkpoint.
    fn latest(&self) -> Result<Option<CheckpointMetadata>> {
        match self.list_checkpoints()?.last() {
            Some(time) => self.load_checkpoint(*time).map(Some),
            None => Ok(None),
        }
    }
}

/// In-memory checkpoint storage for tests and runs without a checkpoint directory.
#[derive(Default)]
pub struct InMemoryCheckpointStorage {
    metadata: Mutex<BTreeMap<BatchTime, CheckpointMetadata>>,
    node_states: Mutex<HashMap<(BatchTime, NodeId), Vec<u8>>>,
}

impl InMemoryCheckpointStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStorage for InMemoryCheckpointStorage {
    fn save_checkpoint(&self, metadata: CheckpointMetadata) -> Result<()> {
        self.metadata
            .lock()
            .map_err(|_| anyhow!("checkpoint metadata lock poisoned"))?
            .insert(metadata.batch_time, metadata);
        Ok(())
    }

    fn save_node_state(
        &self,
        batch_time: BatchTime,
        node_id: NodeId,
        state: Vec<u8>,
    ) -> Result<()> {
        self.node_states
            .lock()
            .map_err(|_| anyhow!("checkpoint node-state lock poisoned"))?
            .insert((batch_time, node_id), state);
        Ok(())
    }

    fn load_checkpoint(&self, batch_time: BatchTime) -> Result<CheckpointMetadata> {
        self.metadata
            .lock()
            .map_err(|_| anyhow!("checkpoint metadata lock poisoned"))?
            .get(&batch_time)
            .cloned()
            .ok_or_else(|| anyhow!("checkpoint at {batch_time} not found"))
    }

    fn load_node_state(&self, batch_time: BatchTime, node_id: NodeId) -> Result<Vec<u8>> {
        self.node_states
            .lock()
            .map_err(|_| anyhow!("checkpoint node-state lock poisoned"))?
            .get(&(batch_time, node_id))
            .cloned()
            .ok_or_else(|| anyhow!("state of node {node_id} not found in checkpoint at {batch_time}"))
    }

    fn list_checkpoints(&self) -> Result<Vec<BatchTime>> {
        Ok(self
            .metadata
            .lock()
            .map_err(|_| anyhow!("checkpoint metadata lock poisoned"))?
            .keys()
            .copied()
            .collect())
    }

    fn purge(&self, keep_last_n: usize) -> Result<()> {
        let times = self.list_checkpoints()?;
        if times.len() <= keep_last_n {
            return Ok(());
        }
        let cutoff = times[times.len() - keep_last_n - 1];

        let mut meta_guard = self
            .metadata
            .lock()
            .map_err(|_| anyhow!("checkpoint metadata lock poisoned"))?;
        let mut state_guard = self
            .node_states
            .lock()
            .map_err(|_| anyhow!("checkpoint node-state lock poisoned"))?;

        meta_guard.retain(|time, _| *time > cutoff);
        state_guard.retain(|(time, _), _| *time > cutoff);
        Ok(())
    }
}

/// File-system checkpoint storage: `chk-<ms>/metadata.bin` plus one
/// `node-<id>.bin` per saved node.
pub struct FsCheckpointStorage {
    base_path: PathBuf,
}

impl FsCheckpointStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).with_context(|| {
            format!(
                "failed to create checkpoint storage directory {}",
                base_path.display()
            )
        })?;
        Ok(Self { base_path })
    }

    fn checkpoint_dir(&self, batch_time: BatchTime) -> PathBuf {
        self.base_path.join(format!("chk-{}", batch_time.millis()))
    }

    fn metadata_path(&self, batch_time: BatchTime) -> PathBuf {
        self.checkpoint_dir(batch_time).join("metadata.bin")
    }

    fn node_state_path(&self, batch_time: BatchTime, node_id: NodeId) -> PathBuf {
        self.checkpoint_dir(batch_time)
            .join(format!("node-{node_id}.bin"))
    }

    fn ensure_checkpoint_dir(&self, batch_time: BatchTime) -> Result<()> {
        let dir = self.checkpoint_dir(batch_time);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create checkpoint dir {}", dir.display()))
    }
}

impl CheckpointStorage for FsCheckpointStorage {
    /// Metadata is written last, so a directory without it is an
    /// unfinished checkpoint and is not listed.
    fn save_checkpoint(&self, metadata: CheckpointMetadata) -> Result<()> {
        self.ensure_checkpoint_dir(metadata.batch_time)?;
        let bytes =
            bincode::serialize(&metadata).context("serialize checkpoint metadata failed")?;
        fs::write(self.metadata_path(metadata.batch_time), bytes)
            .context("write checkpoint metadata failed")
    }

    fn save_node_state(
        &self,
        batch_time: BatchTime,
        node_id: NodeId,
        state: Vec<u8>,
    ) -> Result<()> {
        self.ensure_checkpoint_dir(batch_time)?;
        fs::write(self.node_state_path(batch_time, node_id), state)
            .context("write checkpoint node state failed")
    }

    fn load_checkpoint(&self, batch_time: BatchTime) -> Result<CheckpointMetadata> {
        let bytes = fs::read(self.metadata_path(batch_time))
            .context("read checkpoint metadata failed")?;
        bincode::deserialize(&bytes).context("deserialize checkpoint metadata failed")
    }

    fn load_node_state(&self, batch_time: BatchTime, node_id: NodeId) -> Result<Vec<u8>> {
        fs::read(self.node_state_path(batch_time, node_id))
            .context("read checkpoint node state failed")
    }

    fn list_checkpoints(&self) -> Result<Vec<BatchTime>> {
        let mut times = Vec::new();
        for entry in fs::read_dir(&self.base_path)
            .with_context(|| format!("read_dir failed for {}", self.base_path.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(ms) = name.strip_prefix("chk-") {
                if let Ok(ms) = ms.parse::<i64>() {
                    let time = BatchTime::from_millis(ms);
                    if self.metadata_path(time).is_file() {
                        times.push(time);
                    }
                }
            }
        }
        times.sort_unstable();
        Ok(times)
    }

    fn purge(&self, keep_last_n: usize) -> Result<()> {
        let times = self.list_checkpoints()?;
        if times.len() <= keep_last_n {
            return Ok(());
        }
        let purge_count = times.len() - keep_last_n;
        for batch_time in times.into_iter().take(purge_count) {
            let dir = self.checkpoint_dir(batch_time);
            if dir.exists() {
                fs::remove_dir_all(&dir)
                    .with_context(|| format!("failed to remove {}", dir.display()))?;
            }
        }
        Ok(())
    }
}
