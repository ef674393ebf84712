use super::*;

/// Persisted description of one checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointMetadata {
    pub batch_time: BatchTime,
    pub app_name: String,
    /// Nodes whose generated dataset was saved with this checkpoint.
    pub node_ids: Vec<NodeId>,
}
