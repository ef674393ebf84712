//! # Stream graph
//!
//! The lazy dataflow DAG. Each node produces at most one [`Dataset`] per
//! valid batch time and memoises it, so a node shared by several consumers
//! is evaluated once per tick.
//!
//! - [`Node`] is the typed evaluation interface; [`AnyNode`] is its
//!   type-erased face, used for parent links, fusion and housekeeping.
//! - [`TransformedNode`] is the single-parent stateless stage. Chains of
//!   them are fused at construction time (see [`plan_transform`]).
//! - [`TransformedWithNode`] is the two-parent stage; it is never fused.
//! - [`QueueInput`] and [`ConstantInput`] are the roots.
//! - [`StreamGraph`] is the descriptor registry used for inspection.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Result, anyhow};
use tracing::debug;

use crate::dataset::Dataset;
use crate::types::{BatchTime, NodeId, StreamData};

mod input;
mod stream_graph;
mod transform;

pub use input::*;
pub use stream_graph::*;
pub use transform::*;

/// What a node does, as recorded in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Input,
    Transformed,
    TransformedWith,
    Windowed,
    ReducedWindowed,
    StateByKey,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Input => "Input",
            NodeKind::Transformed => "Transformed",
            NodeKind::TransformedWith => "TransformedWith",
            NodeKind::Windowed => "Windowed",
            NodeKind::ReducedWindowed => "ReducedWindowed",
            NodeKind::StateByKey => "StateByKey",
        };
        f.write_str(name)
    }
}

/// Identity, timing and flags shared by every node.
#[derive(Debug)]
pub struct NodeInfo {
    id: NodeId,
    kind: NodeKind,
    slide_ms: i64,
    zero_time: BatchTime,
    parent_ids: Vec<NodeId>,
    /// Single-parent stateless shape; fixed at construction.
    fusable_shape: bool,
    cached: AtomicBool,
    /// Zero when the node is not checkpointed.
    checkpoint_ms: AtomicI64,
    remember_ms: AtomicI64,
}

impl NodeInfo {
    pub fn new(
        id: NodeId,
        kind: NodeKind,
        slide_ms: i64,
        zero_time: BatchTime,
        parent_ids: Vec<NodeId>,
    ) -> Self {
        let fusable_shape = kind == NodeKind::Transformed && parent_ids.len() == 1;
        Self {
            id,
            kind,
            slide_ms,
            zero_time,
            parent_ids,
            fusable_shape,
            cached: AtomicBool::new(false),
            checkpoint_ms: AtomicI64::new(0),
            remember_ms: AtomicI64::new(slide_ms),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn slide_ms(&self) -> i64 {
        self.slide_ms
    }

    pub fn zero_time(&self) -> BatchTime {
        self.zero_time
    }

    pub fn parent_ids(&self) -> &[NodeId] {
        &self.parent_ids
    }

    pub fn is_cached(&self) -> bool {
        self.cached.load(Ordering::Acquire)
    }

    pub fn set_cached(&self) {
        self.cached.store(true, Ordering::Release);
    }

    pub fn checkpoint_interval_ms(&self) -> Option<i64> {
        match self.checkpoint_ms.load(Ordering::Acquire) {
            0 => None,
            ms => Some(ms),
        }
    }

    pub fn set_checkpoint_interval_ms(&self, interval_ms: i64) {
        self.checkpoint_ms.store(interval_ms, Ordering::Release);
    }

    pub fn is_checkpointed(&self) -> bool {
        self.checkpoint_interval_ms().is_some()
    }

    /// A consumer may fold this node's function into its own.
    pub fn is_fusable(&self) -> bool {
        self.fusable_shape && !self.is_cached() && !self.is_checkpointed()
    }

    /// How far back generated batches are kept.
    pub fn remember_ms(&self) -> i64 {
        self.remember_ms.load(Ordering::Acquire)
    }

    /// Raise the remember duration to at least `ms`; never lowers it.
    pub fn remember_at_least(&self, ms: i64) {
        self.remember_ms.fetch_max(ms, Ordering::AcqRel);
    }

    /// `t` lies after the origin on this node's slide grid.
    pub fn is_valid_time(&self, time: BatchTime) -> bool {
        time > self.zero_time && time.is_aligned(self.zero_time, self.slide_ms)
    }
}

/// Per-node memo of generated datasets, keyed by batch time.
///
/// Also owns the node's compute lock, which serializes evaluation so two
/// threads asking for the same time run `compute` once.
pub struct GeneratedBatches<T> {
    batches: Mutex<BTreeMap<BatchTime, Dataset<T>>>,
    computing: Mutex<()>,
}

impl<T> Default for GeneratedBatches<T> {
    fn default() -> Self {
        Self {
            batches: Mutex::new(BTreeMap::new()),
            computing: Mutex::new(()),
        }
    }
}

impl<T> GeneratedBatches<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<BatchTime, Dataset<T>>>> {
        self.batches
            .lock()
            .map_err(|_| anyhow!("generated batches lock poisoned"))
    }

    pub fn get(&self, time: BatchTime) -> Result<Option<Dataset<T>>> {
        Ok(self.lock()?.get(&time).cloned())
    }

    pub fn insert(&self, time: BatchTime, data: Dataset<T>) -> Result<()> {
        self.lock()?.insert(time, data);
        Ok(())
    }

    /// Held for the duration of one `compute` call on the owning node.
    pub fn compute_guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.computing
            .lock()
            .map_err(|_| anyhow!("node compute lock poisoned"))
    }

    /// Drop every batch at or before `cutoff`; returns how many were dropped.
    pub fn clear_through(&self, cutoff: BatchTime) -> Result<usize> {
        let mut batches = self.lock()?;
        let keep = batches.split_off(&cutoff.plus_millis(1));
        let dropped = batches.len();
        *batches = keep;
        Ok(dropped)
    }

    pub fn times(&self) -> Result<Vec<BatchTime>> {
        Ok(self.lock()?.keys().copied().collect())
    }
}

/// Typed evaluation interface of a graph node.
pub trait Node: Send + Sync + 'static {
    type Output: StreamData;

    fn info(&self) -> &NodeInfo;

    fn parents(&self) -> Vec<Arc<dyn AnyNode>>;

    /// Produce the dataset for a valid `time`. Called at most once per time
    /// unless the memo was cleared.
    fn compute(&self, time: BatchTime) -> Result<Option<Dataset<Self::Output>>>;

    fn generated(&self) -> &GeneratedBatches<Self::Output>;

    /// The memoised dataset for `time`, computing it on first request.
    fn get_or_compute(&self, time: BatchTime) -> Result<Option<Dataset<Self::Output>>> {
        let info = self.info();
        if !info.is_valid_time(time) {
            return Ok(None);
        }
        if let Some(data) = self.generated().get(time)? {
            return Ok(Some(data));
        }
        let _computing = self.generated().compute_guard()?;
        // Another thread may have finished this time while we waited.
        if let Some(data) = self.generated().get(time)? {
            return Ok(Some(data));
        }
        debug!(node = info.id(), kind = %info.kind(), %time, "computing batch");
        let out = self.compute(time)?;
        if let Some(data) = &out {
            self.generated().insert(time, data.clone())?;
        }
        Ok(out)
    }

    /// Re-seed the memo from a checkpointed dataset.
    fn restore_batch(&self, time: BatchTime, data: Dataset<Self::Output>) -> Result<()> {
        self.generated().insert(time, data)
    }

    /// Bytes written to a checkpoint for `time`; `None` when nothing was
    /// generated then.
    fn snapshot_batch(&self, time: BatchTime) -> Result<Option<Vec<u8>>> {
        self.generated()
            .get(time)?
            .map(|data| data.to_bytes())
            .transpose()
    }

    /// Inverse of [`Node::snapshot_batch`].
    fn restore_snapshot(&self, time: BatchTime, bytes: &[u8]) -> Result<()> {
        self.restore_batch(time, Dataset::from_bytes(bytes)?)
    }
}

/// Type-erased view of a [`Node`].
pub trait AnyNode: Send + Sync + 'static {
    fn node_info(&self) -> &NodeInfo;

    fn parent_nodes(&self) -> Vec<Arc<dyn AnyNode>>;

    /// [`Node::get_or_compute`] with the dataset boxed as `Dataset<Output>`.
    fn get_or_compute_any(&self, time: BatchTime) -> Result<Option<Box<dyn Any + Send>>>;

    /// Forget generated batches older than this node's remember duration.
    fn clear_metadata(&self, time: BatchTime) -> Result<usize>;

    /// Serialized dataset generated at `time`, if any.
    fn snapshot(&self, time: BatchTime) -> Result<Option<Vec<u8>>>;

    fn restore(&self, time: BatchTime, bytes: &[u8]) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}

impl<N: Node> AnyNode for N {
    fn node_info(&self) -> &NodeInfo {
        self.info()
    }

    fn parent_nodes(&self) -> Vec<Arc<dyn AnyNode>> {
        self.parents()
    }

    fn get_or_compute_any(&self, time: BatchTime) -> Result<Option<Box<dyn Any + Send>>> {
        Ok(self
            .get_or_compute(time)?
            .map(|data| Box::new(data) as Box<dyn Any + Send>))
    }

    fn clear_metadata(&self, time: BatchTime) -> Result<usize> {
        let cutoff = time.minus_millis(self.info().remember_ms());
        let dropped = self.generated().clear_through(cutoff)?;
        if dropped > 0 {
            debug!(node = self.info().id(), dropped, %cutoff, "cleared old batches");
        }
        Ok(dropped)
    }

    fn snapshot(&self, time: BatchTime) -> Result<Option<Vec<u8>>> {
        self.snapshot_batch(time)
    }

    fn restore(&self, time: BatchTime, bytes: &[u8]) -> Result<()> {
        self.restore_snapshot(time, bytes)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A node together with both of its views.
pub struct NodeRef<T: StreamData> {
    typed: Arc<dyn Node<Output = T>>,
    erased: Arc<dyn AnyNode>,
}

impl<T: StreamData> Clone for NodeRef<T> {
    fn clone(&self) -> Self {
        Self {
            typed: Arc::clone(&self.typed),
            erased: Arc::clone(&self.erased),
        }
    }
}

impl<T: StreamData> NodeRef<T> {
    pub fn new<N: Node<Output = T>>(node: Arc<N>) -> Self {
        let typed: Arc<dyn Node<Output = T>> = node.clone();
        let erased: Arc<dyn AnyNode> = node;
        Self { typed, erased }
    }

    pub fn typed(&self) -> &Arc<dyn Node<Output = T>> {
        &self.typed
    }

    pub fn erased(&self) -> &Arc<dyn AnyNode> {
        &self.erased
    }

    pub fn info(&self) -> &NodeInfo {
        self.typed.info()
    }

    pub fn get_or_compute(&self, time: BatchTime) -> Result<Option<Dataset<T>>> {
        self.typed.get_or_compute(time)
    }

    /// Every generated dataset for the slide-aligned times in `[from, to]`.
    ///
    /// Both ends are rounded down to this node's slide grid. Times with no
    /// dataset (before the origin) are skipped.
    pub fn slice(&self, from: BatchTime, to: BatchTime) -> Result<Vec<Dataset<T>>> {
        let info = self.info();
        let slide = info.slide_ms();
        let from = from.floor_to(info.zero_time(), slide);
        let to = to.floor_to(info.zero_time(), slide);
        let mut out = Vec::new();
        let mut time = from;
        while time <= to {
            if let Some(data) = self.get_or_compute(time)? {
                out.push(data);
            }
            time = time.plus_millis(slide);
        }
        Ok(out)
    }
}

/// Number of nodes on the longest path from `node` to a root, counting both.
pub fn node_depth(node: &dyn AnyNode) -> usize {
    1 + node
        .parent_nodes()
        .iter()
        .map(|p| node_depth(p.as_ref()))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "tests/graph_tests.rs"]
mod tests;
