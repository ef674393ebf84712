//! # Microbatch Core
//!
//! Discretized-stream runtime: a stream is a sequence of [`Dataset`]s, one
//! per batch time, produced lazily by a DAG of nodes.
//!
//! - [`types`]: [`BatchTime`](types::BatchTime), node ids and the
//!   [`StreamData`](types::StreamData) bound.
//! - [`dataset`]: the partitioned, immutable per-batch collection and its
//!   keyed operations.
//! - [`graph`]: nodes, memoisation, fusion of stateless chains, inputs and
//!   the [`StreamGraph`](graph::StreamGraph) descriptor registry.
//! - [`window`]: sliding windows and incremental windowed reduce.
//! - [`state`]: `update_state_by_key`.
//! - [`sink`]: per-batch output operations.
//! - [`checkpoint`]: snapshot storage and recovery.

pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod error;
pub mod graph;
pub mod partitioner;
pub mod sink;
pub mod state;
pub mod types;
pub mod window;

pub use dataset::Dataset;
pub use types::{BatchTime, NodeId, StreamData, StreamKey};
