//! # Keyed state
//!
//! `update_state_by_key` support: an owned key-to-state table
//! ([`KeyedStateStore`]) and the graph node that advances it once per batch
//! ([`StateNode`]).
//!
//! Only the state node reads or writes its table. A key whose update
//! returns `None` is deleted from the table and from that batch's output.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};

use crate::dataset::Dataset;
use crate::graph::{AnyNode, GeneratedBatches, Node, NodeInfo, NodeRef};
use crate::types::{BatchTime, StreamData, StreamKey};

mod node;
mod store;

pub use node::*;
pub use store::*;

/// `(new values for the key, previous state) -> new state`; `None` deletes the key.
pub type UpdateFn<V, S> = Arc<dyn Fn(&[V], Option<&S>) -> Option<S> + Send + Sync>;

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
