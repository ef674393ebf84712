//! Checkpoint storage and the per-tick checkpoint coordinator.

use crate::graph::AnyNode;
use crate::types::{BatchTime, NodeId};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

mod coordinator;
mod metadata;
mod storage;

pub use coordinator::*;
pub use metadata::*;
pub use storage::*;

#[cfg(test)]
#[path = "tests/checkpoint_tests.rs"]
mod tests;
