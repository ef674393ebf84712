//! # Window engine
//!
//! - [`WindowSpec`] validates a `(window, slide)` pair against the parent
//!   stream's slide.
//! - [`WindowedNode`] unions the parent's batches inside each window.
//! - [`ReducedWindowedNode`] keeps a per-key windowed aggregate, updated
//!   incrementally from the previous window when an inverse function is
//!   supplied.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::dataset::Dataset;
use crate::error::ConfigError;
use crate::graph::{AnyNode, GeneratedBatches, Node, NodeInfo, NodeRef};
use crate::types::{BatchTime, StreamData, StreamKey};

mod reduced;
mod windowed;

pub use reduced::*;
pub use windowed::*;

/// Associative (and commutative) merge of two values of the same key.
pub type ReduceFn<V> = Arc<dyn Fn(V, V) -> V + Send + Sync>;

/// Keeps the rows for which it returns true.
pub type FilterFn<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Window length and step, both in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub window_ms: i64,
    pub slide_ms: i64,
}

impl WindowSpec {
    /// Validate `window` and `slide` against a parent sliding every
    /// `parent_slide_ms`. A missing slide defaults to the parent's.
    pub fn new(
        window: Duration,
        slide: Option<Duration>,
        parent_slide_ms: i64,
    ) -> Result<Self, ConfigError> {
        let window_ms = ConfigError::whole_millis("windowDuration", window)?;
        let slide_ms = match slide {
            Some(slide) => ConfigError::whole_millis("slideDuration", slide)?,
            None => parent_slide_ms,
        };
        Self::from_millis(window_ms, slide_ms, parent_slide_ms)
    }

    pub fn from_millis(
        window_ms: i64,
        slide_ms: i64,
        parent_slide_ms: i64,
    ) -> Result<Self, ConfigError> {
        ConfigError::ensure_positive("windowDuration", window_ms)?;
        ConfigError::ensure_positive("slideDuration", slide_ms)?;
        if window_ms % parent_slide_ms != 0 {
            return Err(ConfigError::WindowNotMultiple {
                window_ms,
                parent_slide_ms,
            });
        }
        if slide_ms % parent_slide_ms != 0 {
            return Err(ConfigError::SlideNotMultiple {
                slide_ms,
                parent_slide_ms,
            });
        }
        Ok(Self {
            window_ms,
            slide_ms,
        })
    }

    /// The parent times `(end - window, end]` a window ending at `end` covers,
    /// as the inclusive range handed to [`NodeRef::slice`].
    pub fn covered(&self, end: BatchTime, parent_slide_ms: i64) -> (BatchTime, BatchTime) {
        (end.minus_millis(self.window_ms - parent_slide_ms), end)
    }
}

#[cfg(test)]
#[path = "tests/window_tests.rs"]
mod tests;
