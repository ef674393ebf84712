//! # Microbatch API
//!
//! User-facing discretized-stream API.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use microbatch_api::StreamingContext;
//! use microbatch_api::microbatch_core::config::StreamingConfig;
//! use microbatch_api::microbatch_core::dataset::Dataset;
//! use microbatch_api::microbatch_core::graph::InputQueue;
//! use std::time::Duration;
//!
//! let ctx = StreamingContext::new(StreamingConfig::new("wordcount", Duration::from_secs(1))).unwrap();
//! let lines = InputQueue::new();
//! lines.push(Dataset::parallelize(vec!["hello world".to_string()], 2)).unwrap();
//! ctx.queue_stream(lines, true)
//!     .flat_map(|line: &String| line.split_whitespace().map(|w| (w.to_string(), 1i64)).collect::<Vec<_>>())
//!     .reduce_by_key_and_window_inv(|a, b| a + b, |a, b| a - b, Duration::from_secs(3), None, None, None)
//!     .unwrap()
//!     .pprint(10);
//! ctx.run_batches(3).unwrap();
//! ```
//!
//! - [`context`]: [`StreamingContext`](context::StreamingContext), which owns
//!   the inputs, the node registry and the batch clock.
//! - [`dstream`]: [`DStream`](dstream::DStream), the fluent builder for
//!   transformations, windows, state and output operations.

pub mod context;
pub mod dstream;

pub use context::StreamingContext;
pub use dstream::DStream;
pub use microbatch_core;
