//! Construction-time configuration errors.
//!
//! These are raised while the dataflow graph is being built and are fatal to
//! the call that raised them, never to the process. Errors raised while a
//! batch is being evaluated are plain [`anyhow::Error`]s instead.

use std::time::Duration;

use thiserror::Error;

/// A graph-construction or configuration rule was violated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error(
        "windowDuration must be a multiple of the parent stream's slide (batch) duration \
         ({parent_slide_ms} ms), got {window_ms} ms"
    )]
    WindowNotMultiple { window_ms: i64, parent_slide_ms: i64 },

    #[error(
        "slideDuration must be a multiple of the parent stream's slide (batch) duration \
         ({parent_slide_ms} ms), got {slide_ms} ms"
    )]
    SlideNotMultiple { slide_ms: i64, parent_slide_ms: i64 },

    #[error("{what} must be positive, got {ms} ms")]
    NonPositiveDuration { what: &'static str, ms: i64 },

    #[error("the two streams should have the same slide duration ({left_ms} ms vs {right_ms} ms)")]
    SlideMismatch { left_ms: i64, right_ms: i64 },

    #[error(
        "checkpoint interval must be a multiple of the stream's slide duration \
         ({slide_ms} ms), got {interval_ms} ms"
    )]
    CheckpointIntervalNotMultiple { interval_ms: i64, slide_ms: i64 },

    #[error("{what} must be a whole number of milliseconds, got {nanos} ns")]
    SubMillisecond { what: &'static str, nanos: u128 },

    #[error("{what} must be at least 1")]
    ZeroPartitions { what: &'static str },

    #[error("cannot union an empty list of streams")]
    EmptyUnion,
}

impl ConfigError {
    /// Check that `ms` is strictly positive.
    pub fn ensure_positive(what: &'static str, ms: i64) -> Result<(), ConfigError> {
        if ms <= 0 {
            return Err(ConfigError::NonPositiveDuration { what, ms });
        }
        Ok(())
    }

    /// `d` in milliseconds, rejecting any sub-millisecond remainder.
    pub fn whole_millis(what: &'static str, d: Duration) -> Result<i64, ConfigError> {
        if d.subsec_nanos() % 1_000_000 != 0 {
            return Err(ConfigError::SubMillisecond {
                what,
                nanos: d.as_nanos(),
            });
        }
        Ok(d.as_millis() as i64)
    }
}
