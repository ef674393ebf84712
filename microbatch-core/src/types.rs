use std::hash::Hash;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Unique identifier for graph nodes.
pub type NodeId = u32;

/// The point in time a batch belongs to, in milliseconds since the clock origin.
///
/// Batch times are produced by the batch clock at multiples of the root
/// stream's slide duration. Every node evaluates at most once per batch time.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BatchTime(i64);

impl BatchTime {
    /// The clock origin.
    pub const ZERO: BatchTime = BatchTime(0);

    /// Create a batch time from milliseconds.
    pub const fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    /// Create a batch time from whole seconds.
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs * 1000)
    }

    /// Milliseconds since the clock origin.
    pub const fn millis(self) -> i64 {
        self.0
    }

    /// Shift this time forward by `ms` milliseconds.
    pub const fn plus_millis(self, ms: i64) -> Self {
        Self(self.0 + ms)
    }

    /// Shift this time backward by `ms` milliseconds.
    pub const fn minus_millis(self, ms: i64) -> Self {
        Self(self.0 - ms)
    }

    /// Return true if `self - origin` is an exact multiple of `period_ms`.
    pub fn is_aligned(self, origin: BatchTime, period_ms: i64) -> bool {
        period_ms > 0 && (self.0 - origin.0).rem_euclid(period_ms) == 0
    }

    /// Round down to the closest `origin + k * period_ms`.
    pub fn floor_to(self, origin: BatchTime, period_ms: i64) -> Self {
        if period_ms <= 0 {
            return self;
        }
        Self(origin.0 + (self.0 - origin.0).div_euclid(period_ms) * period_ms)
    }
}

impl std::fmt::Display for BatchTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ms", self.0)
    }
}

impl std::ops::Add<Duration> for BatchTime {
    type Output = BatchTime;

    fn add(self, rhs: Duration) -> BatchTime {
        self.plus_millis(duration_millis(rhs))
    }
}

impl std::ops::Sub<Duration> for BatchTime {
    type Output = BatchTime;

    fn sub(self, rhs: Duration) -> BatchTime {
        self.minus_millis(duration_millis(rhs))
    }
}

/// Convert a [`Duration`] to whole milliseconds as used by batch arithmetic.
/// Any sub-millisecond part is truncated; durations given at graph
/// construction go through [`ConfigError::whole_millis`] instead.
///
/// [`ConfigError::whole_millis`]: crate::error::ConfigError::whole_millis
pub fn duration_millis(d: Duration) -> i64 {
    d.as_millis() as i64
}

/// Convert (possibly fractional) seconds to a [`Duration`], rounded to the
/// nearest millisecond.
pub fn duration_from_secs_f64(seconds: f64) -> Duration {
    Duration::from_millis((seconds * 1000.0).round().max(0.0) as u64)
}

/// Trait bound for types that can flow through the stream.
/// All user data types must satisfy this.
pub trait StreamData: Send + Sync + Clone + Serialize + DeserializeOwned + 'static {}

// Blanket implementation: any type satisfying the bounds is StreamData.
impl<T> StreamData for T where T: Send + Sync + Clone + Serialize + DeserializeOwned + 'static {}

/// Bound for keys of keyed streams.
pub trait StreamKey: StreamData + Eq + Hash {}

impl<T> StreamKey for T where T: StreamData + Eq + Hash {}

#[cfg(test)]
#[path = "tests/types_tests.rs"]
mod tests;
