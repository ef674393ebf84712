use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::{BatchTime, duration_millis};

/// Settings for a streaming context.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    pub app_name: String,
    /// Period between ticks of the input streams.
    pub batch_duration: Duration,
    /// Partition count used when an operation is not given one explicitly.
    pub default_parallelism: usize,
    /// Clock origin; the first batch runs at `zero_time + batch_duration`.
    pub zero_time: BatchTime,
    /// Minimum history every node keeps, so that `slice` can look back.
    pub remember: Option<Duration>,
    /// Enables file-system checkpoint storage under this directory.
    pub checkpoint_dir: Option<PathBuf>,
    /// Number of completed checkpoints retained by storage.
    pub keep_checkpoints: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            app_name: "microbatch".to_string(),
            batch_duration: Duration::from_secs(1),
            default_parallelism: 2,
            zero_time: BatchTime::ZERO,
            remember: None,
            checkpoint_dir: None,
            keep_checkpoints: 3,
        }
    }
}

impl StreamingConfig {
    pub fn new(app_name: impl Into<String>, batch_duration: Duration) -> Self {
        Self {
            app_name: app_name.into(),
            batch_duration,
            ..Self::default()
        }
    }

    pub fn with_default_parallelism(mut self, parallelism: usize) -> Self {
        self.default_parallelism = parallelism;
        self
    }

    pub fn with_zero_time(mut self, zero_time: BatchTime) -> Self {
        self.zero_time = zero_time;
        self
    }

    pub fn with_remember(mut self, remember: Duration) -> Self {
        self.remember = Some(remember);
        self
    }

    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    pub fn with_keep_checkpoints(mut self, keep: usize) -> Self {
        self.keep_checkpoints = keep;
        self
    }

    /// Batch duration in milliseconds.
    pub fn batch_millis(&self) -> i64 {
        duration_millis(self.batch_duration)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let batch_ms = ConfigError::whole_millis("batch duration", self.batch_duration)?;
        ConfigError::ensure_positive("batch duration", batch_ms)?;
        if self.default_parallelism == 0 {
            return Err(ConfigError::ZeroPartitions {
                what: "default parallelism",
            });
        }
        if self.keep_checkpoints == 0 {
            return Err(ConfigError::ZeroPartitions {
                what: "keep_checkpoints",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = StreamingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_millis(), 1_000);
    }

    #[test]
    fn test_zero_batch_duration_rejected() {
        let config = StreamingConfig::new("bad", Duration::ZERO);
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositiveDuration {
                what: "batch duration",
                ms: 0
            })
        );
    }

    #[test]
    fn test_fractional_millisecond_batch_rejected() {
        let config = StreamingConfig::new("bad", Duration::from_micros(2500));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SubMillisecond { what: "batch duration", .. })
        ));
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let config = StreamingConfig::default().with_default_parallelism(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroPartitions { .. })
        ));
    }

    #[test]
    fn test_builder_sets_fields() {
        let config = StreamingConfig::new("app", Duration::from_millis(500))
            .with_default_parallelism(4)
            .with_zero_time(BatchTime::from_millis(250))
            .with_remember(Duration::from_secs(10))
            .with_checkpoint_dir("/tmp/chk")
            .with_keep_checkpoints(5);
        assert_eq!(config.app_name, "app");
        assert_eq!(config.default_parallelism, 4);
        assert_eq!(config.zero_time, BatchTime::from_millis(250));
        assert_eq!(config.remember, Some(Duration::from_secs(10)));
        assert_eq!(config.checkpoint_dir, Some(PathBuf::from("/tmp/chk")));
        assert_eq!(config.keep_checkpoints, 5);
    }
}
