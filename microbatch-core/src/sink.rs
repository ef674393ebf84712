//! # Output sinks
//!
//! Side-effecting consumers invoked once per batch with `(time, dataset)`.
//! A sink may be invoked again for the same batch after recovery, so
//! writers must treat an existing destination as a completed write.

use std::fmt::{self, Debug};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::dataset::Dataset;
use crate::types::BatchTime;

/// Consumer of one dataset per batch.
pub trait OutputSink<T>: Send + Sync {
    fn write(&self, time: BatchTime, data: &Dataset<T>) -> Result<()>;
}

/// Closure-backed sink for `foreach_batch`.
pub struct ForeachSink<T> {
    func: Arc<dyn Fn(BatchTime, &Dataset<T>) -> Result<()> + Send + Sync>,
}

impl<T> ForeachSink<T> {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(BatchTime, &Dataset<T>) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
        }
    }
}

impl<T> OutputSink<T> for ForeachSink<T> {
    fn write(&self, time: BatchTime, data: &Dataset<T>) -> Result<()> {
        (self.func)(time, data)
    }
}

// ── PrintSink ────────────────────────────────────────────────────────────────

const RULE: &str = "-------------------------------------------";

/// Render the first `num` elements of a batch as `pprint` shows them.
pub fn render_batch<T: Debug + Clone>(time: BatchTime, data: &Dataset<T>, num: usize) -> String {
    let taken = data.take(num + 1);
    let mut out = format!("{RULE}\nTime: {time}\n{RULE}\n");
    for record in taken.iter().take(num) {
        out.push_str(&format!("{record:?}\n"));
    }
    if taken.len() > num {
        out.push_str("...\n");
    }
    out.push('\n');
    out
}

/// Prints the head of every batch to a writer (stdout by default).
pub struct PrintSink {
    num: usize,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl PrintSink {
    pub fn new(num: usize, writer: Box<dyn Write + Send>) -> Self {
        Self {
            num,
            writer: Mutex::new(writer),
        }
    }

    pub fn stdout(num: usize) -> Self {
        Self::new(num, Box::new(io::stdout()))
    }
}

impl fmt::Debug for PrintSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrintSink").field("num", &self.num).finish()
    }
}

impl<T: Debug + Clone> OutputSink<T> for PrintSink {
    fn write(&self, time: BatchTime, data: &Dataset<T>) -> Result<()> {
        let text = render_batch(time, data, self.num);
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow!("print sink writer lock poisoned"))?;
        writer
            .write_all(text.as_bytes())
            .and_then(|_| writer.flush())
            .context("print sink write failed")
    }
}

// ── TextFileSink ─────────────────────────────────────────────────────────────

/// `prefix-<ms>` or `prefix-<ms>.<suffix>`.
pub fn batch_file_name(prefix: &str, suffix: Option<&str>, time: BatchTime) -> String {
    match suffix {
        Some(suffix) => format!("{prefix}-{}.{suffix}", time.millis()),
        None => format!("{prefix}-{}", time.millis()),
    }
}

/// Writes each batch as a directory of `part-NNNNN` text files, one per
/// partition and one element per line.
pub struct TextFileSink<T> {
    prefix: String,
    suffix: Option<String>,
    format: Arc<dyn Fn(&T) -> String + Send + Sync>,
}

impl<T: Debug + 'static> TextFileSink<T> {
    /// Elements are written with their `Debug` form.
    pub fn new(prefix: impl Into<String>, suffix: Option<String>) -> Self {
        Self::with_format(prefix, suffix, |x: &T| format!("{x:?}"))
    }
}

impl<T> TextFileSink<T> {
    pub fn with_format<F>(prefix: impl Into<String>, suffix: Option<String>, format: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        Self {
            prefix: prefix.into(),
            suffix,
            format: Arc::new(format),
        }
    }

    /// Destination directory for the batch at `time`.
    pub fn path_for(&self, time: BatchTime) -> PathBuf {
        PathBuf::from(batch_file_name(&self.prefix, self.suffix.as_deref(), time))
    }
}

impl<T> OutputSink<T> for TextFileSink<T> {
    fn write(&self, time: BatchTime, data: &Dataset<T>) -> Result<()> {
        let path = self.path_for(time);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        match fs::create_dir(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), %time, "output already exists; treating as written");
                return Ok(());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to create {}", path.display()));
            }
        }
        for (i, partition) in data.partitions().iter().enumerate() {
            let mut text = String::new();
            for record in partition {
                text.push_str(&(self.format)(record));
                text.push('\n');
            }
            let file = path.join(format!("part-{i:05}"));
            fs::write(&file, text).with_context(|| format!("failed to write {}", file.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/sink_tests.rs"]
mod tests;
