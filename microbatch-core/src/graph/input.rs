use std::collections::VecDeque;

use tracing::warn;

use super::*;

/// Shared FIFO of datasets feeding a [`QueueInput`].
pub struct InputQueue<T> {
    inner: Arc<Mutex<VecDeque<Dataset<T>>>>,
}

impl<T> Clone for InputQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for InputQueue<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
        }
    }
}

impl<T> InputQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a queue pre-filled with `batches`, in order.
    pub fn from_batches(batches: impl IntoIterator<Item = Dataset<T>>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(batches.into_iter().collect())),
        }
    }

    pub fn push(&self, batch: Dataset<T>) -> Result<()> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("input queue lock poisoned"))?
            .push_back(batch);
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self
            .inner
            .lock()
            .map_err(|_| anyhow!("input queue lock poisoned"))?
            .len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn take(&self, one_at_a_time: bool) -> Result<Vec<Dataset<T>>> {
        let mut queue = self
            .inner
            .lock()
            .map_err(|_| anyhow!("input queue lock poisoned"))?;
        Ok(if one_at_a_time {
            queue.pop_front().into_iter().collect()
        } else {
            queue.drain(..).collect()
        })
    }
}

/// Input that dequeues queued datasets, one batch per tick or all at once.
pub struct QueueInput<T: StreamData> {
    info: NodeInfo,
    queue: InputQueue<T>,
    one_at_a_time: bool,
    default: Option<Dataset<T>>,
    last_time: Mutex<Option<BatchTime>>,
    generated: GeneratedBatches<T>,
}

impl<T: StreamData> QueueInput<T> {
    pub fn new(
        info: NodeInfo,
        queue: InputQueue<T>,
        one_at_a_time: bool,
        default: Option<Dataset<T>>,
    ) -> Self {
        Self {
            info,
            queue,
            one_at_a_time,
            default,
            last_time: Mutex::new(None),
            generated: GeneratedBatches::new(),
        }
    }
}

impl<T: StreamData> Node for QueueInput<T> {
    type Output = T;

    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn parents(&self) -> Vec<Arc<dyn AnyNode>> {
        Vec::new()
    }

    fn compute(&self, time: BatchTime) -> Result<Option<Dataset<T>>> {
        let mut last_time = self
            .last_time
            .lock()
            .map_err(|_| anyhow!("queue input clock lock poisoned"))?;
        if let Some(last) = *last_time {
            if time <= last {
                warn!(
                    node = self.info.id(),
                    %time,
                    %last,
                    "queue input asked for a past batch that is no longer kept; producing an empty batch"
                );
                return Ok(Some(Dataset::empty()));
            }
        }
        *last_time = Some(time);

        let batches = self.queue.take(self.one_at_a_time)?;
        let data = if batches.is_empty() {
            self.default.clone().unwrap_or_default()
        } else {
            Dataset::union_all(&batches)
        };
        Ok(Some(data))
    }

    fn generated(&self) -> &GeneratedBatches<T> {
        &self.generated
    }
}

/// Input that yields the same dataset on every tick.
pub struct ConstantInput<T: StreamData> {
    info: NodeInfo,
    data: Dataset<T>,
    generated: GeneratedBatches<T>,
}

impl<T: StreamData> ConstantInput<T> {
    pub fn new(info: NodeInfo, data: Dataset<T>) -> Self {
        Self {
            info,
            data,
            generated: GeneratedBatches::new(),
        }
    }
}

impl<T: StreamData> Node for ConstantInput<T> {
    type Output = T;

    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn parents(&self) -> Vec<Arc<dyn AnyNode>> {
        Vec::new()
    }

    fn compute(&self, _time: BatchTime) -> Result<Option<Dataset<T>>> {
        Ok(Some(self.data.clone()))
    }

    fn generated(&self) -> &GeneratedBatches<T> {
        &self.generated
    }
}
