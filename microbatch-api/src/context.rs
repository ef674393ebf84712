use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, select, tick};
use tracing::{debug, error, info};

use microbatch_core::checkpoint::{
    CheckpointCoordinator, CheckpointStorage, FsCheckpointStorage, InMemoryCheckpointStorage,
};
use microbatch_core::config::StreamingConfig;
use microbatch_core::dataset::Dataset;
use microbatch_core::error::ConfigError;
use microbatch_core::graph::{
    AnyNode, ConstantInput, InputQueue, Node, NodeInfo, NodeKind, NodeRef, QueueInput, StreamGraph,
};
use microbatch_core::types::{
    BatchTime, NodeId, StreamData, duration_from_secs_f64, duration_millis,
};

use crate::dstream::DStream;

type OutputFn = Box<dyn Fn(BatchTime) -> Result<()> + Send + Sync>;

/// A registered output operation: the last step of one pipeline.
struct OutputOperation {
    label: String,
    node_id: NodeId,
    run: OutputFn,
}

/// Handle on a running driver thread.
struct Driver {
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    handle: JoinHandle<Result<()>>,
}

/// Shared state behind every clone of a [`StreamingContext`].
pub(crate) struct ContextInner {
    config: StreamingConfig,
    graph: Mutex<StreamGraph>,
    nodes: Mutex<Vec<Arc<dyn AnyNode>>>,
    outputs: Mutex<Vec<Arc<OutputOperation>>>,
    checkpoints: CheckpointCoordinator,
    /// Held for the whole of one batch.
    batch_lock: Mutex<()>,
    last_time: Mutex<Option<BatchTime>>,
    driver: Mutex<Option<Driver>>,
}

/// Lock a registry, recovering the guard if a panicking thread poisoned it.
/// Registries only ever see whole pushes.
fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The entry point of a streaming program.
///
/// Create a context, add input streams with [`queue_stream`](Self::queue_stream)
/// or [`constant_stream`](Self::constant_stream), chain transformations on the
/// returned [`DStream`]s, register output operations, then drive the batch
/// clock with [`advance`](Self::advance), [`run_batch`](Self::run_batch) or
/// [`start`](Self::start).
///
/// Cloning is cheap; every clone drives the same graph.
#[derive(Clone)]
pub struct StreamingContext {
    pub(crate) inner: Arc<ContextInner>,
}

impl StreamingContext {
    pub fn new(config: StreamingConfig) -> Result<Self> {
        config.validate()?;
        let storage: Arc<dyn CheckpointStorage> = match &config.checkpoint_dir {
            Some(dir) => Arc::new(FsCheckpointStorage::new(dir)?),
            None => Arc::new(InMemoryCheckpointStorage::new()),
        };
        let checkpoints = CheckpointCoordinator::new(storage, config.app_name.clone())
            .with_retained_checkpoints(config.keep_checkpoints);
        info!(
            app = %config.app_name,
            batch_ms = config.batch_millis(),
            "streaming context created"
        );
        Ok(Self {
            inner: Arc::new(ContextInner {
                config,
                graph: Mutex::new(StreamGraph::new()),
                nodes: Mutex::new(Vec::new()),
                outputs: Mutex::new(Vec::new()),
                checkpoints,
                batch_lock: Mutex::new(()),
                last_time: Mutex::new(None),
                driver: Mutex::new(None),
            }),
        })
    }

    /// Fractional seconds as a [`Duration`] with millisecond precision.
    pub fn duration(seconds: f64) -> Duration {
        duration_from_secs_f64(seconds)
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.inner.config
    }

    pub fn batch_millis(&self) -> i64 {
        self.inner.config.batch_millis()
    }

    pub fn default_parallelism(&self) -> usize {
        self.inner.config.default_parallelism
    }

    // ── Inputs ───────────────────────────────────────────────────────────────

    /// Stream fed from `queue`: one queued dataset per tick, or everything
    /// queued so far when `one_at_a_time` is false. Empty ticks yield an
    /// empty dataset.
    pub fn queue_stream<T: StreamData>(
        &self,
        queue: InputQueue<T>,
        one_at_a_time: bool,
    ) -> DStream<T> {
        let info = self.node_info(NodeKind::Input, "queue_stream", self.batch_millis(), &[]);
        self.attach(QueueInput::new(info, queue, one_at_a_time, None))
    }

    /// As [`queue_stream`](Self::queue_stream), producing `default` on ticks
    /// where the queue is empty.
    pub fn queue_stream_with_default<T: StreamData>(
        &self,
        queue: InputQueue<T>,
        one_at_a_time: bool,
        default: Dataset<T>,
    ) -> DStream<T> {
        let info = self.node_info(NodeKind::Input, "queue_stream", self.batch_millis(), &[]);
        self.attach(QueueInput::new(info, queue, one_at_a_time, Some(default)))
    }

    /// Stream producing `data` on every tick.
    pub fn constant_stream<T: StreamData>(&self, data: Dataset<T>) -> DStream<T> {
        let info = self.node_info(NodeKind::Input, "constant_stream", self.batch_millis(), &[]);
        self.attach(ConstantInput::new(info, data))
    }

    /// Union of several streams sharing one slide duration.
    pub fn union_all<T: StreamData>(&self, streams: &[DStream<T>]) -> Result<DStream<T>, ConfigError> {
        let (first, rest) = streams.split_first().ok_or(ConfigError::EmptyUnion)?;
        let mut out = first.clone();
        for stream in rest {
            out = out.union(stream)?;
        }
        Ok(out)
    }

    // ── Graph registry ───────────────────────────────────────────────────────

    /// Register a node descriptor and build the node's runtime info.
    pub(crate) fn node_info(
        &self,
        kind: NodeKind,
        label: &str,
        slide_ms: i64,
        parents: &[NodeId],
    ) -> NodeInfo {
        let id = relock(&self.inner.graph).add_node(kind, label, slide_ms, parents);
        let info = NodeInfo::new(id, kind, slide_ms, self.inner.config.zero_time, parents.to_vec());
        if let Some(remember) = self.inner.config.remember {
            info.remember_at_least(duration_millis(remember));
        }
        info
    }

    /// Take ownership of a freshly built node and wrap it in a stream.
    pub(crate) fn attach<N: Node>(&self, node: N) -> DStream<N::Output> {
        let node = Arc::new(node);
        relock(&self.inner.nodes).push(node.clone());
        DStream::new(self.clone(), NodeRef::new(node))
    }

    pub(crate) fn add_output<F>(&self, label: &str, node_id: NodeId, run: F)
    where
        F: Fn(BatchTime) -> Result<()> + Send + Sync + 'static,
    {
        debug!(node = node_id, label, "registered output operation");
        relock(&self.inner.outputs).push(Arc::new(OutputOperation {
            label: label.to_string(),
            node_id,
            run: Box::new(run),
        }));
    }

    pub(crate) fn register_checkpoint(&self, node: Arc<dyn AnyNode>) -> Result<()> {
        self.inner.checkpoints.register(node)
    }

    /// Copy of the node descriptor registry.
    pub fn stream_graph(&self) -> StreamGraph {
        relock(&self.inner.graph).clone()
    }

    /// Node listing in topological order followed by the output operations.
    pub fn explain(&self) -> String {
        let mut out = relock(&self.inner.graph).explain();
        for output in relock(&self.inner.outputs).iter() {
            out.push_str(&format!("output {} <- #{}\n", output.label, output.node_id));
        }
        out
    }

    pub fn num_outputs(&self) -> usize {
        relock(&self.inner.outputs).len()
    }

    // ── Batch clock ──────────────────────────────────────────────────────────

    /// Time of the last batch that was run (successfully or not).
    pub fn last_batch_time(&self) -> Result<Option<BatchTime>> {
        Ok(*self
            .inner
            .last_time
            .lock()
            .map_err(|_| anyhow!("batch clock lock poisoned"))?)
    }

    /// Run every output operation for `time` in registration order, then
    /// write due checkpoints and forget batches no node needs any more.
    ///
    /// `time` may repeat the last batch time, which is a no-op for
    /// memoised nodes, but must not go backwards.
    pub fn run_batch(&self, time: BatchTime) -> Result<()> {
        let _batch = self
            .inner
            .batch_lock
            .lock()
            .map_err(|_| anyhow!("batch lock poisoned"))?;
        {
            let mut last_time = self
                .inner
                .last_time
                .lock()
                .map_err(|_| anyhow!("batch clock lock poisoned"))?;
            if let Some(last) = *last_time {
                if time < last {
                    bail!("batch time {time} is before the last batch {last}");
                }
            }
            *last_time = Some(time);
        }

        let result = self.evaluate(time);
        match &result {
            Ok(()) => debug!(%time, "batch completed"),
            Err(err) => error!(%time, error = %format!("{err:#}"), "batch failed"),
        }
        result
    }

    fn evaluate(&self, time: BatchTime) -> Result<()> {
        let outputs: Vec<Arc<OutputOperation>> = relock(&self.inner.outputs).clone();
        for output in outputs {
            (output.run)(time).with_context(|| {
                format!(
                    "output {} on node {} failed at {time}",
                    output.label, output.node_id
                )
            })?;
        }
        self.inner.checkpoints.maybe_checkpoint(time)?;

        let nodes: Vec<Arc<dyn AnyNode>> = relock(&self.inner.nodes).clone();
        for node in nodes {
            node.clear_metadata(time)?;
        }
        Ok(())
    }

    /// Run the batch after the last one (the first is `zero_time + batch`).
    pub fn advance(&self) -> Result<BatchTime> {
        let next = match self.last_batch_time()? {
            Some(last) => last.plus_millis(self.batch_millis()),
            None => self.inner.config.zero_time.plus_millis(self.batch_millis()),
        };
        self.run_batch(next)?;
        Ok(next)
    }

    /// Advance `n` batches, stopping at the first failure.
    pub fn run_batches(&self, n: usize) -> Result<Option<BatchTime>> {
        let mut last = None;
        for _ in 0..n {
            last = Some(self.advance()?);
        }
        Ok(last)
    }

    /// Re-seed checkpointed nodes from the latest checkpoint and move the
    /// clock to its batch time, so the next [`advance`](Self::advance)
    /// continues after it.
    pub fn recover(&self) -> Result<Option<BatchTime>> {
        let recovered = self.inner.checkpoints.recover()?;
        if let Some(time) = recovered {
            *self
                .inner
                .last_time
                .lock()
                .map_err(|_| anyhow!("batch clock lock poisoned"))? = Some(time);
        }
        Ok(recovered)
    }

    // ── Driver thread ────────────────────────────────────────────────────────

    /// Spawn a driver thread that advances one batch per batch duration
    /// until [`stop`](Self::stop) is called or a batch fails.
    pub fn start(&self) -> Result<()> {
        let mut driver = self
            .inner
            .driver
            .lock()
            .map_err(|_| anyhow!("driver lock poisoned"))?;
        if driver.is_some() {
            bail!("streaming context is already started");
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);
        let interval = self.inner.config.batch_duration;
        let ctx = self.clone();
        let handle = thread::Builder::new()
            .name(format!("{}-driver", self.inner.config.app_name))
            .spawn(move || {
                let ticker = tick(interval);
                let result = loop {
                    let stopped = select! {
                        recv(ticker) -> _ => false,
                        recv(stop_rx) -> _ => true,
                    };
                    if stopped {
                        break Ok(());
                    }
                    if let Err(err) = ctx.advance() {
                        break Err(err);
                    }
                };
                let _ = done_tx.send(());
                result
            })
            .context("failed to spawn driver thread")?;

        *driver = Some(Driver {
            stop_tx,
            done_rx,
            handle,
        });
        info!(app = %self.inner.config.app_name, "streaming context started");
        Ok(())
    }

    fn join_driver(&self) -> Result<()> {
        let driver = self
            .inner
            .driver
            .lock()
            .map_err(|_| anyhow!("driver lock poisoned"))?
            .take();
        let Some(driver) = driver else {
            return Ok(());
        };
        // The thread may already have exited after a failed batch.
        let _ = driver.stop_tx.send(());
        let result = driver
            .handle
            .join()
            .map_err(|_| anyhow!("driver thread panicked"))?;
        info!(app = %self.inner.config.app_name, "streaming context stopped");
        result
    }

    /// Stop ticking and wait for the driver thread. Returns the error that
    /// ended the driver early, if any.
    pub fn stop(&self) -> Result<()> {
        self.join_driver()
    }

    /// Wait up to `timeout` for the driver to end on its own. Returns
    /// `Ok(true)` if it ended (or was never started).
    pub fn await_termination_timeout(&self, timeout: Duration) -> Result<bool> {
        let done_rx = match self
            .inner
            .driver
            .lock()
            .map_err(|_| anyhow!("driver lock poisoned"))?
            .as_ref()
        {
            Some(driver) => driver.done_rx.clone(),
            None => return Ok(true),
        };
        match done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => self.join_driver().map(|_| true),
            Err(RecvTimeoutError::Timeout) => Ok(false),
        }
    }
}
