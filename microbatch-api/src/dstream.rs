use std::fmt::Debug;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use microbatch_core::dataset::Dataset;
use microbatch_core::error::ConfigError;
use microbatch_core::graph::{
    BatchFn, BatchFn2, NodeKind, NodeRef, TransformedNode, TransformedWithNode, node_depth,
    plan_transform,
};
use microbatch_core::partitioner::HashPartitioner;
use microbatch_core::sink::{ForeachSink, OutputSink, PrintSink, TextFileSink};
use microbatch_core::state::{StateNode, UpdateFn};
use microbatch_core::types::{BatchTime, NodeId, StreamData, StreamKey};
use microbatch_core::window::{
    FilterFn, ReduceFn, ReducedWindowedNode, WindowReducer, WindowSpec, WindowedNode,
};

use crate::context::StreamingContext;

/// A discretized stream: one [`Dataset`] per batch time.
///
/// Every method that returns a `DStream` only adds a node to the graph;
/// nothing runs until the context's batch clock asks an output operation for
/// a batch. Chains of stateless single-parent transforms are fused into one
/// node unless an intermediate stream is cached or checkpointed.
pub struct DStream<T: StreamData> {
    ctx: StreamingContext,
    node: NodeRef<T>,
}

impl<T: StreamData> Clone for DStream<T> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            node: self.node.clone(),
        }
    }
}

impl<T: StreamData> std::fmt::Debug for DStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DStream").field("id", &self.id()).finish_non_exhaustive()
    }
}

impl<T: StreamData> DStream<T> {
    pub(crate) fn new(ctx: StreamingContext, node: NodeRef<T>) -> Self {
        Self { ctx, node }
    }

    pub fn context(&self) -> &StreamingContext {
        &self.ctx
    }

    pub fn id(&self) -> NodeId {
        self.node.info().id()
    }

    pub fn node(&self) -> &NodeRef<T> {
        &self.node
    }

    pub fn slide_ms(&self) -> i64 {
        self.node.info().slide_ms()
    }

    pub fn slide_duration(&self) -> Duration {
        Duration::from_millis(self.slide_ms() as u64)
    }

    /// Nodes on the longest path from this stream to an input, inclusive.
    pub fn depth(&self) -> usize {
        node_depth(self.node.erased().as_ref())
    }

    fn partitions(&self, num_partitions: Option<usize>) -> usize {
        num_partitions
            .unwrap_or_else(|| self.ctx.default_parallelism())
            .max(1)
    }

    fn transformed<O: StreamData>(&self, label: &str, func: BatchFn<T, O>) -> DStream<O> {
        let plan = plan_transform(self.node.erased(), func);
        let parent_id = plan.parent.node_info().id();
        let info = self
            .ctx
            .node_info(NodeKind::Transformed, label, self.slide_ms(), &[parent_id]);
        self.ctx.attach(TransformedNode::new(info, plan))
    }

    fn transformed_with<U: StreamData, O: StreamData>(
        &self,
        other: &DStream<U>,
        label: &str,
        func: BatchFn2<T, U, O>,
    ) -> DStream<O> {
        let info = self.ctx.node_info(
            NodeKind::TransformedWith,
            label,
            self.slide_ms(),
            &[self.id(), other.id()],
        );
        self.ctx.attach(TransformedWithNode::new(
            info,
            Arc::clone(self.node.erased()),
            Arc::clone(other.node.erased()),
            func,
        ))
    }

    // ── Stateless transforms ─────────────────────────────────────────────────

    pub fn map<O, F>(&self, f: F) -> DStream<O>
    where
        O: StreamData,
        F: Fn(&T) -> O + Send + Sync + 'static,
    {
        self.transformed("map", BatchFn::plain(move |ds: &Dataset<T>| Ok(ds.map(&f))))
    }

    pub fn flat_map<O, I, F>(&self, f: F) -> DStream<O>
    where
        O: StreamData,
        I: IntoIterator<Item = O>,
        F: Fn(&T) -> I + Send + Sync + 'static,
    {
        self.transformed(
            "flat_map",
            BatchFn::plain(move |ds: &Dataset<T>| Ok(ds.flat_map(&f))),
        )
    }

    pub fn filter<F>(&self, f: F) -> DStream<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.transformed("filter", BatchFn::plain(move |ds: &Dataset<T>| Ok(ds.filter(&f))))
    }

    pub fn map_partitions<O, F>(&self, f: F, preserves_partitioning: bool) -> DStream<O>
    where
        O: StreamData,
        F: Fn(&[T]) -> Vec<O> + Send + Sync + 'static,
    {
        self.transformed(
            "map_partitions",
            BatchFn::plain(move |ds: &Dataset<T>| Ok(ds.map_partitions(&f, preserves_partitioning))),
        )
    }

    pub fn map_partitions_with_index<O, F>(&self, f: F, preserves_partitioning: bool) -> DStream<O>
    where
        O: StreamData,
        F: Fn(usize, &[T]) -> Vec<O> + Send + Sync + 'static,
    {
        self.transformed(
            "map_partitions_with_index",
            BatchFn::plain(move |ds: &Dataset<T>| {
                Ok(ds.map_partitions_with_index(&f, preserves_partitioning))
            }),
        )
    }

    /// Each partition as one element.
    pub fn glom(&self) -> DStream<Vec<T>> {
        self.transformed("glom", BatchFn::plain(|ds: &Dataset<T>| Ok(ds.glom())))
    }

    /// One-element batches holding the reduce of each batch; empty batches
    /// stay empty.
    pub fn reduce<F>(&self, f: F) -> DStream<T>
    where
        F: Fn(T, T) -> T + Send + Sync + 'static,
    {
        self.transformed(
            "reduce",
            BatchFn::plain(move |ds: &Dataset<T>| {
                Ok(Dataset::parallelize(ds.reduce(&f).into_iter().collect(), 1))
            }),
        )
    }

    /// One-element batches holding the number of elements of each batch.
    pub fn count(&self) -> DStream<i64> {
        self.transformed(
            "count",
            BatchFn::plain(|ds: &Dataset<T>| Ok(Dataset::parallelize(vec![ds.count() as i64], 1))),
        )
    }

    pub fn repartition(&self, num_partitions: usize) -> DStream<T> {
        self.transformed(
            "repartition",
            BatchFn::plain(move |ds: &Dataset<T>| Ok(ds.repartition(num_partitions))),
        )
    }

    /// Arbitrary per-batch dataset function.
    pub fn transform<O, F>(&self, f: F) -> DStream<O>
    where
        O: StreamData,
        F: Fn(&Dataset<T>) -> Result<Dataset<O>> + Send + Sync + 'static,
    {
        self.transformed("transform", BatchFn::plain(f))
    }

    /// As [`transform`](Self::transform), also given the batch time.
    pub fn transform_with_time<O, F>(&self, f: F) -> DStream<O>
    where
        O: StreamData,
        F: Fn(BatchTime, &Dataset<T>) -> Result<Dataset<O>> + Send + Sync + 'static,
    {
        self.transformed("transform", BatchFn::timed(f))
    }

    /// Per-batch function of this stream and `other`. Never fused.
    pub fn transform_with<U, O, F>(&self, other: &DStream<U>, f: F) -> DStream<O>
    where
        U: StreamData,
        O: StreamData,
        F: Fn(&Dataset<T>, &Dataset<U>) -> Result<Dataset<O>> + Send + Sync + 'static,
    {
        self.transformed_with(other, "transform_with", BatchFn2::plain(f))
    }

    pub fn transform_with_and_time<U, O, F>(&self, other: &DStream<U>, f: F) -> DStream<O>
    where
        U: StreamData,
        O: StreamData,
        F: Fn(BatchTime, &Dataset<T>, &Dataset<U>) -> Result<Dataset<O>> + Send + Sync + 'static,
    {
        self.transformed_with(other, "transform_with", BatchFn2::timed(f))
    }

    /// Elements of both streams, batch by batch.
    pub fn union(&self, other: &DStream<T>) -> Result<DStream<T>, ConfigError> {
        if self.slide_ms() != other.slide_ms() {
            return Err(ConfigError::SlideMismatch {
                left_ms: self.slide_ms(),
                right_ms: other.slide_ms(),
            });
        }
        Ok(self.transformed_with(
            other,
            "union",
            BatchFn2::plain(|a: &Dataset<T>, b: &Dataset<T>| Ok(a.union(b))),
        ))
    }

    // ── Windows ──────────────────────────────────────────────────────────────

    /// Union of the batches in `(t - window, t]`, emitted every `slide`
    /// (default: this stream's slide).
    pub fn window(&self, window: Duration, slide: Option<Duration>) -> Result<DStream<T>, ConfigError> {
        let spec = WindowSpec::new(window, slide, self.slide_ms())?;
        let info = self
            .ctx
            .node_info(NodeKind::Windowed, "window", spec.slide_ms, &[self.id()]);
        Ok(self.ctx.attach(WindowedNode::new(info, self.node.clone(), spec)))
    }

    /// Reduce of all elements in each window, recomputed from the
    /// per-batch reduces on every emission.
    pub fn reduce_by_window<F>(
        &self,
        f: F,
        window: Duration,
        slide: Option<Duration>,
    ) -> Result<DStream<T>, ConfigError>
    where
        F: Fn(T, T) -> T + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let g = Arc::clone(&f);
        Ok(self
            .reduce(move |a, b| f(a, b))
            .window(window, slide)?
            .reduce(move |a, b| g(a, b)))
    }

    /// Windowed reduce maintained incrementally with `inverse`.
    pub fn reduce_by_window_inv<F, G>(
        &self,
        f: F,
        inverse: G,
        window: Duration,
        slide: Option<Duration>,
    ) -> Result<DStream<T>, ConfigError>
    where
        F: Fn(T, T) -> T + Send + Sync + 'static,
        G: Fn(T, T) -> T + Send + Sync + 'static,
    {
        Ok(self
            .map(|x| ((), x.clone()))
            .reduce_by_key_and_window_inv(f, inverse, window, slide, Some(1), None)?
            .map(|(_, v)| v.clone()))
    }

    /// Number of elements in each window.
    pub fn count_by_window(
        &self,
        window: Duration,
        slide: Option<Duration>,
    ) -> Result<DStream<i64>, ConfigError> {
        self.map(|_| 1i64)
            .reduce_by_window_inv(|a, b| a + b, |a, b| a - b, window, slide)
    }

    // ── Evaluation and persistence ───────────────────────────────────────────

    /// Dataset of the batch at `time`, computing it if needed. `None` when
    /// `time` is not on this stream's slide grid.
    pub fn compute_batch(&self, time: BatchTime) -> Result<Option<Dataset<T>>> {
        self.node.get_or_compute(time)
    }

    /// Datasets for every batch time in `[from, to]` still retained.
    pub fn slice(&self, from: BatchTime, to: BatchTime) -> Result<Vec<Dataset<T>>> {
        self.node.slice(from, to)
    }

    /// Mark this stream as cached: later transforms will not fuse through it.
    pub fn cache(self) -> Self {
        self.node.info().set_cached();
        self
    }

    pub fn persist(self) -> Self {
        self.cache()
    }

    /// Snapshot this stream's batches every `interval`, which must be a
    /// multiple of the slide. Disables fusion through the stream.
    pub fn checkpoint(self, interval: Duration) -> Result<Self> {
        let interval_ms = ConfigError::whole_millis("checkpoint interval", interval)?;
        ConfigError::ensure_positive("checkpoint interval", interval_ms)?;
        if interval_ms % self.slide_ms() != 0 {
            return Err(ConfigError::CheckpointIntervalNotMultiple {
                interval_ms,
                slide_ms: self.slide_ms(),
            }
            .into());
        }
        self.node.info().set_checkpoint_interval_ms(interval_ms);
        self.ctx.register_checkpoint(Arc::clone(self.node.erased()))?;
        Ok(self)
    }

    // ── Output operations ────────────────────────────────────────────────────

    /// Register `sink` to receive every batch this stream produces.
    pub fn output_to(&self, label: &str, sink: Arc<dyn OutputSink<T>>) {
        let node = self.node.clone();
        self.ctx.add_output(label, self.id(), move |time| {
            match node.get_or_compute(time)? {
                Some(data) => sink.write(time, &data),
                None => Ok(()),
            }
        });
    }

    pub fn foreach_batch<F>(&self, f: F)
    where
        F: Fn(&Dataset<T>) -> Result<()> + Send + Sync + 'static,
    {
        self.output_to(
            "foreach_batch",
            Arc::new(ForeachSink::new(move |_, data: &Dataset<T>| f(data))),
        );
    }

    pub fn foreach_batch_with_time<F>(&self, f: F)
    where
        F: Fn(BatchTime, &Dataset<T>) -> Result<()> + Send + Sync + 'static,
    {
        self.output_to("foreach_batch", Arc::new(ForeachSink::new(f)));
    }

    /// Print the first `num` elements of every batch to stdout.
    pub fn pprint(&self, num: usize)
    where
        T: Debug,
    {
        self.output_to("pprint", Arc::new(PrintSink::stdout(num)));
    }

    /// As [`pprint`](Self::pprint), into `writer`.
    pub fn pprint_to(&self, num: usize, writer: Box<dyn Write + Send>)
    where
        T: Debug,
    {
        self.output_to("pprint", Arc::new(PrintSink::new(num, writer)));
    }

    /// Write every batch under `prefix-<ms>[.suffix]/part-NNNNN`, one
    /// `Debug`-formatted element per line.
    pub fn save_as_text_files(&self, prefix: &str, suffix: Option<&str>)
    where
        T: Debug,
    {
        self.output_to(
            "save_as_text_files",
            Arc::new(TextFileSink::<T>::new(prefix, suffix.map(str::to_string))),
        );
    }
}

// ── Value-keyed operations ───────────────────────────────────────────────────

impl<T: StreamKey> DStream<T> {
    /// Per-batch count of each distinct element.
    pub fn count_by_value(&self, num_partitions: Option<usize>) -> DStream<(T, i64)> {
        self.map(|x| (x.clone(), 1i64))
            .reduce_by_key(|a, b| a + b, num_partitions)
    }

    /// Count of each distinct element per window; elements whose count
    /// drops to zero are left out.
    pub fn count_by_value_and_window(
        &self,
        window: Duration,
        slide: Option<Duration>,
        num_partitions: Option<usize>,
    ) -> Result<DStream<(T, i64)>, ConfigError> {
        let keep: FilterFn<(T, i64)> = Arc::new(|(_, count): &(T, i64)| *count > 0);
        self.map(|x| (x.clone(), 1i64)).reduce_by_key_and_window_inv(
            |a, b| a + b,
            |a, b| a - b,
            window,
            slide,
            num_partitions,
            Some(keep),
        )
    }
}

// ── Pair operations ──────────────────────────────────────────────────────────

impl<K: StreamKey, V: StreamData> DStream<(K, V)> {
    pub fn map_values<U, F>(&self, f: F) -> DStream<(K, U)>
    where
        U: StreamData,
        F: Fn(&V) -> U + Send + Sync + 'static,
    {
        self.transformed(
            "map_values",
            BatchFn::plain(move |ds: &Dataset<(K, V)>| Ok(ds.map_values(&f))),
        )
    }

    pub fn flat_map_values<U, I, F>(&self, f: F) -> DStream<(K, U)>
    where
        U: StreamData,
        I: IntoIterator<Item = U>,
        F: Fn(&V) -> I + Send + Sync + 'static,
    {
        self.transformed(
            "flat_map_values",
            BatchFn::plain(move |ds: &Dataset<(K, V)>| Ok(ds.flat_map_values(&f))),
        )
    }

    pub fn combine_by_key<C, Cr, Mv, Mc>(
        &self,
        create_combiner: Cr,
        merge_value: Mv,
        merge_combiners: Mc,
        num_partitions: Option<usize>,
    ) -> DStream<(K, C)>
    where
        C: StreamData,
        Cr: Fn(V) -> C + Send + Sync + 'static,
        Mv: Fn(C, V) -> C + Send + Sync + 'static,
        Mc: Fn(C, C) -> C + Send + Sync + 'static,
    {
        let n = self.partitions(num_partitions);
        self.transformed(
            "combine_by_key",
            BatchFn::plain(move |ds: &Dataset<(K, V)>| {
                Ok(ds.combine_by_key(&create_combiner, &merge_value, &merge_combiners, n))
            }),
        )
    }

    pub fn reduce_by_key<F>(&self, f: F, num_partitions: Option<usize>) -> DStream<(K, V)>
    where
        F: Fn(V, V) -> V + Send + Sync + 'static,
    {
        let n = self.partitions(num_partitions);
        self.transformed(
            "reduce_by_key",
            BatchFn::plain(move |ds: &Dataset<(K, V)>| Ok(ds.reduce_by_key(&f, n))),
        )
    }

    pub fn group_by_key(&self, num_partitions: Option<usize>) -> DStream<(K, Vec<V>)> {
        let n = self.partitions(num_partitions);
        self.transformed(
            "group_by_key",
            BatchFn::plain(move |ds: &Dataset<(K, V)>| Ok(ds.group_by_key(n))),
        )
    }

    /// Hash-partition every batch into `num_partitions` partitions.
    pub fn partition_by(&self, num_partitions: usize) -> DStream<(K, V)> {
        self.transformed(
            "partition_by",
            BatchFn::plain(move |ds: &Dataset<(K, V)>| Ok(ds.partition_by(num_partitions))),
        )
    }

    /// Partition every batch with a custom hash partitioner.
    pub fn partition_by_with(&self, partitioner: HashPartitioner<K>) -> DStream<(K, V)> {
        self.transformed(
            "partition_by",
            BatchFn::plain(move |ds: &Dataset<(K, V)>| Ok(ds.partition_by_with(&partitioner))),
        )
    }

    pub fn cogroup<W: StreamData>(
        &self,
        other: &DStream<(K, W)>,
        num_partitions: Option<usize>,
    ) -> DStream<(K, (Vec<V>, Vec<W>))> {
        let n = self.partitions(num_partitions);
        self.transformed_with(
            other,
            "cogroup",
            BatchFn2::plain(move |a: &Dataset<(K, V)>, b: &Dataset<(K, W)>| Ok(a.cogroup(b, n))),
        )
    }

    pub fn join<W: StreamData>(
        &self,
        other: &DStream<(K, W)>,
        num_partitions: Option<usize>,
    ) -> DStream<(K, (V, W))> {
        let n = self.partitions(num_partitions);
        self.transformed_with(
            other,
            "join",
            BatchFn2::plain(move |a: &Dataset<(K, V)>, b: &Dataset<(K, W)>| Ok(a.join(b, n))),
        )
    }

    pub fn left_outer_join<W: StreamData>(
        &self,
        other: &DStream<(K, W)>,
        num_partitions: Option<usize>,
    ) -> DStream<(K, (V, Option<W>))> {
        let n = self.partitions(num_partitions);
        self.transformed_with(
            other,
            "left_outer_join",
            BatchFn2::plain(move |a: &Dataset<(K, V)>, b: &Dataset<(K, W)>| {
                Ok(a.left_outer_join(b, n))
            }),
        )
    }

    pub fn right_outer_join<W: StreamData>(
        &self,
        other: &DStream<(K, W)>,
        num_partitions: Option<usize>,
    ) -> DStream<(K, (Option<V>, W))> {
        let n = self.partitions(num_partitions);
        self.transformed_with(
            other,
            "right_outer_join",
            BatchFn2::plain(move |a: &Dataset<(K, V)>, b: &Dataset<(K, W)>| {
                Ok(a.right_outer_join(b, n))
            }),
        )
    }

    pub fn full_outer_join<W: StreamData>(
        &self,
        other: &DStream<(K, W)>,
        num_partitions: Option<usize>,
    ) -> DStream<(K, (Option<V>, Option<W>))> {
        let n = self.partitions(num_partitions);
        self.transformed_with(
            other,
            "full_outer_join",
            BatchFn2::plain(move |a: &Dataset<(K, V)>, b: &Dataset<(K, W)>| {
                Ok(a.full_outer_join(b, n))
            }),
        )
    }

    fn reduced_window(
        &self,
        reducer: WindowReducer<K, V>,
        window: Duration,
        slide: Option<Duration>,
    ) -> Result<DStream<(K, V)>, ConfigError> {
        let spec = WindowSpec::new(window, slide, self.slide_ms())?;
        let per_batch = {
            let reducer = reducer.clone();
            self.transformed(
                "reduce_by_key",
                BatchFn::plain(move |ds: &Dataset<(K, V)>| Ok(reducer.reduce(ds))),
            )
        };
        let info = self.ctx.node_info(
            NodeKind::ReducedWindowed,
            "reduce_by_key_and_window",
            spec.slide_ms,
            &[per_batch.id()],
        );
        Ok(self.ctx.attach(ReducedWindowedNode::new(
            info,
            per_batch.node.clone(),
            spec,
            reducer,
        )))
    }

    /// Per-key reduce over each window, recomputed from the per-batch
    /// reduces on every emission.
    pub fn reduce_by_key_and_window<F>(
        &self,
        f: F,
        window: Duration,
        slide: Option<Duration>,
        num_partitions: Option<usize>,
    ) -> Result<DStream<(K, V)>, ConfigError>
    where
        F: Fn(V, V) -> V + Send + Sync + 'static,
    {
        let func: ReduceFn<V> = Arc::new(f);
        let reducer = WindowReducer::new(func, self.partitions(num_partitions));
        self.reduced_window(reducer, window, slide)
    }

    /// Per-key windowed reduce maintained incrementally: each emission
    /// takes the leaving batches out of the previous window with `inverse`
    /// and merges the entering ones with `f`.
    ///
    /// `inverse(f(x, y), x) == y` must hold. Keys whose value returns to the
    /// identity stay in the output unless `filter` drops them.
    pub fn reduce_by_key_and_window_inv<F, G>(
        &self,
        f: F,
        inverse: G,
        window: Duration,
        slide: Option<Duration>,
        num_partitions: Option<usize>,
        filter: Option<FilterFn<(K, V)>>,
    ) -> Result<DStream<(K, V)>, ConfigError>
    where
        F: Fn(V, V) -> V + Send + Sync + 'static,
        G: Fn(V, V) -> V + Send + Sync + 'static,
    {
        let func: ReduceFn<V> = Arc::new(f);
        let inverse: ReduceFn<V> = Arc::new(inverse);
        let mut reducer =
            WindowReducer::new(func, self.partitions(num_partitions)).with_inverse(inverse);
        if let Some(filter) = filter {
            reducer = reducer.with_filter(filter);
        }
        self.reduced_window(reducer, window, slide)
    }

    /// All values of each key within each window, oldest first. Keys with
    /// no values left in the window are dropped.
    pub fn group_by_key_and_window(
        &self,
        window: Duration,
        slide: Option<Duration>,
        num_partitions: Option<usize>,
    ) -> Result<DStream<(K, Vec<V>)>, ConfigError> {
        let keep: FilterFn<(K, Vec<V>)> = Arc::new(|(_, values): &(K, Vec<V>)| !values.is_empty());
        self.group_by_key(num_partitions).reduce_by_key_and_window_inv(
            |mut acc: Vec<V>, more: Vec<V>| {
                acc.extend(more);
                acc
            },
            // Leaving values were appended first.
            |acc: Vec<V>, gone: Vec<V>| acc.into_iter().skip(gone.len()).collect(),
            window,
            slide,
            num_partitions,
            Some(keep),
        )
    }

    // ── State ────────────────────────────────────────────────────────────────

    /// Running per-key state. On every batch `update(new_values, state)` is
    /// called for each key that has new values or existing state; returning
    /// `None` removes the key.
    pub fn update_state_by_key<S, F>(&self, update: F, num_partitions: Option<usize>) -> DStream<(K, S)>
    where
        S: StreamData,
        F: Fn(&[V], Option<&S>) -> Option<S> + Send + Sync + 'static,
    {
        self.state_stream(Arc::new(update), num_partitions, None)
    }

    /// As [`update_state_by_key`](Self::update_state_by_key), starting from
    /// `initial` instead of an empty table.
    pub fn update_state_by_key_with_initial<S, F>(
        &self,
        update: F,
        num_partitions: Option<usize>,
        initial: &Dataset<(K, S)>,
    ) -> DStream<(K, S)>
    where
        S: StreamData,
        F: Fn(&[V], Option<&S>) -> Option<S> + Send + Sync + 'static,
    {
        self.state_stream(Arc::new(update), num_partitions, Some(initial))
    }

    fn state_stream<S: StreamData>(
        &self,
        update: UpdateFn<V, S>,
        num_partitions: Option<usize>,
        initial: Option<&Dataset<(K, S)>>,
    ) -> DStream<(K, S)> {
        let info = self.ctx.node_info(
            NodeKind::StateByKey,
            "update_state_by_key",
            self.slide_ms(),
            &[self.id()],
        );
        self.ctx.attach(StateNode::new(
            info,
            self.node.clone(),
            update,
            self.partitions(num_partitions),
            initial,
        ))
    }
}
