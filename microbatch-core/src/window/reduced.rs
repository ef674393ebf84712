use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::*;

// ── WindowReducer ────────────────────────────────────────────────────────────

/// The reduce, inverse-reduce and filter steps of a keyed windowed reduce.
///
/// For the incremental path to be exact, `inverse(reduce(x, y), x) == y`
/// must hold for every value `x` that was merged in.
pub struct WindowReducer<K, V> {
    func: ReduceFn<V>,
    inverse: Option<ReduceFn<V>>,
    filter: Option<FilterFn<(K, V)>>,
    num_partitions: usize,
}

impl<K, V> Clone for WindowReducer<K, V> {
    fn clone(&self) -> Self {
        Self {
            func: Arc::clone(&self.func),
            inverse: self.inverse.clone(),
            filter: self.filter.clone(),
            num_partitions: self.num_partitions,
        }
    }
}

impl<K: StreamKey, V: StreamData> WindowReducer<K, V> {
    pub fn new(func: ReduceFn<V>, num_partitions: usize) -> Self {
        Self {
            func,
            inverse: None,
            filter: None,
            num_partitions: num_partitions.max(1),
        }
    }

    pub fn with_inverse(mut self, inverse: ReduceFn<V>) -> Self {
        self.inverse = Some(inverse);
        self
    }

    pub fn with_filter(mut self, filter: FilterFn<(K, V)>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn is_invertible(&self) -> bool {
        self.inverse.is_some()
    }

    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    /// Per-key reduce of `data`.
    pub fn reduce(&self, data: &Dataset<(K, V)>) -> Dataset<(K, V)> {
        let func = &self.func;
        data.reduce_by_key(|a, b| func(a, b), self.num_partitions)
    }

    /// Merge the entering batches into `previous`, then apply the filter.
    pub fn add(
        &self,
        previous: Option<&Dataset<(K, V)>>,
        entering: &Dataset<(K, V)>,
    ) -> Dataset<(K, V)> {
        let entering = self.reduce(entering);
        let merged = match previous {
            Some(previous) => self.reduce(&previous.union(&entering)),
            None => entering,
        };
        match &self.filter {
            Some(keep) => merged.filter(|row| keep(row)),
            None => merged,
        }
    }

    /// Take the leaving batches out of `previous` with the inverse function.
    ///
    /// Keys with no leaving contribution keep their value. Without an
    /// inverse function `previous` is returned unchanged.
    pub fn subtract(
        &self,
        previous: &Dataset<(K, V)>,
        leaving: &Dataset<(K, V)>,
    ) -> Dataset<(K, V)> {
        let Some(inverse) = &self.inverse else {
            return previous.clone();
        };
        let leaving = self.reduce(leaving);
        previous
            .left_outer_join(&leaving, self.num_partitions)
            .map_values(|(old, gone)| match gone {
                Some(gone) => inverse(old.clone(), gone.clone()),
                None => old.clone(),
            })
    }
}

// ── WindowSnapshot ──────────────────────────────────────────────────────────

/// Checkpoint of an incremental window: the aggregate at the checkpoint time
/// plus the parent batches still inside that window, which later ticks
/// subtract again.
#[derive(Serialize, Deserialize)]
struct WindowSnapshot {
    window: Vec<u8>,
    /// `(batch time ms, dataset bytes)`, oldest first.
    history: Vec<(i64, Vec<u8>)>,
}

// ── ReducedWindowedNode ──────────────────────────────────────────────────────

/// Keyed windowed reduce over a parent that is already reduced per batch.
///
/// With an inverse function and the previous window still in memory, the
/// window is advanced by subtracting the batches that left it and merging the
/// batches that entered it. Otherwise the whole window is reduced again.
pub struct ReducedWindowedNode<K: StreamKey, V: StreamData> {
    info: NodeInfo,
    parent: NodeRef<(K, V)>,
    spec: WindowSpec,
    reducer: WindowReducer<K, V>,
    generated: GeneratedBatches<(K, V)>,
}

impl<K: StreamKey, V: StreamData> ReducedWindowedNode<K, V> {
    /// `info` must slide by `spec.slide_ms`.
    pub fn new(
        info: NodeInfo,
        parent: NodeRef<(K, V)>,
        spec: WindowSpec,
        reducer: WindowReducer<K, V>,
    ) -> Self {
        // The leaving batches lie up to one slide before the current window.
        parent
            .info()
            .remember_at_least(spec.window_ms + spec.slide_ms);
        Self {
            info,
            parent,
            spec,
            reducer,
            generated: GeneratedBatches::new(),
        }
    }

    pub fn spec(&self) -> WindowSpec {
        self.spec
    }

    fn previous_window(&self, time: BatchTime) -> Result<Option<Dataset<(K, V)>>> {
        if !self.reducer.is_invertible() || self.spec.window_ms < self.spec.slide_ms {
            return Ok(None);
        }
        self.generated.get(time.minus_millis(self.spec.slide_ms))
    }

    fn recompute(&self, time: BatchTime) -> Result<Dataset<(K, V)>> {
        let (from, to) = self.spec.covered(time, self.parent.info().slide_ms());
        let batches = self.parent.slice(from, to)?;
        Ok(self.reducer.add(None, &Dataset::union_all(&batches)))
    }
}

impl<K: StreamKey, V: StreamData> Node for ReducedWindowedNode<K, V> {
    type Output = (K, V);

    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn parents(&self) -> Vec<Arc<dyn AnyNode>> {
        vec![Arc::clone(self.parent.erased())]
    }

    fn compute(&self, time: BatchTime) -> Result<Option<Dataset<(K, V)>>> {
        let Some(previous) = self.previous_window(time)? else {
            return self.recompute(time).map(Some);
        };

        let parent_slide = self.parent.info().slide_ms();
        let previous_end = time.minus_millis(self.spec.slide_ms);

        // Batches in (previous_end - window, time - window] leave the window.
        let leaving = self.parent.slice(
            previous_end
                .minus_millis(self.spec.window_ms)
                .plus_millis(parent_slide),
            time.minus_millis(self.spec.window_ms),
        )?;
        let subtracted = if leaving.is_empty() {
            previous
        } else {
            self.reducer
                .subtract(&previous, &Dataset::union_all(&leaving))
        };

        // Batches in (previous_end, time] enter it.
        let entering = self
            .parent
            .slice(previous_end.plus_millis(parent_slide), time)?;
        let current = self
            .reducer
            .add(Some(&subtracted), &Dataset::union_all(&entering));

        debug!(
            node = self.info.id(),
            %time,
            leaving = leaving.len(),
            entering = entering.len(),
            "advanced window incrementally"
        );
        Ok(Some(current))
    }

    fn generated(&self) -> &GeneratedBatches<(K, V)> {
        &self.generated
    }

    fn snapshot_batch(&self, time: BatchTime) -> Result<Option<Vec<u8>>> {
        let Some(window) = self.generated.get(time)? else {
            return Ok(None);
        };
        let mut history = Vec::new();
        if self.reducer.is_invertible() {
            let parent_slide = self.parent.info().slide_ms();
            let (from, to) = self.spec.covered(time, parent_slide);
            let mut at = from;
            while at <= to {
                if let Some(data) = self.parent.get_or_compute(at)? {
                    history.push((at.millis(), data.to_bytes()?));
                }
                at = at.plus_millis(parent_slide);
            }
        }
        let snapshot = WindowSnapshot {
            window: window.to_bytes()?,
            history,
        };
        bincode::serialize(&snapshot)
            .map(Some)
            .context("serialize window snapshot failed")
    }

    fn restore_snapshot(&self, time: BatchTime, bytes: &[u8]) -> Result<()> {
        let snapshot: WindowSnapshot =
            bincode::deserialize(bytes).context("deserialize window snapshot failed")?;
        for (ms, data) in &snapshot.history {
            self.parent
                .typed()
                .restore_batch(BatchTime::from_millis(*ms), Dataset::from_bytes(data)?)?;
        }
        debug!(
            node = self.info.id(),
            %time,
            parent_batches = snapshot.history.len(),
            "restored window"
        );
        self.generated
            .insert(time, Dataset::from_bytes(&snapshot.window)?)
    }
}
