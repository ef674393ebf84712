use super::*;

/// Union of the parent's batches over a sliding window.
pub struct WindowedNode<T: StreamData> {
    info: NodeInfo,
    parent: NodeRef<T>,
    spec: WindowSpec,
    generated: GeneratedBatches<T>,
}

impl<T: StreamData> WindowedNode<T> {
    /// `info` must slide by `spec.slide_ms`. The parent is asked to keep a
    /// full window of history.
    pub fn new(info: NodeInfo, parent: NodeRef<T>, spec: WindowSpec) -> Self {
        parent.info().remember_at_least(spec.window_ms);
        Self {
            info,
            parent,
            spec,
            generated: GeneratedBatches::new(),
        }
    }

    pub fn spec(&self) -> WindowSpec {
        self.spec
    }
}

impl<T: StreamData> Node for WindowedNode<T> {
    type Output = T;

    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn parents(&self) -> Vec<Arc<dyn AnyNode>> {
        vec![Arc::clone(self.parent.erased())]
    }

    fn compute(&self, time: BatchTime) -> Result<Option<Dataset<T>>> {
        let (from, to) = self.spec.covered(time, self.parent.info().slide_ms());
        let batches = self.parent.slice(from, to)?;
        Ok(Some(Dataset::union_all(&batches)))
    }

    fn generated(&self) -> &GeneratedBatches<T> {
        &self.generated
    }
}
