use super::*;

/// Per-batch function in the form every node stores: it always sees the batch time.
pub type TimedFn<I, O> = Arc<dyn Fn(BatchTime, &Dataset<I>) -> Result<Dataset<O>> + Send + Sync>;

/// Binary per-batch function in timed form.
pub type TimedFn2<A, B, O> =
    Arc<dyn Fn(BatchTime, &Dataset<A>, &Dataset<B>) -> Result<Dataset<O>> + Send + Sync>;

/// Transform function over the parent's boxed output.
pub type ErasedFn<O> = Arc<dyn Fn(BatchTime, Box<dyn Any + Send>) -> Result<Dataset<O>> + Send + Sync>;

type ErasedFn2<O> = Arc<
    dyn Fn(BatchTime, Box<dyn Any + Send>, Box<dyn Any + Send>) -> Result<Dataset<O>> + Send + Sync,
>;

/// A unary transform function, with or without access to the batch time.
pub enum BatchFn<I, O> {
    Plain(Arc<dyn Fn(&Dataset<I>) -> Result<Dataset<O>> + Send + Sync>),
    Timed(TimedFn<I, O>),
}

impl<I: 'static, O: 'static> BatchFn<I, O> {
    pub fn plain<F>(f: F) -> Self
    where
        F: Fn(&Dataset<I>) -> Result<Dataset<O>> + Send + Sync + 'static,
    {
        BatchFn::Plain(Arc::new(f))
    }

    pub fn timed<F>(f: F) -> Self
    where
        F: Fn(BatchTime, &Dataset<I>) -> Result<Dataset<O>> + Send + Sync + 'static,
    {
        BatchFn::Timed(Arc::new(f))
    }

    /// Normalize to the timed form.
    pub fn into_timed(self) -> TimedFn<I, O> {
        match self {
            BatchFn::Timed(f) => f,
            BatchFn::Plain(f) => Arc::new(move |_, data| f(data)),
        }
    }
}

/// A binary transform function, with or without access to the batch time.
pub enum BatchFn2<A, B, O> {
    Plain(Arc<dyn Fn(&Dataset<A>, &Dataset<B>) -> Result<Dataset<O>> + Send + Sync>),
    Timed(TimedFn2<A, B, O>),
}

impl<A: 'static, B: 'static, O: 'static> BatchFn2<A, B, O> {
    pub fn plain<F>(f: F) -> Self
    where
        F: Fn(&Dataset<A>, &Dataset<B>) -> Result<Dataset<O>> + Send + Sync + 'static,
    {
        BatchFn2::Plain(Arc::new(f))
    }

    pub fn timed<F>(f: F) -> Self
    where
        F: Fn(BatchTime, &Dataset<A>, &Dataset<B>) -> Result<Dataset<O>> + Send + Sync + 'static,
    {
        BatchFn2::Timed(Arc::new(f))
    }

    pub fn into_timed(self) -> TimedFn2<A, B, O> {
        match self {
            BatchFn2::Timed(f) => f,
            BatchFn2::Plain(f) => Arc::new(move |_, a, b| f(a, b)),
        }
    }
}

fn unbox<T: StreamData>(value: Box<dyn Any + Send>) -> Result<Box<Dataset<T>>> {
    value
        .downcast::<Dataset<T>>()
        .map_err(|_| anyhow!("parent produced a dataset of an unexpected element type"))
}

/// Where a new transform attaches, and the function it runs there.
pub struct TransformPlan<O> {
    pub parent: Arc<dyn AnyNode>,
    pub func: ErasedFn<O>,
    /// The parent transform was folded into `func`.
    pub fused: bool,
}

/// Plan a transform of `parent` (whose output is `Dataset<I>`) by `func`.
///
/// When `parent` is a fusable [`TransformedNode`], its function is composed
/// with `func` and the plan attaches to the grandparent instead.
pub fn plan_transform<I, O>(parent: &Arc<dyn AnyNode>, func: BatchFn<I, O>) -> TransformPlan<O>
where
    I: StreamData,
    O: StreamData,
{
    let func = func.into_timed();
    if let Some(prev) = parent.as_any().downcast_ref::<TransformedNode<I>>() {
        if prev.info.is_fusable() {
            let inner = Arc::clone(&prev.func);
            return TransformPlan {
                parent: Arc::clone(&prev.parent),
                func: Arc::new(move |time, input| {
                    let mid = inner(time, input)?;
                    func(time, &mid)
                }),
                fused: true,
            };
        }
    }
    TransformPlan {
        parent: Arc::clone(parent),
        func: Arc::new(move |time, input| {
            let data = unbox::<I>(input)?;
            func(time, &data)
        }),
        fused: false,
    }
}

/// Single-parent stateless stage.
pub struct TransformedNode<O: StreamData> {
    info: NodeInfo,
    parent: Arc<dyn AnyNode>,
    func: ErasedFn<O>,
    generated: GeneratedBatches<O>,
}

impl<O: StreamData> TransformedNode<O> {
    /// `info` must name `plan.parent` as its only parent.
    pub fn new(info: NodeInfo, plan: TransformPlan<O>) -> Self {
        Self {
            info,
            parent: plan.parent,
            func: plan.func,
            generated: GeneratedBatches::new(),
        }
    }
}

impl<O: StreamData> Node for TransformedNode<O> {
    type Output = O;

    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn parents(&self) -> Vec<Arc<dyn AnyNode>> {
        vec![Arc::clone(&self.parent)]
    }

    fn compute(&self, time: BatchTime) -> Result<Option<Dataset<O>>> {
        match self.parent.get_or_compute_any(time)? {
            Some(input) => (self.func)(time, input).map(Some),
            None => Ok(None),
        }
    }

    fn generated(&self) -> &GeneratedBatches<O> {
        &self.generated
    }
}

/// Two-parent stage; backs `transform_with`, `union`, `cogroup` and the joins.
pub struct TransformedWithNode<O: StreamData> {
    info: NodeInfo,
    left: Arc<dyn AnyNode>,
    right: Arc<dyn AnyNode>,
    func: ErasedFn2<O>,
    generated: GeneratedBatches<O>,
}

impl<O: StreamData> TransformedWithNode<O> {
    pub fn new<A, B>(
        info: NodeInfo,
        left: Arc<dyn AnyNode>,
        right: Arc<dyn AnyNode>,
        func: BatchFn2<A, B, O>,
    ) -> Self
    where
        A: StreamData,
        B: StreamData,
    {
        let func = func.into_timed();
        Self {
            info,
            left,
            right,
            func: Arc::new(move |time, a, b| {
                let a = unbox::<A>(a)?;
                let b = unbox::<B>(b)?;
                func(time, &a, &b)
            }),
            generated: GeneratedBatches::new(),
        }
    }
}

impl<O: StreamData> Node for TransformedWithNode<O> {
    type Output = O;

    fn info(&self) -> &NodeInfo {
        &self.info
    }

    fn parents(&self) -> Vec<Arc<dyn AnyNode>> {
        vec![Arc::clone(&self.left), Arc::clone(&self.right)]
    }

    fn compute(&self, time: BatchTime) -> Result<Option<Dataset<O>>> {
        let left = self.left.get_or_compute_any(time)?;
        let right = self.right.get_or_compute_any(time)?;
        match (left, right) {
            (Some(a), Some(b)) => (self.func)(time, a, b).map(Some),
            _ => Ok(None),
        }
    }

    fn generated(&self) -> &GeneratedBatches<O> {
        &self.generated
    }
}
