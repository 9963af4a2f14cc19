use std::{future::Future, sync::Arc, time::Duration};

use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::{
    concurrency::Concurrency,
    emitter::PanicGuard,
    error::{Error, Result},
    handoff::{handoff, Handoff},
    operator::Operator,
    ops::{
        batch::Batch,
        buffer::Buffer,
        concurrent::Concurrent,
        delay::{Delay, DelayWhen},
        enumerate::Enumerate,
        filter::Filter,
        filter_map::FilterMap,
        finalize::Finalize,
        flat_map::{FlatMap, Step},
        map::Map,
        sample::{SampleTime, SampleWhen},
        skip::{Skip, SkipWhile},
        take::{Take, TakeWhile},
        tap::Tap,
    },
};

/// The consumer side of a hand-off pair: a finite, single-pass sequence of
/// values with backpressure, cancellation and disposal control.
///
/// A `Pipeline` is consumed recv-style:
///
/// ```rust
/// use millrace::Pipeline;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let mut pipeline = Pipeline::from_iter(vec![1, 2, 3]);
///
/// while let Some(value) = pipeline.next().await.unwrap() {
///     println!("{value}");
/// }
/// # });
/// ```
///
/// Operators are attached either with the named methods or with
/// [`pipe`](Pipeline::pipe):
///
/// ```rust
/// use millrace::Pipeline;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let doubled_evens = Pipeline::from_iter(1..=6)
///     .filter(|x| x % 2 == 0)
///     .map(|x| async move { x * 2 })
///     .collect()
///     .await
///     .unwrap();
///
/// assert_eq!(doubled_evens, vec![4, 8, 12]);
/// # });
/// ```
///
/// A pipeline has exactly one consumer: `next` takes `&mut self` and the
/// handle is not `Clone`, so concurrent reads of one pipeline do not
/// compile. Dropping a pipeline before end-of-stream disposes the source,
/// which rejects the producer's pending and future emits.
pub struct Pipeline<V> {
    handoff: Arc<Handoff<V>>,
}

impl<V> Drop for Pipeline<V> {
    fn drop(&mut self) {
        self.handoff.dispose();
    }
}

impl<V> Pipeline<V> {
    pub(crate) fn new(handoff: Arc<Handoff<V>>) -> Self {
        Pipeline { handoff }
    }

    /// Returns the next value; `Ok(None)` once the stream ended. A stream
    /// error is returned on this and every subsequent call.
    ///
    /// Cancellation safe: dropping the returned future never loses a value.
    pub async fn next(&mut self) -> Result<Option<V>> {
        Arc::clone(&self.handoff).next().await
    }

    /// Like [`next`](Pipeline::next), but resolves `Err(Error::Cancelled)`
    /// if the token fires while waiting. The stream stays intact; a value
    /// arriving during a cancelled wait is returned by the following call.
    pub async fn next_with(&mut self, cancel: &CancellationToken) -> Result<Option<V>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            next = Arc::clone(&self.handoff).next() => next,
        }
    }

    /// Abandons the stream. The producer's pending and future emits reject
    /// with [`Error::Disposed`]; subsequent `next` calls return `Ok(None)`.
    /// Idempotent.
    pub fn dispose(&self) {
        self.handoff.dispose();
    }

    pub fn is_complete(&self) -> bool {
        self.handoff.is_complete()
    }

    pub fn is_disposed(&self) -> bool {
        self.handoff.is_disposed()
    }

    pub fn is_consumed(&self) -> bool {
        self.handoff.is_consumed()
    }

    /// Applies an operator, yielding the transformed pipeline. This is the
    /// extension point for custom operators; the named methods below are
    /// sugar over it. Composition is associative: attaching `a` then `b`
    /// sees the same values as attaching a fused `b ∘ a`.
    pub fn pipe<Op, Out>(self, op: Op) -> Pipeline<Out>
    where
        Op: Operator<V, Out>,
    {
        op.apply(self)
    }
}

impl<V> Pipeline<V>
where
    V: Send + 'static,
{
    /// Builds a pipeline from an [`IntoIterator`]. A producer task emits
    /// each element with backpressure and completes at the end.
    #[allow(clippy::should_implement_trait)] // `FromIterator` cannot spawn
    pub fn from_iter<I>(iter: I) -> Pipeline<V>
    where
        I: IntoIterator<Item = V> + Send + 'static,
        I::IntoIter: Send,
    {
        let (emitter, pipeline) = handoff();

        tokio::spawn(async move {
            let emitter = PanicGuard::new(emitter);
            for value in iter {
                if emitter.emit(value).await.is_err() {
                    return;
                }
            }
            let _ = emitter.complete();
        });

        pipeline
    }

    /// Builds a pipeline from a [`futures::Stream`].
    pub fn from_stream(stream: impl Stream<Item = V> + Send + 'static) -> Pipeline<V> {
        use futures::StreamExt;

        let (emitter, pipeline) = handoff();

        tokio::spawn(async move {
            let emitter = PanicGuard::new(emitter);
            tokio::pin!(stream);
            while let Some(value) = stream.next().await {
                if emitter.emit(value).await.is_err() {
                    return;
                }
            }
            let _ = emitter.complete();
        });

        pipeline
    }

    /// Adapts the pipeline into a [`futures::Stream`]. A stream error is
    /// yielded once as an `Err` item, after which the stream ends.
    pub fn into_stream(self) -> impl Stream<Item = Result<V>> {
        futures::stream::unfold(Some(self), |pipeline| async move {
            let mut pipeline = pipeline?;
            match pipeline.next().await {
                Ok(Some(value)) => Some((Ok(value), Some(pipeline))),
                Ok(None) => None,
                Err(error) => Some((Err(error), None)),
            }
        })
    }

    /// Applies an async function to every value.
    ///
    /// # Example
    /// ```rust
    /// use millrace::Pipeline;
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let values = Pipeline::from_iter(vec![1, 2, 3])
    ///     .map(|x| async move { x * 2 })
    ///     .collect()
    ///     .await
    ///     .unwrap();
    ///
    /// assert_eq!(values, vec![2, 4, 6]);
    /// # });
    /// ```
    pub fn map<F, Fut, Out>(self, map_fn: F) -> Pipeline<Out>
    where
        F: FnMut(V) -> Fut + Send + 'static,
        Fut: Future<Output = Out> + Send,
        Out: Send + 'static,
    {
        self.pipe(Map { map_fn })
    }

    /// Keeps only the values matching the predicate.
    pub fn filter<F>(self, predicate: F) -> Pipeline<V>
    where
        F: FnMut(&V) -> bool + Send + 'static,
    {
        self.pipe(Filter { predicate })
    }

    /// Applies an async function to every value, dropping the `None`s.
    ///
    /// # Example
    /// ```rust
    /// use millrace::Pipeline;
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let even = Pipeline::from_iter(vec![1, 2, 3, 4])
    ///     .filter_map(|x| async move { (x % 2 == 0).then_some(x) })
    ///     .collect()
    ///     .await
    ///     .unwrap();
    ///
    /// assert_eq!(even, vec![2, 4]);
    /// # });
    /// ```
    pub fn filter_map<F, Fut, Out>(self, map_fn: F) -> Pipeline<Out>
    where
        F: FnMut(V) -> Fut + Send + 'static,
        Fut: Future<Output = Option<Out>> + Send,
        Out: Send + 'static,
    {
        self.pipe(FilterMap { map_fn })
    }

    /// Skips the first `n` values.
    pub fn skip(self, n: usize) -> Pipeline<V> {
        self.pipe(Skip { n })
    }

    /// Skips values while the predicate holds, then forwards everything.
    pub fn skip_while<F>(self, predicate: F) -> Pipeline<V>
    where
        F: FnMut(&V) -> bool + Send + 'static,
    {
        self.pipe(SkipWhile { predicate })
    }

    /// Forwards the first `n` values, then ends and disposes the upstream.
    pub fn take(self, n: usize) -> Pipeline<V> {
        self.pipe(Take { n })
    }

    /// Forwards values while the predicate holds, then ends and disposes
    /// the upstream. The first failing value is dropped.
    pub fn take_while<F>(self, predicate: F) -> Pipeline<V>
    where
        F: FnMut(&V) -> bool + Send + 'static,
    {
        self.pipe(TakeWhile { predicate })
    }

    /// Observes every value without consuming it.
    pub fn tap<F>(self, tap_fn: F) -> Pipeline<V>
    where
        F: FnMut(&V) + Send + 'static,
    {
        self.pipe(Tap { tap_fn })
    }

    /// Pairs every value with its arrival index, starting at 0.
    pub fn enumerate(self) -> Pipeline<(usize, V)> {
        self.pipe(Enumerate)
    }

    /// Delays every value by `duration` before forwarding it.
    pub fn delay(self, duration: Duration) -> Pipeline<V> {
        self.pipe(Delay { duration })
    }

    /// Holds one value at a time, forwarding it when `trigger` emits. Ends
    /// when either side ends.
    pub fn delay_when<T>(self, trigger: Pipeline<T>) -> Pipeline<V>
    where
        T: Send + 'static,
    {
        self.pipe(DelayWhen { trigger })
    }

    /// Keeps the most recent value; each `trigger` emission forwards it, at
    /// most once per upstream value. Trigger firings with nothing fresh
    /// forward nothing.
    pub fn sample_when<T>(self, trigger: Pipeline<T>) -> Pipeline<V>
    where
        T: Send + 'static,
    {
        self.pipe(SampleWhen { trigger })
    }

    /// [`sample_when`](Pipeline::sample_when) against a periodic clock.
    pub fn sample_time(self, period: Duration) -> Pipeline<V> {
        self.pipe(SampleTime { period })
    }

    /// Runs `finalize_fn` exactly once when the stream terminates, whether
    /// by completion, error or disposal.
    pub fn finalize<F>(self, finalize_fn: F) -> Pipeline<V>
    where
        F: FnOnce() + Send + 'static,
    {
        self.pipe(Finalize { finalize_fn })
    }

    /// Decouples upstream from downstream with an `n`-value buffer. When a
    /// downstream operation slows down, up to `n` results accumulate before
    /// the upstream suspends.
    pub fn buffer(self, n: usize) -> Pipeline<V> {
        self.pipe(Buffer { n })
    }

    /// Groups values into `Vec`s of at most `n`; a final partial batch is
    /// flushed when the upstream ends.
    pub fn batch(self, n: usize) -> Pipeline<Vec<V>> {
        self.pipe(Batch { n })
    }

    /// Processes values through per-worker copies of the `chain` with the
    /// parallelism and ordering described by `concurrency`.
    ///
    /// The chain must produce exactly one output per input; see
    /// [`Concurrent`] for the full contract.
    ///
    /// # Example
    /// ```rust
    /// use std::sync::Arc;
    /// use millrace::{Concurrency, Pipeline};
    /// use tokio::sync::Semaphore;
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let semaphore = Arc::new(Semaphore::new(4));
    /// let values = Pipeline::from_iter(1..=10)
    ///     .concurrent(Concurrency::ordered(semaphore), |chain| {
    ///         chain.map(|x| async move { x * 2 })
    ///     })
    ///     .collect()
    ///     .await
    ///     .unwrap();
    ///
    /// assert_eq!(values, (1..=10).map(|x| x * 2).collect::<Vec<_>>());
    /// # });
    /// ```
    pub fn concurrent<F, Out>(self, concurrency: Concurrency, chain: F) -> Pipeline<Out>
    where
        F: Fn(Pipeline<V>) -> Pipeline<Out> + Send + Sync + 'static,
        Out: Send + 'static,
    {
        self.pipe(Concurrent { concurrency, chain })
    }

    /// Invokes `f(value, index)` for every value and forwards all items it
    /// yields. A [`Step::Stop`] item ends the stream early and disposes the
    /// upstream. Parallelism and ordering follow `concurrency`.
    pub fn flat_map<F, Fut, I, Out>(self, concurrency: Concurrency, flat_map_fn: F) -> Pipeline<Out>
    where
        F: Fn(V, usize) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = I> + Send,
        I: IntoIterator<Item = Step<Out>> + Send + 'static,
        I::IntoIter: Send,
        Out: Send + 'static,
    {
        self.pipe(FlatMap {
            flat_map_fn,
            concurrency,
        })
    }

    /// Runs an async function on every value, discarding the results.
    pub async fn each<F, Fut>(mut self, mut each_fn: F) -> Result<()>
    where
        F: FnMut(V) -> Fut,
        Fut: Future<Output = ()>,
    {
        while let Some(value) = self.next().await? {
            each_fn(value).await;
        }
        Ok(())
    }

    /// Folds the pipeline into an accumulator.
    ///
    /// # Example
    /// ```rust
    /// use millrace::Pipeline;
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let sum = Pipeline::from_iter(vec![1, 2, 3, 4, 5])
    ///     .reduce(0, |acc, x| acc + x)
    ///     .await
    ///     .unwrap();
    ///
    /// assert_eq!(sum, 15);
    /// # });
    /// ```
    pub async fn reduce<Acc, F>(mut self, init: Acc, mut reduce_fn: F) -> Result<Acc>
    where
        F: FnMut(Acc, V) -> Acc,
    {
        let mut acc = init;
        while let Some(value) = self.next().await? {
            acc = reduce_fn(acc, value);
        }
        Ok(acc)
    }

    /// Drains the pipeline into a `Vec`.
    pub async fn collect(mut self) -> Result<Vec<V>> {
        let mut values = Vec::new();
        while let Some(value) = self.next().await? {
            values.push(value);
        }
        Ok(values)
    }

    /// Drains the pipeline, discarding values; returns how many there were.
    pub async fn drain(mut self) -> Result<usize> {
        let mut count = 0;
        while self.next().await?.is_some() {
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;

    use crate::{handoff, ops::map::Map, Error, Pipeline};

    #[tokio::test]
    async fn round_trips_an_iterable() {
        let values = vec![1, 2, 3, 4, 5];
        let collected = Pipeline::from_iter(values.clone()).collect().await.unwrap();
        assert_eq!(collected, values);
    }

    #[tokio::test]
    async fn reduce_sums() {
        let sum = Pipeline::from_iter(vec![1, 2, 3, 4, 5])
            .reduce(0, |acc, x| acc + x)
            .await
            .unwrap();
        assert_eq!(sum, 15);
    }

    #[tokio::test]
    async fn drain_counts_values() {
        let count = Pipeline::from_iter(vec!["a", "b", "c"])
            .delay(Duration::from_millis(1))
            .drain()
            .await
            .unwrap();
        assert_eq!(count, 3);

        let empty = Pipeline::from_iter(Vec::<i32>::new())
            .drain()
            .await
            .unwrap();
        assert_eq!(empty, 0);
    }

    #[tokio::test]
    async fn errors_surface_on_terminal_operations() {
        let (emitter, pipeline) = handoff();

        tokio::spawn(async move {
            let _ = emitter.emit(1).await;
            let _ = emitter.error("kaput");
        });

        let result = pipeline.reduce(0, |acc, x: i32| acc + x).await;
        assert!(matches!(result, Err(Error::Custom(ref m)) if m == "kaput"));
    }

    #[tokio::test]
    async fn panicking_operator_surfaces_as_an_error() {
        let result = Pipeline::from_iter(vec![1, 2, 3])
            .map(|x| async move {
                if x == 2 {
                    panic!("2 is not supported");
                }
                x
            })
            .collect()
            .await;

        assert!(matches!(result, Err(Error::Panicked)));
    }

    #[tokio::test]
    async fn disposed_pipeline_surfaces_end_of_stream() {
        let (emitter, mut pipeline) = handoff::<i32>();
        drop(emitter);

        pipeline.dispose();
        assert_eq!(pipeline.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn pipe_and_named_methods_compose_the_same() {
        let via_pipe = Pipeline::from_iter(1..=10)
            .pipe(Map {
                map_fn: |x: i32| async move { x + 1 },
            })
            .filter(|x| x % 2 == 0)
            .collect()
            .await
            .unwrap();

        let via_methods = Pipeline::from_iter(1..=10)
            .map(|x| async move { x + 1 })
            .filter(|x| x % 2 == 0)
            .collect()
            .await
            .unwrap();

        assert_eq!(via_pipe, via_methods);
        assert_eq!(via_pipe, vec![2, 4, 6, 8, 10]);
    }

    #[tokio::test]
    async fn from_stream_forwards_all_values() {
        let stream = futures::stream::iter(vec![1, 2, 3]);
        let values = Pipeline::from_stream(stream).collect().await.unwrap();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn into_stream_yields_values_then_ends() {
        let stream = Pipeline::from_iter(vec![1, 2]).into_stream();
        let values: Vec<_> = stream.collect().await;
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].as_ref().unwrap(), &1);
        assert_eq!(values[1].as_ref().unwrap(), &2);
    }

    #[tokio::test]
    async fn dropping_a_pipeline_stops_the_producer() {
        let (emitter, pipeline) = handoff::<i32>();
        let probe = emitter.clone();

        drop(pipeline);
        assert!(probe.is_disposed());
        assert!(matches!(emitter.emit(1).await, Err(Error::Disposed)));
    }

    #[tokio::test]
    async fn each_visits_every_value() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        Pipeline::from_iter(vec![1, 2, 3])
            .each(|x| {
                let tx = tx.clone();
                async move {
                    tx.send(x).unwrap();
                }
            })
            .await
            .unwrap();

        drop(tx);
        let mut seen = Vec::new();
        while let Some(x) = rx.recv().await {
            seen.push(x);
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }
}
