use crate::pipeline::Pipeline;

/// A pipeline-to-pipeline transform.
///
/// The standard implementation shape: create a new hand-off pair, spawn a
/// task that drives the input with `next` and feeds the pair's emitter, and
/// return the pair's pipeline. Terminal states propagate through the task:
/// upstream end completes downstream, upstream errors are forwarded, and a
/// failing downstream emit (the consumer disposed) makes the task exit,
/// dropping and thereby disposing the upstream.
///
/// Implement this to plug a custom operator into
/// [`Pipeline::pipe`](crate::Pipeline::pipe):
///
/// ```rust
/// use millrace::{handoff, Operator, Pipeline};
///
/// // an operator that emits every value twice
/// struct Echo;
///
/// impl<V: Clone + Send + 'static> Operator<V, V> for Echo {
///     fn apply(self, mut input: Pipeline<V>) -> Pipeline<V> {
///         let (emitter, output) = handoff();
///         tokio::spawn(async move {
///             loop {
///                 match input.next().await {
///                     Ok(Some(value)) => {
///                         if emitter.emit(value.clone()).await.is_err() {
///                             break;
///                         }
///                         if emitter.emit(value).await.is_err() {
///                             break;
///                         }
///                     }
///                     Ok(None) => {
///                         let _ = emitter.complete();
///                         break;
///                     }
///                     Err(error) => {
///                         let _ = emitter.error(error);
///                         break;
///                     }
///                 }
///             }
///         });
///         output
///     }
/// }
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let values = Pipeline::from_iter(vec![1, 2])
///     .pipe(Echo)
///     .collect()
///     .await
///     .unwrap();
/// assert_eq!(values, vec![1, 1, 2, 2]);
/// # });
/// ```
pub trait Operator<In, Out> {
    /// Attaches the operator to `input`, returning the transformed
    /// pipeline.
    fn apply(self, input: Pipeline<In>) -> Pipeline<Out>;
}
