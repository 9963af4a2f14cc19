use std::{future::Future, sync::Arc};

use crate::{
    concurrency::Concurrency, emitter::PanicGuard, handoff::handoff, operator::Operator,
    ops::concurrent::Concurrent, pipeline::Pipeline,
};

/// One item yielded by a [`flat_map`](crate::Pipeline::flat_map)
/// invocation.
pub enum Step<T> {
    /// Forward this value downstream.
    Next(T),
    /// End the stream early; the upstream is disposed and in-flight
    /// invocations are cancelled.
    Stop,
}

/// Invokes `f(value, index)` per upstream value and forwards everything it
/// yields. Invocations run through the [`Concurrent`] machinery; with
/// ordering preserved, each invocation's items appear contiguously in
/// source order, otherwise invocations interleave by completion.
pub struct FlatMap<F> {
    pub flat_map_fn: F,
    pub concurrency: Concurrency,
}

impl<In, Out, F, Fut, I> Operator<In, Out> for FlatMap<F>
where
    F: Fn(In, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = I> + Send,
    I: IntoIterator<Item = Step<Out>> + Send + 'static,
    I::IntoIter: Send,
    In: Send + 'static,
    Out: Send + 'static,
{
    fn apply(self, input: Pipeline<In>) -> Pipeline<Out> {
        let flat_map_fn = Arc::new(self.flat_map_fn);

        let mut batches = input.enumerate().pipe(Concurrent {
            concurrency: self.concurrency,
            chain: move |values: Pipeline<(usize, In)>| {
                let flat_map_fn = Arc::clone(&flat_map_fn);
                values.map(move |(index, value)| {
                    let flat_map_fn = Arc::clone(&flat_map_fn);
                    async move { flat_map_fn(value, index).await }
                })
            },
        });

        // flatten each invocation's output serially
        let (emitter, output) = handoff();
        tokio::spawn(async move {
            let emitter = PanicGuard::new(emitter);
            'outer: loop {
                match batches.next().await {
                    Ok(Some(items)) => {
                        for step in items {
                            match step {
                                Step::Next(item) => {
                                    if emitter.emit(item).await.is_err() {
                                        break 'outer;
                                    }
                                }
                                Step::Stop => {
                                    batches.dispose();
                                    let _ = emitter.complete();
                                    break 'outer;
                                }
                            }
                        }
                    }
                    Ok(None) => {
                        let _ = emitter.complete();
                        break;
                    }
                    Err(error) => {
                        let _ = emitter.error(error);
                        break;
                    }
                }
            }
        });

        output
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::sync::Semaphore;

    use crate::{Concurrency, Pipeline, Step};

    #[tokio::test]
    async fn serial_flat_map_flattens_in_order() {
        let values = Pipeline::from_iter(vec![1, 2])
            .flat_map(Concurrency::serial(), |x, _| async move {
                vec![Step::Next(x * 10), Step::Next(x * 10 + 1)]
            })
            .collect()
            .await
            .unwrap();

        assert_eq!(values, vec![10, 11, 20, 21]);
    }

    #[tokio::test]
    async fn passes_the_upstream_index() {
        let values = Pipeline::from_iter(vec!["a", "b", "c"])
            .flat_map(Concurrency::serial(), |s, i| async move {
                vec![Step::Next((i, s))]
            })
            .collect()
            .await
            .unwrap();

        assert_eq!(values, vec![(0, "a"), (1, "b"), (2, "c")]);
    }

    #[tokio::test]
    async fn stop_ends_the_stream_early() {
        let values = Pipeline::from_iter(1..=100)
            .flat_map(Concurrency::serial(), |x, _| async move {
                if x == 3 {
                    vec![Step::Stop]
                } else {
                    vec![Step::Next(x)]
                }
            })
            .collect()
            .await
            .unwrap();

        assert_eq!(values, vec![1, 2]);
    }

    #[tokio::test]
    async fn ordered_concurrency_serializes_invocation_outputs() {
        let values = Pipeline::from_iter(vec![30u64, 1, 1])
            .flat_map(
                Concurrency::ordered(Arc::new(Semaphore::new(3))),
                |delay, i| async move {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    vec![Step::Next((i, 0)), Step::Next((i, 1))]
                },
            )
            .collect()
            .await
            .unwrap();

        assert_eq!(
            values,
            vec![(0, 0), (0, 1), (1, 0), (1, 1), (2, 0), (2, 1)]
        );
    }

    #[tokio::test]
    async fn empty_invocations_forward_nothing() {
        let values = Pipeline::from_iter(1..=3)
            .flat_map(Concurrency::serial(), |x, _| async move {
                if x == 2 {
                    vec![Step::Next(x)]
                } else {
                    vec![]
                }
            })
            .collect()
            .await
            .unwrap();

        assert_eq!(values, vec![2]);
    }
}
