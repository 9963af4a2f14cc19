//! Combinators over several pipelines: [`merge`], [`concat`] and [`zip`].
//!
//! Every pipeline handed to a combinator is owned by it from then on and is
//! disposed on any termination path of the combined pipeline.

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    emitter::PanicGuard,
    error::Error,
    handoff::handoff,
    pipeline::Pipeline,
};

/// Interleaves all sources into one pipeline, ending once every source
/// ended. The first source error ends the stream with that error and
/// cancels the other sources.
///
/// # Example
/// ```rust
/// use millrace::{merge, Pipeline};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let merged = merge(vec![
///     Pipeline::from_iter(vec![1, 2]),
///     Pipeline::from_iter(vec![3]),
/// ]);
///
/// let mut values = merged.collect().await.unwrap();
/// values.sort();
/// assert_eq!(values, vec![1, 2, 3]);
/// # });
/// ```
pub fn merge<V>(sources: Vec<Pipeline<V>>) -> Pipeline<V>
where
    V: Send + 'static,
{
    let (emitter, output) = handoff();

    tokio::spawn(async move {
        let emitter = PanicGuard::new(emitter);
        let cancel = CancellationToken::new();
        let mut forwarders = Vec::with_capacity(sources.len());

        for mut source in sources {
            let emitter = emitter.clone();
            let cancel = cancel.clone();
            forwarders.push(tokio::spawn(async move {
                loop {
                    match source.next_with(&cancel).await {
                        Ok(Some(value)) => {
                            if emitter.emit(value).await.is_err() {
                                cancel.cancel();
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(Error::Cancelled) => break,
                        Err(error) => {
                            debug!("merge source failed, cancelling the others");
                            let _ = emitter.error(error);
                            cancel.cancel();
                            break;
                        }
                    }
                }
            }));
        }

        for forwarder in join_all(forwarders).await {
            if forwarder.is_err() {
                let _ = emitter.error(Error::Panicked);
            }
        }
        let _ = emitter.complete();
    });

    output
}

/// Drains each source to its end before touching the next; an error stops
/// the sequence and the remaining sources are disposed untouched.
pub fn concat<V>(sources: Vec<Pipeline<V>>) -> Pipeline<V>
where
    V: Send + 'static,
{
    let (emitter, output) = handoff();

    tokio::spawn(async move {
        let emitter = PanicGuard::new(emitter);
        let mut sources = sources.into_iter();
        while let Some(mut source) = sources.next() {
            loop {
                match source.next().await {
                    Ok(Some(value)) => {
                        if emitter.emit(value).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(error) => {
                        let _ = emitter.error(error);
                        return;
                    }
                }
            }
        }
        let _ = emitter.complete();
    });

    output
}

/// Emits one row per lock-step round: the i-th row holds the i-th value of
/// every source, in the order the sources were given. Ends as soon as the
/// shortest source ends; errors on the first source error.
///
/// # Example
/// ```rust
/// use millrace::{zip, Pipeline};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let rows = zip(vec![
///     Pipeline::from_iter(vec![1, 2, 3]),
///     Pipeline::from_iter(vec![10, 20]),
/// ])
/// .collect()
/// .await
/// .unwrap();
///
/// assert_eq!(rows, vec![vec![1, 10], vec![2, 20]]);
/// # });
/// ```
pub fn zip<V>(sources: Vec<Pipeline<V>>) -> Pipeline<Vec<V>>
where
    V: Send + 'static,
{
    let (emitter, output) = handoff();

    tokio::spawn(async move {
        let emitter = PanicGuard::new(emitter);
        let mut sources = sources;
        if sources.is_empty() {
            let _ = emitter.complete();
            return;
        }
        'rounds: loop {
            let mut row = Vec::with_capacity(sources.len());
            for source in &mut sources {
                match source.next().await {
                    Ok(Some(value)) => row.push(value),
                    Ok(None) => break 'rounds,
                    Err(error) => {
                        let _ = emitter.error(error);
                        return;
                    }
                }
            }
            if emitter.emit(row).await.is_err() {
                return;
            }
        }
        let _ = emitter.complete();
    });

    output
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, time::Duration};

    use crate::{concat, handoff, merge, zip, Error, Pipeline};

    #[tokio::test]
    async fn merge_interleaves_all_sources() {
        let merged = merge(vec![
            Pipeline::from_iter(vec![1, 2, 3]),
            Pipeline::from_iter(vec![4, 5]),
            Pipeline::from_iter(Vec::<i32>::new()),
        ]);

        let values = merged.collect().await.unwrap();
        assert_eq!(
            values.iter().copied().collect::<HashSet<_>>(),
            HashSet::from([1, 2, 3, 4, 5])
        );
    }

    #[tokio::test]
    async fn merge_errors_cancel_the_other_sources() {
        let (failing, failing_pipeline) = handoff::<i32>();
        let (healthy, healthy_pipeline) = handoff::<i32>();

        let merged = merge(vec![failing_pipeline, healthy_pipeline]);
        let collected = tokio::spawn(merged.collect());

        failing.error("bad source").unwrap();
        assert!(collected.await.unwrap().is_err());

        // the sibling source is disposed within a few cooperative steps
        for _ in 0..20 {
            if healthy.is_disposed() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(healthy.is_disposed());
    }

    #[tokio::test]
    async fn merge_of_nothing_is_empty() {
        let values = merge(Vec::<Pipeline<i32>>::new()).collect().await.unwrap();
        assert!(values.is_empty());
    }

    #[tokio::test]
    async fn concat_drains_sources_in_sequence() {
        let values = concat(vec![
            Pipeline::from_iter(vec![1, 2]),
            Pipeline::from_iter(vec![3, 4]),
        ])
        .collect()
        .await
        .unwrap();

        assert_eq!(values, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn concat_does_not_touch_later_sources_early() {
        let (first, first_pipeline) = handoff::<i32>();
        let (second, second_pipeline) = handoff::<i32>();

        let mut combined = concat(vec![first_pipeline, second_pipeline]);

        first.emit(1).await.unwrap();
        assert_eq!(combined.next().await.unwrap(), Some(1));

        // the second source has no consumer yet
        assert!(tokio::time::timeout(Duration::from_millis(30), second.emit(9))
            .await
            .is_err());

        first.complete().unwrap();
        let producer = tokio::spawn(async move {
            second.emit(9).await.unwrap();
            second.complete().unwrap();
        });
        assert_eq!(combined.next().await.unwrap(), Some(9));
        assert_eq!(combined.next().await.unwrap(), None);
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn concat_error_stops_the_sequence() {
        let (first, first_pipeline) = handoff::<i32>();
        let (second, second_pipeline) = handoff::<i32>();
        first.error("broken").unwrap();

        let result = concat(vec![first_pipeline, second_pipeline])
            .collect()
            .await;

        assert!(matches!(result, Err(Error::Custom(_))));
        for _ in 0..20 {
            if second.is_disposed() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(second.is_disposed());
    }

    #[tokio::test]
    async fn zip_is_lock_step_and_ends_at_the_shortest() {
        let rows = zip(vec![
            Pipeline::from_iter(vec![1, 2, 3]),
            Pipeline::from_iter(vec![10, 20]),
        ])
        .collect()
        .await
        .unwrap();

        assert_eq!(rows, vec![vec![1, 10], vec![2, 20]]);
    }

    #[tokio::test]
    async fn zip_disposes_sources_on_downstream_dispose() {
        let (left, left_pipeline) = handoff::<i32>();
        let (right, right_pipeline) = handoff::<i32>();

        let zipped = zip(vec![left_pipeline, right_pipeline]);
        drop(zipped);

        // the zip task notices the disposal when its next row is refused
        let _ = left.emit(1).await;
        let _ = right.emit(2).await;

        for _ in 0..20 {
            if left.is_disposed() && right.is_disposed() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(left.is_disposed());
        assert!(right.is_disposed());
    }
}
