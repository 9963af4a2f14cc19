use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{
    emitter::{Emitter, PanicGuard},
    handoff::handoff,
    pipeline::Pipeline,
};

/// Multicasts one upstream pipeline to any number of downstream pipelines.
///
/// Every upstream value is forwarded to every currently-live downstream
/// with independent emits; the upstream only advances once all of them
/// accepted, so the slowest consumer sets the pace. A downstream that
/// disposes falls out of the set; the upstream is disposed once the last
/// one is gone.
///
/// The stream is hot: a pipeline derived after a value's forwarding round
/// began does not see that value. The first value is only pulled once at
/// least one downstream exists, so deriving the consumers first and then
/// collecting them concurrently sees the full sequence:
///
/// ```rust
/// use millrace::{share, Pipeline};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let shared = share(Pipeline::from_iter(vec![1, 2, 3]));
/// let first = shared.pipeline();
/// let second = shared.pipeline();
///
/// let (a, b) = tokio::join!(first.collect(), second.collect());
/// assert_eq!(a.unwrap(), vec![1, 2, 3]);
/// assert_eq!(b.unwrap(), vec![1, 2, 3]);
/// # });
/// ```
pub fn share<V>(source: Pipeline<V>) -> Shared<V>
where
    V: Clone + Send + 'static,
{
    let (register, mut registrations) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut upstream = source;
        // guard-wrapped so a crash in the pump (a panicking `Clone`, say)
        // errors every live downstream instead of ending them cleanly
        let mut downstreams: Vec<PanicGuard<V>> = Vec::new();

        // hold the upstream untouched until somebody listens
        match registrations.recv().await {
            Some(emitter) => downstreams.push(PanicGuard::new(emitter)),
            // the handle was dropped without deriving a single pipeline;
            // dropping the upstream disposes it
            None => return,
        }

        loop {
            let next = upstream.next().await;

            // pick up consumers that registered while we waited, so they
            // are part of this round (and see this round's terminal state)
            while let Ok(emitter) = registrations.try_recv() {
                trace!("share gained a downstream");
                downstreams.push(PanicGuard::new(emitter));
            }

            let value = match next {
                Ok(Some(value)) => value,
                Ok(None) => {
                    for downstream in &downstreams {
                        let _ = downstream.complete();
                    }
                    return;
                }
                Err(error) => {
                    for downstream in &downstreams {
                        let _ = downstream.error(error.clone());
                    }
                    return;
                }
            };

            // one forwarding round; the upstream advances only once every
            // live downstream accepted
            let results = join_all(
                downstreams
                    .iter()
                    .map(|downstream| downstream.emit(value.clone())),
            )
            .await;

            let mut results = results.into_iter();
            downstreams.retain(|_| results.next().is_some_and(|accepted| accepted.is_ok()));

            if downstreams.is_empty() {
                debug!("last share downstream gone, disposing the upstream");
                upstream.dispose();
                return;
            }
        }
    });

    Shared { register }
}

/// Handle returned by [`share`]; derives downstream pipelines.
pub struct Shared<V> {
    register: mpsc::UnboundedSender<Emitter<V>>,
}

impl<V> Shared<V> {
    /// Derives a new downstream pipeline. After the shared stream ended,
    /// derived pipelines are immediately at end-of-stream.
    pub fn pipeline(&self) -> Pipeline<V> {
        let (emitter, pipeline) = handoff();
        let _ = self.register.send(emitter);
        pipeline
    }
}
