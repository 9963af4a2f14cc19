use std::sync::Arc;

use tokio::{
    sync::{mpsc, oneshot, OwnedSemaphorePermit},
    task::JoinHandle,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::trace;

use crate::{
    concurrency::Concurrency,
    emitter::{Emitter, PanicGuard},
    error::Error,
    handoff::handoff,
    operator::Operator,
    pipeline::Pipeline,
};

/// Bounded-parallel processing through per-worker operator chains.
///
/// A dispatcher pulls one upstream value per semaphore permit and hands it
/// to an idle worker, spawning workers lazily: holding a permit with no
/// idle worker means the pool is still below the semaphore's capacity.
/// Every worker owns a private instance of the chain, built by calling
/// `chain` on the worker's inbox, so stateful sub-operators never see
/// values from two workers.
///
/// In ordered mode a result is emitted only after its predecessor's result,
/// chained through oneshot done-signals; the worker itself frees its slot
/// first, so a slow value delays its successors' *emission*, never their
/// *processing*.
///
/// The chain must yield exactly one output per input. A sub-chain that
/// filters values out would stall its worker; filter before or after the
/// concurrent stage instead.
pub struct Concurrent<F> {
    pub concurrency: Concurrency,
    pub chain: F,
}

struct Job<In> {
    value: In,
    permit: OwnedSemaphorePermit,
    prev: Option<oneshot::Receiver<()>>,
    done: oneshot::Sender<()>,
}

struct Worker<In> {
    jobs: Emitter<Job<In>>,
    join: JoinHandle<()>,
}

impl<In, Out, F> Operator<In, Out> for Concurrent<F>
where
    F: Fn(Pipeline<In>) -> Pipeline<Out> + Send + Sync + 'static,
    In: Send + 'static,
    Out: Send + 'static,
{
    fn apply(self, input: Pipeline<In>) -> Pipeline<Out> {
        let (emitter, output) = handoff();

        tokio::spawn(dispatch(
            input,
            emitter,
            Arc::new(self.chain),
            self.concurrency,
        ));

        output
    }
}

async fn dispatch<In, Out, F>(
    mut upstream: Pipeline<In>,
    downstream: Emitter<Out>,
    chain: Arc<F>,
    concurrency: Concurrency,
) where
    F: Fn(Pipeline<In>) -> Pipeline<Out> + Send + Sync + 'static,
    In: Send + 'static,
    Out: Send + 'static,
{
    let downstream = PanicGuard::new(downstream);
    let cancel = CancellationToken::new();
    let tails = TaskTracker::new();
    let (idle_tx, mut idle_rx) = mpsc::unbounded_channel();
    let mut workers: Vec<Worker<In>> = Vec::new();
    let mut prev_done: Option<oneshot::Receiver<()>> = None;

    loop {
        // acquire before pulling: no upstream value is consumed without a
        // free slot
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = Arc::clone(&concurrency.semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let value = match upstream.next_with(&cancel).await {
            Ok(Some(value)) => value,
            Ok(None) => break,
            Err(Error::Cancelled) => break,
            Err(error) => {
                let _ = downstream.error(error);
                break;
            }
        };

        if downstream.is_terminal() {
            break;
        }

        let index = match idle_rx.try_recv() {
            Ok(index) => index,
            Err(_) => {
                let index = workers.len();
                trace!(worker = index, "spawning concurrent worker");
                workers.push(spawn_worker(
                    index,
                    Arc::clone(&chain),
                    downstream.clone(),
                    idle_tx.clone(),
                    tails.clone(),
                    cancel.clone(),
                ));
                index
            }
        };

        let (done_tx, done_rx) = oneshot::channel();
        let job = Job {
            value,
            permit,
            prev: prev_done.take(),
            done: done_tx,
        };
        if workers[index].jobs.emit(job).await.is_err() {
            break;
        }
        if concurrency.preserve_order {
            prev_done = Some(done_rx);
        }
    }

    // stop feeding the workers, let in-flight work drain, then settle
    // downstream: the stream is over only when every worker is idle and
    // every emission tail has run
    for worker in &workers {
        let _ = worker.jobs.complete();
    }
    for worker in workers {
        if worker.join.await.is_err() {
            // a crashed worker must not masquerade as a clean end
            let _ = downstream.error(Error::Panicked);
        }
    }
    tails.close();
    tails.wait().await;
    let _ = downstream.complete();
    upstream.dispose();
}

fn spawn_worker<In, Out, F>(
    index: usize,
    chain: Arc<F>,
    downstream: Emitter<Out>,
    idle: mpsc::UnboundedSender<usize>,
    tails: TaskTracker,
    cancel: CancellationToken,
) -> Worker<In>
where
    F: Fn(Pipeline<In>) -> Pipeline<Out> + Send + Sync + 'static,
    In: Send + 'static,
    Out: Send + 'static,
{
    let (jobs_emitter, mut jobs) = handoff::<Job<In>>();
    let (feed, feed_out) = handoff::<In>();
    let mut results = (chain)(feed_out);

    let join = tokio::spawn(async move {
        loop {
            let job = match jobs.next_with(&cancel).await {
                Ok(Some(job)) => job,
                _ => break,
            };
            let Job {
                value,
                permit,
                prev,
                done,
            } = job;

            if feed.emit(value).await.is_err() {
                // the chain disposed its own input; nothing more to do
                break;
            }
            let result = results.next_with(&cancel).await;

            // free the slot before lining up behind predecessors, so the
            // dispatcher can hand out the permit and this worker again
            // while the result waits its turn
            let _ = idle.send(index);
            drop(permit);

            let downstream = downstream.clone();
            let peers = cancel.clone();
            tails.spawn(async move {
                if let Some(prev) = prev {
                    // a dropped predecessor counts as already emitted
                    let _ = prev.await;
                }
                match result {
                    Ok(Some(output)) => {
                        if downstream.emit(output).await.is_err() {
                            trace!("downstream gone, cancelling concurrent peers");
                            peers.cancel();
                        }
                    }
                    Ok(None) => peers.cancel(),
                    Err(Error::Cancelled) => {}
                    Err(error) => {
                        let _ = downstream.error(error);
                        peers.cancel();
                    }
                }
                let _ = done.send(());
            });
        }
    });

    Worker {
        jobs: jobs_emitter,
        join,
    }
}
