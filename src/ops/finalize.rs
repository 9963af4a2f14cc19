use crate::{emitter::PanicGuard, handoff::handoff, operator::Operator, pipeline::Pipeline};

/// Runs a closure exactly once when the stream terminates, whether by
/// completion, error or disposal.
pub struct Finalize<F> {
    pub finalize_fn: F,
}

impl<In, F> Operator<In, In> for Finalize<F>
where
    F: FnOnce() + Send + 'static,
    In: Send + 'static,
{
    fn apply(self, mut input: Pipeline<In>) -> Pipeline<In> {
        let (emitter, output) = handoff();

        tokio::spawn(async move {
            let emitter = PanicGuard::new(emitter);
            loop {
                match input.next().await {
                    Ok(Some(value)) => {
                        if emitter.emit(value).await.is_err() {
                            break;
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
            // every exit path of the loop lands here exactly once
            (self.finalize_fn)();
        });

        output
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use crate::{handoff, Pipeline};

    #[tokio::test]
    async fn finalize_runs_on_completion() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);

        Pipeline::from_iter(vec![1, 2])
            .finalize(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .drain()
            .await
            .unwrap();

        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn finalize_runs_on_disposal() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);

        let (emitter, pipeline) = handoff::<i32>();
        let finalized = pipeline.finalize(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        drop(finalized);

        // the task notices the disposal when its forward fails
        let _ = emitter.emit(1).await;
        for _ in 0..10 {
            if ran.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            let _ = emitter.emit(1).await;
        }
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn finalize_runs_on_error() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);

        let (emitter, pipeline) = handoff::<i32>();
        emitter.error("end").unwrap();

        let result = pipeline
            .finalize(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .drain()
            .await;

        assert!(result.is_err());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
