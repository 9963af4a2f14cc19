use std::future::Future;

use crate::{emitter::PanicGuard, handoff::handoff, operator::Operator, pipeline::Pipeline};

pub struct Map<F> {
    pub map_fn: F,
}

impl<In, Out, F, Fut> Operator<In, Out> for Map<F>
where
    F: FnMut(In) -> Fut + Send + 'static,
    Fut: Future<Output = Out> + Send,
    In: Send + 'static,
    Out: Send + 'static,
{
    fn apply(mut self, mut input: Pipeline<In>) -> Pipeline<Out> {
        let (emitter, output) = handoff();

        tokio::spawn(async move {
            let emitter = PanicGuard::new(emitter);
            loop {
                match input.next().await {
                    Ok(Some(value)) => {
                        let mapped = (self.map_fn)(value).await;
                        if emitter.emit(mapped).await.is_err() {
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
        });

        output
    }
}

#[cfg(test)]
mod tests {
    use crate::{handoff, Error, Pipeline};

    #[tokio::test]
    async fn map_works() {
        let values = Pipeline::from_iter(vec![1, 2, 3])
            .map(|x| async move { x * 2 })
            .collect()
            .await
            .unwrap();

        assert_eq!(values, vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn map_forwards_errors() {
        let (emitter, pipeline) = handoff();

        tokio::spawn(async move {
            emitter.emit(1).await.unwrap();
            emitter.error("nope").unwrap();
        });

        let mut mapped = pipeline.map(|x: i32| async move { x });
        assert_eq!(mapped.next().await.unwrap(), Some(1));
        assert!(matches!(mapped.next().await, Err(Error::Custom(_))));
    }

    #[tokio::test]
    async fn disposing_the_output_disposes_the_input() {
        let (emitter, pipeline) = handoff::<i32>();

        let mapped = pipeline.map(|x| async move { x });
        mapped.dispose();
        drop(mapped);

        // the operator task observes the disposal on its next emit; an
        // unconsumed emit is rejected once the chain has unwound
        let mut result = emitter.emit(1).await;
        for _ in 0..10 {
            if result.is_err() {
                break;
            }
            tokio::task::yield_now().await;
            result = emitter.emit(1).await;
        }
        assert!(matches!(result, Err(Error::Disposed)));
    }
}
