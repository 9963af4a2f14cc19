use std::future::Future;

use crate::{emitter::PanicGuard, handoff::handoff, operator::Operator, pipeline::Pipeline};

pub struct FilterMap<F> {
    pub map_fn: F,
}

impl<In, Out, F, Fut> Operator<In, Out> for FilterMap<F>
where
    F: FnMut(In) -> Fut + Send + 'static,
    Fut: Future<Output = Option<Out>> + Send,
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
                        if let Some(mapped) = (self.map_fn)(value).await {
                            if emitter.emit(mapped).await.is_err() {
                                break;
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
    use crate::Pipeline;

    #[tokio::test]
    async fn filter_map_works() {
        let values = Pipeline::from_iter(vec!["1", "two", "3"])
            .filter_map(|s: &str| async move { s.parse::<i32>().ok() })
            .collect()
            .await
            .unwrap();

        assert_eq!(values, vec![1, 3]);
    }
}
