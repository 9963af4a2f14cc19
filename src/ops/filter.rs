use crate::{emitter::PanicGuard, handoff::handoff, operator::Operator, pipeline::Pipeline};

pub struct Filter<F> {
    pub predicate: F,
}

impl<In, F> Operator<In, In> for Filter<F>
where
    F: FnMut(&In) -> bool + Send + 'static,
    In: Send + 'static,
{
    fn apply(mut self, mut input: Pipeline<In>) -> Pipeline<In> {
        let (emitter, output) = handoff();

        tokio::spawn(async move {
            let emitter = PanicGuard::new(emitter);
            loop {
                match input.next().await {
                    Ok(Some(value)) => {
                        if !(self.predicate)(&value) {
                            continue;
                        }
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
        });

        output
    }
}

#[cfg(test)]
mod tests {
    use crate::Pipeline;

    #[tokio::test]
    async fn filter_works() {
        let values = Pipeline::from_iter(1..=6)
            .filter(|x| x % 2 == 0)
            .collect()
            .await
            .unwrap();

        assert_eq!(values, vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn filter_can_drop_everything() {
        let values = Pipeline::from_iter(1..=3)
            .filter(|_| false)
            .collect()
            .await
            .unwrap();

        assert!(values.is_empty());
    }
}
