use crate::{emitter::PanicGuard, handoff::handoff, operator::Operator, pipeline::Pipeline};

pub struct Batch {
    pub n: usize,
}

impl<In> Operator<In, Vec<In>> for Batch
where
    In: Send + 'static,
{
    fn apply(self, mut input: Pipeline<In>) -> Pipeline<Vec<In>> {
        let (emitter, output) = handoff();

        tokio::spawn(async move {
            let emitter = PanicGuard::new(emitter);
            let mut batch = Vec::with_capacity(self.n);
            loop {
                match input.next().await {
                    Ok(Some(value)) => {
                        batch.push(value);
                        if batch.len() == self.n {
                            let full = std::mem::replace(&mut batch, Vec::with_capacity(self.n));
                            if emitter.emit(full).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(None) => {
                        if !batch.is_empty() {
                            // flush the final partial batch if anyone still listens
                            let _ = emitter.emit(batch).await;
                        }
                        let _ = emitter.complete();
                        return;
                    }
                    Err(error) => {
                        let _ = emitter.error(error);
                        return;
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
    async fn batch_groups_and_flushes_the_remainder() {
        let values = Pipeline::from_iter(1..=5).batch(2).collect().await.unwrap();
        assert_eq!(values, vec![vec![1, 2], vec![3, 4], vec![5]]);
    }

    #[tokio::test]
    async fn batch_of_empty_input_is_empty() {
        let values = Pipeline::from_iter(Vec::<i32>::new())
            .batch(3)
            .collect()
            .await
            .unwrap();
        assert!(values.is_empty());
    }
}
