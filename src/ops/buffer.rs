use crate::{
    emitter::PanicGuard, handoff::handoff_with_capacity, operator::Operator, pipeline::Pipeline,
};

/// Re-buffers the stream through a capacity-`n` hand-off: up to `n` values
/// accumulate while the downstream lags, before the upstream suspends.
pub struct Buffer {
    pub n: usize,
}

impl<In> Operator<In, In> for Buffer
where
    In: Send + 'static,
{
    fn apply(self, mut input: Pipeline<In>) -> Pipeline<In> {
        let (emitter, output) = handoff_with_capacity(self.n);

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
        });

        output
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::{handoff, Pipeline};

    #[tokio::test]
    async fn buffer_forwards_everything() {
        let values = Pipeline::from_iter(1..=5).buffer(3).collect().await.unwrap();
        assert_eq!(values, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn buffer_absorbs_n_values_while_unconsumed() {
        let (emitter, pipeline) = handoff();
        let _buffered = pipeline.buffer(2);

        // two values fit the buffer and one sits with the forwarding task,
        // so three emits are absorbed without a consumer
        for i in 0..3 {
            tokio::time::timeout(Duration::from_millis(100), emitter.emit(i))
                .await
                .expect("emit should be absorbed by the buffer")
                .unwrap();
        }
        let fourth = tokio::time::timeout(Duration::from_millis(50), emitter.emit(3)).await;
        assert!(fourth.is_err(), "fourth emit should suspend");
    }
}
