use std::time::Duration;

use crate::{emitter::PanicGuard, handoff::handoff, operator::Operator, pipeline::Pipeline};

pub struct Delay {
    pub duration: Duration,
}

impl<In> Operator<In, In> for Delay
where
    In: Send + 'static,
{
    fn apply(self, mut input: Pipeline<In>) -> Pipeline<In> {
        let (emitter, output) = handoff();

        tokio::spawn(async move {
            let emitter = PanicGuard::new(emitter);
            loop {
                match input.next().await {
                    Ok(Some(value)) => {
                        tokio::time::sleep(self.duration).await;
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

/// Holds one upstream value at a time and forwards it on the next trigger
/// emission. Ends when either side ends.
pub struct DelayWhen<T> {
    pub trigger: Pipeline<T>,
}

impl<In, T> Operator<In, In> for DelayWhen<T>
where
    In: Send + 'static,
    T: Send + 'static,
{
    fn apply(self, mut input: Pipeline<In>) -> Pipeline<In> {
        let (emitter, output) = handoff();
        let mut trigger = self.trigger;

        tokio::spawn(async move {
            let emitter = PanicGuard::new(emitter);
            loop {
                let value = match input.next().await {
                    Ok(Some(value)) => value,
                    Ok(None) => {
                        let _ = emitter.complete();
                        break;
                    }
                    Err(error) => {
                        let _ = emitter.error(error);
                        break;
                    }
                };
                match trigger.next().await {
                    Ok(Some(_)) => {
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
    use std::time::{Duration, Instant};

    use crate::{handoff, Pipeline};

    #[tokio::test]
    async fn delay_postpones_each_value() {
        let start = Instant::now();
        let values = Pipeline::from_iter(vec![1, 2])
            .delay(Duration::from_millis(20))
            .collect()
            .await
            .unwrap();

        assert_eq!(values, vec![1, 2]);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn delay_when_forwards_on_trigger() {
        let (tick, trigger) = handoff();

        let delayed = tokio::spawn(async move {
            Pipeline::from_iter(vec![1, 2])
                .delay_when(trigger)
                .collect()
                .await
                .unwrap()
        });

        tick.emit(()).await.unwrap();
        tick.emit(()).await.unwrap();
        tick.complete().unwrap();

        assert_eq!(delayed.await.unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn delay_when_ends_when_the_trigger_ends() {
        let (tick, trigger) = handoff::<()>();
        tick.complete().unwrap();

        let values = Pipeline::from_iter(vec![1, 2, 3])
            .delay_when(trigger)
            .collect()
            .await
            .unwrap();

        assert!(values.is_empty());
    }
}
