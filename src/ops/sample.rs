use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::{emitter::PanicGuard, handoff::handoff, operator::Operator, pipeline::Pipeline};

/// Keeps the most recent upstream value and forwards it when the trigger
/// emits. A trigger firing with no fresh value since the previous sample
/// forwards nothing.
pub struct SampleWhen<T> {
    pub trigger: Pipeline<T>,
}

impl<In, T> Operator<In, In> for SampleWhen<T>
where
    In: Send + 'static,
    T: Send + 'static,
{
    fn apply(self, mut input: Pipeline<In>) -> Pipeline<In> {
        let (emitter, output) = handoff();
        let mut trigger = self.trigger;

        tokio::spawn(async move {
            let emitter = PanicGuard::new(emitter);
            let mut latest: Option<In> = None;
            loop {
                tokio::select! {
                    value = input.next() => match value {
                        Ok(Some(value)) => latest = Some(value),
                        Ok(None) => {
                            let _ = emitter.complete();
                            return;
                        }
                        Err(error) => {
                            let _ = emitter.error(error);
                            return;
                        }
                    },
                    tick = trigger.next() => match tick {
                        Ok(Some(_)) => {
                            if let Some(value) = latest.take() {
                                if emitter.emit(value).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Ok(None) => {
                            let _ = emitter.complete();
                            return;
                        }
                        Err(error) => {
                            let _ = emitter.error(error);
                            return;
                        }
                    },
                }
            }
        });

        output
    }
}

/// [`SampleWhen`] against a periodic clock.
pub struct SampleTime {
    pub period: Duration,
}

impl<In> Operator<In, In> for SampleTime
where
    In: Send + 'static,
{
    fn apply(self, mut input: Pipeline<In>) -> Pipeline<In> {
        let (emitter, output) = handoff();

        tokio::spawn(async move {
            let emitter = PanicGuard::new(emitter);
            let mut clock = tokio::time::interval(self.period);
            clock.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick fires immediately; consume it so sampling
            // starts one period in
            clock.tick().await;

            let mut latest: Option<In> = None;
            loop {
                tokio::select! {
                    value = input.next() => match value {
                        Ok(Some(value)) => latest = Some(value),
                        Ok(None) => {
                            let _ = emitter.complete();
                            return;
                        }
                        Err(error) => {
                            let _ = emitter.error(error);
                            return;
                        }
                    },
                    _ = clock.tick() => {
                        if let Some(value) = latest.take() {
                            if emitter.emit(value).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });

        output
    }
}
