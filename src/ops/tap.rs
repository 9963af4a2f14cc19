use crate::{emitter::PanicGuard, handoff::handoff, operator::Operator, pipeline::Pipeline};

pub struct Tap<F> {
    pub tap_fn: F,
}

impl<In, F> Operator<In, In> for Tap<F>
where
    F: FnMut(&In) + Send + 'static,
    In: Send + 'static,
{
    fn apply(mut self, mut input: Pipeline<In>) -> Pipeline<In> {
        let (emitter, output) = handoff();

        tokio::spawn(async move {
            let emitter = PanicGuard::new(emitter);
            loop {
                match input.next().await {
                    Ok(Some(value)) => {
                        (self.tap_fn)(&value);
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
