use crate::{emitter::PanicGuard, handoff::handoff, operator::Operator, pipeline::Pipeline};

pub struct Skip {
    pub n: usize,
}

impl<In> Operator<In, In> for Skip
where
    In: Send + 'static,
{
    fn apply(self, mut input: Pipeline<In>) -> Pipeline<In> {
        let (emitter, output) = handoff();

        tokio::spawn(async move {
            let emitter = PanicGuard::new(emitter);
            let mut remaining = self.n;
            loop {
                match input.next().await {
                    Ok(Some(value)) => {
                        if remaining > 0 {
                            remaining -= 1;
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

pub struct SkipWhile<F> {
    pub predicate: F,
}

impl<In, F> Operator<In, In> for SkipWhile<F>
where
    F: FnMut(&In) -> bool + Send + 'static,
    In: Send + 'static,
{
    fn apply(mut self, mut input: Pipeline<In>) -> Pipeline<In> {
        let (emitter, output) = handoff();

        tokio::spawn(async move {
            let emitter = PanicGuard::new(emitter);
            let mut skipping = true;
            loop {
                match input.next().await {
                    Ok(Some(value)) => {
                        if skipping && (self.predicate)(&value) {
                            continue;
                        }
                        skipping = false;
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
