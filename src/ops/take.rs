use crate::{emitter::PanicGuard, handoff::handoff, operator::Operator, pipeline::Pipeline};

pub struct Take {
    pub n: usize,
}

impl<In> Operator<In, In> for Take
where
    In: Send + 'static,
{
    fn apply(self, mut input: Pipeline<In>) -> Pipeline<In> {
        let (emitter, output) = handoff();

        tokio::spawn(async move {
            let emitter = PanicGuard::new(emitter);
            let mut remaining = self.n;
            while remaining > 0 {
                match input.next().await {
                    Ok(Some(value)) => {
                        if emitter.emit(value).await.is_err() {
                            return;
                        }
                        remaining -= 1;
                    }
                    Ok(None) => break,
                    Err(error) => {
                        let _ = emitter.error(error);
                        return;
                    }
                }
            }
            // done early: completing downstream and dropping the input
            // disposes the upstream
            let _ = emitter.complete();
        });

        output
    }
}

pub struct TakeWhile<F> {
    pub predicate: F,
}

impl<In, F> Operator<In, In> for TakeWhile<F>
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
                            break;
                        }
                        if emitter.emit(value).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(error) => {
                        let _ = emitter.error(error);
                        return;
                    }
                }
            }
            let _ = emitter.complete();
        });

        output
    }
}
