use crate::{emitter::PanicGuard, handoff::handoff, operator::Operator, pipeline::Pipeline};

pub struct Enumerate;

impl<In> Operator<In, (usize, In)> for Enumerate
where
    In: Send + 'static,
{
    fn apply(self, mut input: Pipeline<In>) -> Pipeline<(usize, In)> {
        let (emitter, output) = handoff();

        tokio::spawn(async move {
            let emitter = PanicGuard::new(emitter);
            let mut i = 0;
            loop {
                match input.next().await {
                    Ok(Some(value)) => {
                        if emitter.emit((i, value)).await.is_err() {
                            break;
                        }
                        i += 1;
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
