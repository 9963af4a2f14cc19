use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use futures::{future::BoxFuture, FutureExt};

/// A value that carries its own processing latency, for exercising the
/// concurrent stages: feed a pipeline of these through
/// [`WorkLog::tracked`] and assert on what overlapped what.
pub struct SlowValue {
    pub id: i32,
    latency: Duration,
}

impl SlowValue {
    pub fn new(id: i32, latency_ms: u64) -> Self {
        Self {
            id,
            latency: Duration::from_millis(latency_ms),
        }
    }
}

struct Span {
    started: Instant,
    finished: Option<Instant>,
}

/// Records the processing span of every [`SlowValue`] that went through a
/// tracked stage, so tests can assert parallelism and strict ordering.
#[derive(Clone)]
pub struct WorkLog {
    spans: Arc<Mutex<HashMap<i32, Span>>>,
}

impl WorkLog {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            spans: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// An async map function that holds each value for its latency and maps
    /// it to its id, logging the span.
    pub fn tracked(&self) -> impl Fn(SlowValue) -> BoxFuture<'static, i32> + Clone {
        let log = self.clone();

        move |value| {
            let log = log.clone();

            (async move {
                log.started(value.id);
                tokio::time::sleep(value.latency).await;
                log.finished(value.id);
                value.id
            })
            .boxed()
        }
    }

    fn started(&self, id: i32) {
        self.spans.lock().unwrap().insert(
            id,
            Span {
                started: Instant::now(),
                finished: None,
            },
        );
    }

    fn finished(&self, id: i32) {
        let mut spans = self.spans.lock().unwrap();
        let span = spans.get_mut(&id).expect("finished before started");
        span.finished = Some(Instant::now());
    }

    pub fn is_finished(&self, id: i32) -> bool {
        matches!(
            self.spans.lock().unwrap().get(&id),
            Some(Span {
                finished: Some(_),
                ..
            })
        )
    }

    /// Both values were in flight at the same time.
    pub fn overlapped(&self, a: i32, b: i32) -> bool {
        let spans = self.spans.lock().unwrap();
        match (spans.get(&a), spans.get(&b)) {
            (Some(a), Some(b)) => match (a.finished, b.finished) {
                (Some(a_end), Some(b_end)) => a.started < b_end && b.started < a_end,
                _ => false,
            },
            _ => false,
        }
    }

    /// `a` only started once `b` had already finished.
    pub fn started_after(&self, a: i32, b: i32) -> bool {
        let spans = self.spans.lock().unwrap();
        match (spans.get(&a), spans.get(&b)) {
            (Some(a), Some(b)) => b.finished.is_some_and(|b_end| a.started > b_end),
            _ => false,
        }
    }
}
