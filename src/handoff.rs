use std::{
    collections::{HashSet, VecDeque},
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll, Waker},
};

use crate::{
    emitter::Emitter,
    error::{Error, Result},
    pipeline::Pipeline,
};

/// Creates an unbuffered hand-off pair.
///
/// The returned [`Emitter`] and [`Pipeline`] are the two ends of a single
/// rendezvous channel: `emit` resolves only once the consumer has taken the
/// value, so a producer that awaits each emit runs at consumer speed.
///
/// # Example
/// ```rust
/// use millrace::handoff;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let (emitter, mut pipeline) = handoff();
///
/// tokio::spawn(async move {
///     emitter.emit(1).await.unwrap();
///     emitter.emit(2).await.unwrap();
///     emitter.complete().unwrap();
/// });
///
/// assert_eq!(pipeline.next().await.unwrap(), Some(1));
/// assert_eq!(pipeline.next().await.unwrap(), Some(2));
/// assert_eq!(pipeline.next().await.unwrap(), None);
/// # });
/// ```
pub fn handoff<V>() -> (Emitter<V>, Pipeline<V>) {
    handoff_with_capacity(0)
}

/// Creates a hand-off pair with an internal buffer of `capacity` values.
///
/// While the buffer has room an emit resolves as soon as its value is
/// enqueued; once full, emits suspend until the consumer catches up.
pub fn handoff_with_capacity<V>(capacity: usize) -> (Emitter<V>, Pipeline<V>) {
    let handoff = Arc::new(Handoff::new(capacity));
    (
        Emitter::new(Arc::clone(&handoff)),
        Pipeline::new(handoff),
    )
}

/// One of the permanent end states of a hand-off. At most one is ever set.
enum Terminal {
    Completed,
    Errored(Error),
    Disposed,
}

struct WaitingEmit<V> {
    id: u64,
    value: V,
    waker: Waker,
}

struct State<V> {
    buffer: VecDeque<V>,
    capacity: usize,
    waiting_emits: VecDeque<WaitingEmit<V>>,
    // ids of suspended emits whose value has been taken but whose future
    // has not observed it yet
    finished_emits: HashSet<u64>,
    next_emit_id: u64,
    consumer_waker: Option<Waker>,
    terminal: Option<Terminal>,
}

/// The hand-off channel connecting one producer side to one consumer side.
///
/// Invariant: suspended emits exist only while the consumer is not waiting
/// (an emit suspends only when nobody is there to take its value and the
/// buffer is full), so producer and consumer never both wait.
pub(crate) struct Handoff<V> {
    state: Mutex<State<V>>,
}

impl<V> Handoff<V> {
    fn new(capacity: usize) -> Self {
        Handoff {
            state: Mutex::new(State {
                buffer: VecDeque::new(),
                capacity,
                waiting_emits: VecDeque::new(),
                finished_emits: HashSet::new(),
                next_emit_id: 0,
                consumer_waker: None,
                terminal: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn emit(self: Arc<Self>, value: V) -> Emit<V> {
        Emit {
            handoff: self,
            value: Some(value),
            id: None,
        }
    }

    pub(crate) fn next(self: Arc<Self>) -> Next<V> {
        Next { handoff: self }
    }

    pub(crate) fn complete(&self) -> Result<()> {
        let mut state = self.lock();
        match state.terminal {
            None => {
                state.terminal = Some(Terminal::Completed);
                if let Some(waker) = state.consumer_waker.take() {
                    waker.wake();
                }
                Ok(())
            }
            // a producer racing a disposing consumer is not a bug
            Some(Terminal::Disposed) => Ok(()),
            Some(_) => Err(Error::Terminated),
        }
    }

    pub(crate) fn error(&self, error: Error) -> Result<()> {
        let mut state = self.lock();
        match state.terminal {
            None => {
                state.terminal = Some(Terminal::Errored(error));
                state.buffer.clear();
                for entry in state.waiting_emits.drain(..).collect::<Vec<_>>() {
                    entry.waker.wake();
                }
                if let Some(waker) = state.consumer_waker.take() {
                    waker.wake();
                }
                Ok(())
            }
            Some(Terminal::Disposed) => Ok(()),
            Some(_) => Err(Error::Terminated),
        }
    }

    /// Consumer-side abandonment. Idempotent; a no-op once any terminal
    /// state is set.
    pub(crate) fn dispose(&self) {
        let mut state = self.lock();
        if state.terminal.is_some() {
            return;
        }
        state.terminal = Some(Terminal::Disposed);
        state.buffer.clear();
        for entry in state.waiting_emits.drain(..).collect::<Vec<_>>() {
            entry.waker.wake();
        }
        if let Some(waker) = state.consumer_waker.take() {
            waker.wake();
        }
    }

    /// Called when the last producer handle drops without reaching a
    /// terminal state: the consumer drains whatever was accepted, then sees
    /// end-of-stream, matching the drop-the-sender contract of a channel.
    pub(crate) fn producer_closed(&self) {
        let mut state = self.lock();
        if state.terminal.is_none() {
            state.terminal = Some(Terminal::Completed);
            if let Some(waker) = state.consumer_waker.take() {
                waker.wake();
            }
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        matches!(self.lock().terminal, Some(Terminal::Completed))
    }

    pub(crate) fn is_disposed(&self) -> bool {
        matches!(self.lock().terminal, Some(Terminal::Disposed))
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.lock().terminal.is_some()
    }

    /// All accepted values delivered and a terminal state reached.
    pub(crate) fn is_consumed(&self) -> bool {
        let state = self.lock();
        state.terminal.is_some() && state.buffer.is_empty() && state.waiting_emits.is_empty()
    }
}

/// Future returned by the producer side's emit. Resolves once the value is
/// taken (or buffered within the configured bound). Dropping it before then
/// withdraws the value.
pub(crate) struct Emit<V> {
    handoff: Arc<Handoff<V>>,
    value: Option<V>,
    id: Option<u64>,
}

impl<V> Unpin for Emit<V> {}

impl<V> Future for Emit<V> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.handoff.lock();

        if let Some(id) = this.id {
            if state.finished_emits.remove(&id) {
                this.id = None;
                return Poll::Ready(Ok(()));
            }
            if let Some(entry) = state.waiting_emits.iter_mut().find(|entry| entry.id == id) {
                entry.waker = cx.waker().clone();
                return Poll::Pending;
            }
            // our entry was dropped without being taken
            this.id = None;
            return Poll::Ready(match &state.terminal {
                Some(Terminal::Errored(error)) => Err(error.clone()),
                Some(Terminal::Completed) => Ok(()),
                _ => Err(Error::Disposed),
            });
        }

        if let Some(terminal) = &state.terminal {
            return Poll::Ready(match terminal {
                // emits after a normal completion are dropped silently
                Terminal::Completed => Ok(()),
                Terminal::Errored(_) => Err(Error::Terminated),
                Terminal::Disposed => Err(Error::Disposed),
            });
        }

        let Some(value) = this.value.take() else {
            return Poll::Ready(Ok(()));
        };

        // a waiting consumer implies an empty buffer and no queued emits;
        // hand the value over and let the woken consumer pick it up
        if let Some(waker) = state.consumer_waker.take() {
            state.buffer.push_back(value);
            waker.wake();
            return Poll::Ready(Ok(()));
        }

        if state.waiting_emits.is_empty() && state.buffer.len() < state.capacity {
            state.buffer.push_back(value);
            return Poll::Ready(Ok(()));
        }

        let id = state.next_emit_id;
        state.next_emit_id += 1;
        state.waiting_emits.push_back(WaitingEmit {
            id,
            value,
            waker: cx.waker().clone(),
        });
        this.id = Some(id);
        Poll::Pending
    }
}

impl<V> Drop for Emit<V> {
    fn drop(&mut self) {
        if let Some(id) = self.id {
            let mut state = self.handoff.lock();
            if !state.finished_emits.remove(&id) {
                state.waiting_emits.retain(|entry| entry.id != id);
            }
        }
    }
}

/// Future returned by the consumer side's next. Values are transferred only
/// inside a `Ready` return, so dropping this future mid-wait (e.g. from a
/// cancelled `select!`) can never lose a value.
pub(crate) struct Next<V> {
    handoff: Arc<Handoff<V>>,
}

impl<V> Future for Next<V> {
    type Output = Result<Option<V>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.handoff.lock();
        state.consumer_waker = None;

        // disposal is final: no draining, straight to end-of-stream
        if matches!(state.terminal, Some(Terminal::Disposed)) {
            return Poll::Ready(Ok(None));
        }

        if let Some(value) = state.buffer.pop_front() {
            // refill the freed buffer slot from the suspended-emit queue
            while state.buffer.len() < state.capacity {
                let Some(entry) = state.waiting_emits.pop_front() else {
                    break;
                };
                state.buffer.push_back(entry.value);
                state.finished_emits.insert(entry.id);
                entry.waker.wake();
            }
            return Poll::Ready(Ok(Some(value)));
        }

        if let Some(entry) = state.waiting_emits.pop_front() {
            state.finished_emits.insert(entry.id);
            entry.waker.wake();
            return Poll::Ready(Ok(Some(entry.value)));
        }

        match &state.terminal {
            Some(Terminal::Completed) => Poll::Ready(Ok(None)),
            Some(Terminal::Errored(error)) => Poll::Ready(Err(error.clone())),
            Some(Terminal::Disposed) => Poll::Ready(Ok(None)),
            None => {
                state.consumer_waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<V> Drop for Next<V> {
    fn drop(&mut self) {
        // deregister so a later emit doesn't mistake an abandoned wait for
        // a live consumer
        self.handoff.lock().consumer_waker = None;
    }
}
