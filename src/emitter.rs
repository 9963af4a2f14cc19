use std::{ops::Deref, sync::Arc};

use crate::{
    error::{Error, Result},
    handoff::Handoff,
};

/// The producer side of a hand-off pair, created by
/// [`handoff`](crate::handoff()).
///
/// Clones share the same producer side (they are one *logical* producer);
/// the source sees end-of-stream when the last clone drops without having
/// reached a terminal state.
///
/// # Example
/// ```rust
/// use millrace::handoff;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let (emitter, pipeline) = handoff();
///
/// tokio::spawn(async move {
///     for i in 0..3 {
///         if emitter.emit(i).await.is_err() {
///             // the consumer disposed the stream
///             return;
///         }
///     }
///     emitter.complete().unwrap();
/// });
///
/// assert_eq!(pipeline.collect().await.unwrap(), vec![0, 1, 2]);
/// # });
/// ```
pub struct Emitter<V> {
    handoff: Arc<Handoff<V>>,
    guard: Arc<ProducerGuard<V>>,
}

struct ProducerGuard<V> {
    handoff: Arc<Handoff<V>>,
}

impl<V> Drop for ProducerGuard<V> {
    fn drop(&mut self) {
        self.handoff.producer_closed();
    }
}

impl<V> Clone for Emitter<V> {
    fn clone(&self) -> Self {
        Emitter {
            handoff: Arc::clone(&self.handoff),
            guard: Arc::clone(&self.guard),
        }
    }
}

impl<V> Emitter<V> {
    pub(crate) fn new(handoff: Arc<Handoff<V>>) -> Self {
        let guard = Arc::new(ProducerGuard {
            handoff: Arc::clone(&handoff),
        });
        Emitter { handoff, guard }
    }

    /// Delivers a value to the consumer.
    ///
    /// Resolves once the value has been taken, or, on a hand-off created
    /// with [`handoff_with_capacity`](crate::handoff_with_capacity), once it
    /// fits in the buffer. Awaiting every emit is what gives a pipeline its
    /// backpressure.
    ///
    /// Fails with [`Error::Disposed`] if the consumer abandoned the stream.
    /// After a normal [`complete`](Emitter::complete) the value is silently
    /// dropped; after [`error`](Emitter::error) this fails with
    /// [`Error::Terminated`].
    pub async fn emit(&self, value: V) -> Result<()> {
        Arc::clone(&self.handoff).emit(value).await
    }

    /// Ends the stream normally. The consumer drains any values already
    /// accepted, then sees end-of-stream.
    pub fn complete(&self) -> Result<()> {
        self.handoff.complete()
    }

    /// Ends the stream with a failure. A suspended consumer resumes with
    /// the error, pending emits reject, and every later
    /// [`next`](crate::Pipeline::next) re-raises it.
    pub fn error(&self, error: impl Into<Error>) -> Result<()> {
        self.handoff.error(error.into())
    }

    pub fn is_complete(&self) -> bool {
        self.handoff.is_complete()
    }

    pub fn is_disposed(&self) -> bool {
        self.handoff.is_disposed()
    }

    /// All accepted values were delivered and the stream reached a terminal
    /// state.
    pub fn is_consumed(&self) -> bool {
        self.handoff.is_consumed()
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.handoff.is_terminal()
    }
}

/// Wraps the emitter a producer-side task drives. Every normal exit of such
/// a task settles the stream first (complete, error, or the consumer
/// already disposed), so a guard dropped on a live stream means the task
/// died mid-stream, and the consumer sees [`Error::Panicked`] instead of a
/// clean end. Clones taken through the guard are plain emitters; only the
/// task's own exit is armed.
pub(crate) struct PanicGuard<V> {
    emitter: Emitter<V>,
}

impl<V> PanicGuard<V> {
    pub(crate) fn new(emitter: Emitter<V>) -> Self {
        PanicGuard { emitter }
    }
}

impl<V> Deref for PanicGuard<V> {
    type Target = Emitter<V>;

    fn deref(&self) -> &Emitter<V> {
        &self.emitter
    }
}

impl<V> Drop for PanicGuard<V> {
    fn drop(&mut self) {
        // a no-op on a settled stream
        let _ = self.emitter.error(Error::Panicked);
    }
}
