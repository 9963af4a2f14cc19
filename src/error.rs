use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced by pipelines and emitters.
///
/// [`Error::Failed`] is the only variant that travels along a stream: once a
/// producer calls [`error`](crate::Emitter::error), every subsequent
/// [`next`](crate::Pipeline::next) on the consumer side re-raises it.
/// [`Error::Disposed`] and [`Error::Cancelled`] are local to the call that
/// observed them and never cross a stream boundary.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The producer injected a failure; the stream is over.
    #[error("stream failed: {0}")]
    Failed(#[source] Arc<dyn std::error::Error + Send + Sync>),

    /// The consumer abandoned the stream before this emit's value was taken.
    #[error("stream disposed before the value was taken")]
    Disposed,

    /// A cancellation token fired while waiting for the next value. The
    /// stream itself is intact; a later call may resume waiting.
    #[error("wait for the next value was cancelled")]
    Cancelled,

    /// The operation is not valid once the stream reached a terminal state,
    /// e.g. emitting after `error` or completing twice.
    #[error("stream already reached a terminal state")]
    Terminated,

    /// A producer or operator task died, most likely from a panic, before
    /// the stream reached a terminal state.
    #[error("stream abandoned by a crashed task")]
    Panicked,

    /// An ad-hoc failure message.
    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Wraps any error type as a stream failure.
    pub fn failed<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Error::Failed(Arc::new(error))
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::Custom(message)
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Error::Custom(message.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
