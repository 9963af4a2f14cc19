use std::sync::Arc;

use tokio::sync::Semaphore;

/// Controls the parallelism and ordering of [`concurrent`] and
/// [`flat_map`] stages.
///
/// The semaphore is injected rather than owned: its capacity caps how many
/// values are in flight, and sharing one semaphore across several stages
/// gives them a common budget. Permits are assumed FIFO-fair and are
/// released on every exit path, including errors and cancellation.
///
/// ```rust
/// use std::sync::Arc;
/// use millrace::Concurrency;
/// use tokio::sync::Semaphore;
///
/// // up to 10 values in flight, results in upstream order
/// let concurrency = Concurrency::ordered(Arc::new(Semaphore::new(10)));
/// ```
///
/// [`concurrent`]: crate::Pipeline::concurrent
/// [`flat_map`]: crate::Pipeline::flat_map
pub struct Concurrency {
    /// Caps the number of values processed simultaneously.
    pub semaphore: Arc<Semaphore>,
    /// Whether downstream emission order must equal upstream order.
    pub preserve_order: bool,
}

impl Concurrency {
    /// Bounded parallelism that preserves the upstream order downstream. A
    /// slow value does not block its successors from being *processed*,
    /// only from being *emitted* before it.
    pub fn ordered(semaphore: Arc<Semaphore>) -> Self {
        Self {
            semaphore,
            preserve_order: true,
        }
    }

    /// Bounded parallelism that emits results as they become ready.
    pub fn unordered(semaphore: Arc<Semaphore>) -> Self {
        Self {
            semaphore,
            preserve_order: false,
        }
    }

    /// One value at a time, in order.
    pub fn serial() -> Self {
        Self::ordered(Arc::new(Semaphore::new(1)))
    }
}

impl Default for Concurrency {
    fn default() -> Self {
        Self::serial()
    }
}
