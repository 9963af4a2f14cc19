//! Backpressured async pipelines. A millrace is the channel that feeds a
//! water wheel: everything the wheel does is paced by what the channel lets
//! through.
//!
//! This crate expresses computations as composable streams of values that
//! are produced, transformed and consumed over time, with explicit
//! concurrency, ordering and backpressure control on top of tokio tasks.
//!
//! Main features:
//!
//! - Pull-based with backpressure: a producer that awaits its emits runs at
//!   consumer speed
//! - Explicit parallelism: the `concurrent` stage caps in-flight work with
//!   an injected semaphore, ordered or unordered
//! - Disciplined termination: completion, errors and disposal each
//!   propagate exactly one way, and dropping either end of a stream cleans
//!   up the other
//! - Built on plain tokio tasks and an in-crate hand-off channel; for now
//!   only the tokio runtime is supported
//!
//! Example:
//!
//! ```rust
//! use std::sync::Arc;
//! use millrace::{Concurrency, Pipeline};
//! use tokio::sync::Semaphore;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! # async fn fetch(url: String) -> String { url }
//! # async fn parse(body: String) -> Option<String> { Some(body) }
//! # let urls: Vec<String> = Vec::new();
//! let results = Pipeline::from_iter(urls)
//!     .concurrent(Concurrency::ordered(Arc::new(Semaphore::new(5))), |chain| {
//!         chain.map(fetch)
//!     })
//!     .filter_map(parse)
//!     .buffer(16)
//!     .collect()
//!     .await
//!     .unwrap();
//! # let _ = results;
//! # });
//! ```
//!
//! ## Hand-offs
//!
//! The primitive underneath everything is the hand-off pair created by
//! [`handoff()`]: an [`Emitter`] (producer side) and a [`Pipeline`]
//! (consumer side) connected by a rendezvous channel. `emit` resolves once
//! the value was taken; `next` suspends until a value or a terminal state
//! arrives. [`handoff_with_capacity`] adds a bounded buffer in between.
//!
//! Operators follow one shape: a task that reads the upstream pipeline and
//! feeds a fresh hand-off, propagating completion, errors and disposal.
//! The [`Operator`] trait makes that shape pluggable via
//! [`Pipeline::pipe`].
//!
//! ## Concurrency control
//!
//! [`Pipeline::concurrent`] and [`Pipeline::flat_map`] take a
//! [`Concurrency`] describing the injected semaphore and whether upstream
//! order must be preserved:
//! - `Concurrency::serial()`: one value at a time
//! - `Concurrency::ordered(semaphore)`: parallel, results in source order
//! - `Concurrency::unordered(semaphore)`: parallel, results by completion
//!
//! ## Fan-in and fan-out
//!
//! [`merge`], [`concat`] and [`zip`] combine several pipelines into one;
//! [`share`] multicasts one pipeline to many consumers, advancing only as
//! fast as the slowest one.

mod combine;
mod concurrency;
mod emitter;
mod error;
mod handoff;
mod operator;
pub mod ops;
mod pipeline;
mod share;

#[cfg(test)]
mod test_utils;

pub use combine::{concat, merge, zip};
pub use concurrency::Concurrency;
pub use emitter::Emitter;
pub use error::{Error, Result};
pub use handoff::{handoff, handoff_with_capacity};
pub use operator::Operator;
pub use ops::flat_map::Step;
pub use pipeline::Pipeline;
pub use share::{share, Shared};
