//! Core traits for stage logic.
//!
//! These traits describe what a stage does with elements; the stage runtime
//! in [`crate::stage`] wraps them with the signaling protocol, demand
//! accounting and cancellation. A failure returned (or a panic raised) from
//! any of these methods becomes an `on_error` downstream, never a crash of
//! the surrounding graph.

use std::ops::ControlFlow;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Why a producer stage stopped.
#[derive(Debug, Clone)]
pub enum StopReason {
    /// The stream completed normally
    Completed,
    /// The stream failed, including on shutdown or a protocol violation
    Failed(Error),
    /// Downstream cancelled or went away
    Cancelled,
}

/// A producer generates elements on demand.
///
/// Producers are pull-based: `produce` is only called while the downstream
/// subscriber has outstanding demand, and never again while a previous call
/// is still pending.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use flowweld::error::Result;
/// use flowweld::traits::Producer;
///
/// struct Countdown {
///     remaining: u32,
/// }
///
/// #[async_trait]
/// impl Producer for Countdown {
///     type Item = u32;
///
///     async fn produce(&mut self) -> Result<Option<Self::Item>> {
///         if self.remaining == 0 {
///             return Ok(None); // Signal completion
///         }
///         self.remaining -= 1;
///         Ok(Some(self.remaining))
///     }
/// }
/// ```
#[async_trait]
pub trait Producer: Send + 'static {
    /// The type of elements this producer generates
    type Item: Send + 'static;

    /// Produce the next element, or `None` once the producer is exhausted.
    async fn produce(&mut self) -> Result<Option<Self::Item>>;

    /// Resolves once the producer can terminate without being asked for
    /// another element: `Ok(())` completes the stream, `Err` fails it.
    ///
    /// Awaited while there is no outstanding demand. The future is dropped
    /// whenever demand arrives, so implementations must be cancel-safe.
    async fn await_termination(&mut self) -> Result<()> {
        std::future::pending().await
    }

    /// Called exactly once when the stage stops, whatever the reason.
    fn on_stop(&mut self, _reason: &StopReason) {}
}

/// A processor transforms elements (consumer + producer combined).
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use flowweld::error::Result;
/// use flowweld::traits::Processor;
///
/// struct Double;
///
/// #[async_trait]
/// impl Processor for Double {
///     type Input = i32;
///     type Output = i32;
///
///     async fn process(&mut self, item: Self::Input) -> Result<Vec<Self::Output>> {
///         Ok(vec![item * 2])
///     }
/// }
/// ```
#[async_trait]
pub trait Processor: Send + 'static {
    /// The type of elements this processor accepts
    type Input: Send + 'static;
    /// The type of elements this processor produces
    type Output: Send + 'static;

    /// Process one input element and produce zero or more output elements.
    ///
    /// Returning an empty Vec means the element was consumed without output.
    async fn process(&mut self, item: Self::Input) -> Result<Vec<Self::Output>>;

    /// Called when upstream is exhausted (or the processor reports itself
    /// exhausted), allowing final output generation.
    async fn finish(&mut self) -> Result<Vec<Self::Output>> {
        Ok(vec![])
    }

    /// Returns `true` once the processor wants no further input. The stage
    /// then cancels upstream and completes after flushing `finish`.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// A consumer terminates a stream.
///
/// # Examples
///
/// ```rust
/// use std::ops::ControlFlow;
/// use async_trait::async_trait;
/// use flowweld::error::Result;
/// use flowweld::traits::Consumer;
///
/// struct Log;
///
/// #[async_trait]
/// impl Consumer for Log {
///     type Item = String;
///
///     async fn consume(&mut self, item: Self::Item) -> Result<ControlFlow<()>> {
///         println!("consumed: {item}");
///         Ok(ControlFlow::Continue(()))
///     }
///
///     async fn finish(&mut self, _outcome: Result<()>) {}
/// }
/// ```
#[async_trait]
pub trait Consumer: Send + 'static {
    /// The type of elements this consumer accepts
    type Item: Send + 'static;

    /// Called once the upstream subscription is established.
    /// `Break` cancels upstream before any element is requested.
    async fn start(&mut self) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    /// Process a single element. `Break` cancels upstream and finishes
    /// successfully; `Err` cancels upstream and finishes with that failure.
    async fn consume(&mut self, item: Self::Item) -> Result<ControlFlow<()>>;

    /// Called exactly once with how the stream ended for this consumer.
    async fn finish(&mut self, outcome: Result<()>);
}
