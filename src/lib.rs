//! # Backpressure-aware stream graphs for Rust
//!
//! This crate describes data-producing stages as immutable graph blueprints,
//! composes them declaratively, and materializes them into running stages that
//! talk to each other through a demand-driven publisher/subscriber protocol.
//!
//! ## Core Concepts
//!
//! - **Source / Flow / Sink**: immutable descriptions with one open output,
//!   one input and one output, or one input respectively
//! - **RunnableGraph**: a closed description, ready to run
//! - **Materializer**: turns a description into running stages and returns
//!   its materialized value (a completion future, a handle, a publisher)
//! - **Signal protocol**: `request(n)` / `cancel()` upstream,
//!   `on_next` / `on_complete` / `on_error` downstream, never more elements
//!   than requested and at most one terminal signal
//!
//! ## Example
//!
//! ```rust
//! use flowweld::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let materializer = Materializer::new(MaterializerConfig::default())?;
//!
//!     let fib = Source::unfold((0u64, 1u64), |(a, b)| {
//!         if a > 100 { None } else { Some(((b, a + b), a)) }
//!     });
//!
//!     let numbers = fib.map(|n| n * 2).run_with(Sink::seq(), &materializer)?.await?;
//!     assert_eq!(numbers, vec![0, 2, 2, 4, 6, 10, 16, 26, 42, 68, 110, 178]);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod graph;
pub mod junctions;
pub mod materializer;
pub mod processors;
pub mod protocol;
pub mod sinks;
pub mod sources;
pub mod stage;
pub mod testing;
pub mod traits;

// Re-export commonly used items
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::graph::{GraphBuilder, Inlet, Keep, Outlet};
    pub use crate::junctions::{FanIn, Merge};
    pub use crate::materializer::{Materializer, MaterializerConfig, StageFailure};
    pub use crate::processors::Flow;
    pub use crate::protocol::{Publisher, StagePublisher, Subscriber, Subscription};
    pub use crate::sinks::{Completion, RunnableGraph, Sink};
    pub use crate::sources::{MaybeHandle, MaybeOutcome, Source};
    pub use crate::stage::StageContext;
    pub use crate::traits::{Consumer, Processor, Producer, StopReason};
}

// Re-export main error type
pub use error::{Error, Result};

#[cfg(feature = "metrics")]
pub mod metrics;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
