//! Stage runtime.
//!
//! Every running stage is a single tokio task that owns all of its protocol
//! state: the downstream [`outbound`] side (subscriber, demand, termination)
//! and any upstream [`inbound`] subscriptions. Signals addressed to a stage
//! arrive through channels and are handled one at a time by that task, which
//! is what serializes every subscription.

pub(crate) mod consumer;
pub(crate) mod inbound;
pub(crate) mod outbound;
pub(crate) mod processor;
pub(crate) mod producer;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Per-materialization information handed to every stage.
#[derive(Clone, Debug)]
pub struct StageContext {
    name: Arc<str>,
    shutdown: CancellationToken,
    cancellation: CancellationToken,
    input_buffer: usize,
    max_elements_per_turn: usize,
}

impl StageContext {
    pub(crate) fn new(
        name: Arc<str>,
        shutdown: CancellationToken,
        input_buffer: usize,
        max_elements_per_turn: usize,
    ) -> Self {
        let cancellation = shutdown.child_token();
        Self {
            name,
            shutdown,
            cancellation,
            input_buffer: input_buffer.max(1),
            max_elements_per_turn: max_elements_per_turn.max(1),
        }
    }

    /// Unique name of this stage within its materializer
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        self.name.clone()
    }

    /// Cancelled when downstream cancels this stage or the materializer shuts
    /// down. Producers waiting on external input select on it.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub(crate) fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub(crate) fn input_buffer(&self) -> u64 {
        self.input_buffer as u64
    }

    pub(crate) fn max_elements_per_turn(&self) -> usize {
        self.max_elements_per_turn
    }
}
