//! The externally completed source.
//!
//! The handle and the running stage share a `watch` cell. The handle only
//! ever moves the cell out of `Pending`; the stage picks the offered value up
//! inside its own processing turn and closes the cell. Whichever side moves
//! the cell out of `Pending` first decides the outcome. When the stage stops
//! the cell is closed for good, so a stopped stage never accepts a value.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{Error, Result};
use crate::traits::{Producer, StopReason};

/// How a [`MaybeHandle`] was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaybeOutcome {
    /// The stream completed without an element, either because the handle was
    /// completed empty or because downstream cancelled first
    Empty,
    /// The stream was offered exactly one element
    Value,
    /// The stage failed before delivering a resolution; see
    /// [`MaybeHandle::failure`]
    Failed,
}

enum MaybeSlot<T> {
    Pending,
    Offered(Option<T>),
    Closed(MaybeOutcome),
    Failed(Error),
}

impl<T> MaybeSlot<T> {
    fn is_pending(&self) -> bool {
        matches!(self, MaybeSlot::Pending)
    }

    fn outcome(&self) -> Option<MaybeOutcome> {
        match self {
            MaybeSlot::Pending => None,
            MaybeSlot::Offered(Some(_)) => Some(MaybeOutcome::Value),
            MaybeSlot::Offered(None) => Some(MaybeOutcome::Empty),
            MaybeSlot::Closed(outcome) => Some(*outcome),
            MaybeSlot::Failed(_) => Some(MaybeOutcome::Failed),
        }
    }

    /// The stage delivered (or discarded) whatever was offered.
    fn is_closed(&self) -> bool {
        matches!(self, MaybeSlot::Closed(_) | MaybeSlot::Failed(_))
    }
}

/// Materialized value of [`Source::maybe`](crate::sources::Source::maybe).
///
/// Only the first resolution takes effect; later attempts return `false`.
/// Once the stage has stopped every attempt returns `false`.
pub struct MaybeHandle<T> {
    slot: Arc<watch::Sender<MaybeSlot<T>>>,
}

impl<T> Clone for MaybeHandle<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T> std::fmt::Debug for MaybeHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaybeHandle")
            .field("outcome", &self.slot.borrow().outcome())
            .finish()
    }
}

impl<T: Send + Sync + 'static> MaybeHandle<T> {
    /// Complete the stream without an element.
    pub fn complete(&self) -> bool {
        self.offer(None)
    }

    /// Emit `value` and then complete the stream.
    pub fn complete_with(&self, value: T) -> bool {
        self.offer(Some(value))
    }

    fn offer(&self, value: Option<T>) -> bool {
        self.slot.send_if_modified(move |slot| {
            if !slot.is_pending() {
                return false;
            }
            *slot = MaybeSlot::Offered(value);
            true
        })
    }

    /// Returns `true` once any resolution has happened
    pub fn is_resolved(&self) -> bool {
        !self.slot.borrow().is_pending()
    }

    /// Wait for the resolution.
    pub async fn outcome(&self) -> MaybeOutcome {
        let mut rx = self.slot.subscribe();
        let outcome = match rx.wait_for(|slot| !slot.is_pending()).await {
            Ok(slot) => slot.outcome().unwrap_or(MaybeOutcome::Empty),
            Err(_) => MaybeOutcome::Empty,
        };
        outcome
    }

    /// The error the stage failed with, if it failed before resolving.
    pub fn failure(&self) -> Option<Error> {
        match &*self.slot.borrow() {
            MaybeSlot::Failed(error) => Some(error.clone()),
            _ => None,
        }
    }
}

pub(crate) struct MaybeProducer<T> {
    slot: Arc<watch::Sender<MaybeSlot<T>>>,
    rx: watch::Receiver<MaybeSlot<T>>,
    cancellation: CancellationToken,
    emitted: bool,
}

impl<T: Send + Sync + 'static> MaybeProducer<T> {
    pub(crate) fn new(cancellation: CancellationToken) -> (Self, MaybeHandle<T>) {
        let (tx, rx) = watch::channel(MaybeSlot::Pending);
        let slot = Arc::new(tx);
        let producer = Self {
            slot: slot.clone(),
            rx,
            cancellation,
            emitted: false,
        };
        (producer, MaybeHandle { slot })
    }

    /// Take whatever the handle offered and close the cell.
    fn take_offer(&self) -> Option<T> {
        let mut taken = None;
        self.slot.send_if_modified(|slot| match slot {
            MaybeSlot::Offered(value) => {
                taken = value.take();
                let outcome = if taken.is_some() {
                    MaybeOutcome::Value
                } else {
                    MaybeOutcome::Empty
                };
                *slot = MaybeSlot::Closed(outcome);
                true
            }
            _ => false,
        });
        taken
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Producer for MaybeProducer<T> {
    type Item = T;

    async fn produce(&mut self) -> Result<Option<Self::Item>> {
        if self.emitted {
            return Ok(None);
        }
        let Self {
            rx, cancellation, ..
        } = self;
        let offered = tokio::select! {
            _ = cancellation.cancelled() => false,
            ready = async { rx.wait_for(|slot| !slot.is_pending()).await.is_ok() } => ready,
        };
        if !offered {
            return Ok(None);
        }
        self.emitted = true;
        Ok(self.take_offer())
    }

    async fn await_termination(&mut self) -> Result<()> {
        if self.emitted {
            return Ok(());
        }
        // only an empty resolution can end the stream without demand
        let rx = &mut self.rx;
        let empty = async {
            rx.wait_for(|slot| matches!(slot, MaybeSlot::Offered(None)))
                .await
                .is_ok()
        }
        .await;
        if empty {
            self.emitted = true;
            self.take_offer();
            return Ok(());
        }
        std::future::pending().await
    }

    fn on_stop(&mut self, reason: &StopReason) {
        let closed = close(&self.slot, || match reason {
            StopReason::Failed(error) => MaybeSlot::Failed(error.clone()),
            StopReason::Completed | StopReason::Cancelled => {
                MaybeSlot::Closed(MaybeOutcome::Empty)
            }
        });
        if closed {
            trace!(?reason, "maybe source stopped before delivering a resolution");
        }
    }
}

impl<T> Drop for MaybeProducer<T> {
    fn drop(&mut self) {
        close(&self.slot, || MaybeSlot::Failed(Error::AbruptTermination));
    }
}

/// Close a cell the stage never delivered. An offered but undelivered value
/// is discarded along with it.
fn close<T>(
    slot: &watch::Sender<MaybeSlot<T>>,
    closed: impl FnOnce() -> MaybeSlot<T>,
) -> bool {
    slot.send_if_modified(|slot| {
        if slot.is_closed() {
            return false;
        }
        *slot = closed();
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn only_the_first_resolution_counts() {
        let (mut producer, handle) = MaybeProducer::new(CancellationToken::new());
        assert!(!handle.is_resolved());
        assert!(handle.complete_with(3));
        assert!(!handle.complete());
        assert!(!handle.complete_with(4));
        assert_eq!(handle.outcome().await, MaybeOutcome::Value);

        assert_eq!(producer.produce().await.unwrap(), Some(3));
        assert_eq!(producer.produce().await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_resolution_terminates_without_demand() {
        let (mut producer, handle) = MaybeProducer::<u8>::new(CancellationToken::new());
        let waiter = handle.clone();
        tokio::spawn(async move {
            waiter.complete();
        });
        assert!(producer.await_termination().await.is_ok());
        assert_eq!(handle.outcome().await, MaybeOutcome::Empty);
    }

    #[tokio::test]
    async fn cancellation_resolves_the_handle_as_empty() {
        let token = CancellationToken::new();
        let (mut producer, handle) = MaybeProducer::<u8>::new(token.clone());
        token.cancel();
        assert_eq!(producer.produce().await.unwrap(), None);
        producer.on_stop(&StopReason::Cancelled);
        assert_eq!(handle.outcome().await, MaybeOutcome::Empty);
        assert!(!handle.complete_with(1));
    }

    #[tokio::test]
    async fn failed_stage_refuses_later_values() {
        let (mut producer, handle) = MaybeProducer::<u8>::new(CancellationToken::new());
        producer.on_stop(&StopReason::Failed(Error::InvalidDemand(0)));

        assert!(!handle.complete_with(5));
        assert!(!handle.complete());
        assert_eq!(handle.outcome().await, MaybeOutcome::Failed);
        assert!(matches!(handle.failure(), Some(Error::InvalidDemand(0))));
    }

    #[tokio::test]
    async fn undelivered_offer_is_not_reported_as_a_value() {
        let (mut producer, handle) = MaybeProducer::new(CancellationToken::new());
        assert!(handle.complete_with(8u8));
        producer.on_stop(&StopReason::Failed(Error::Shutdown));
        assert_eq!(handle.outcome().await, MaybeOutcome::Failed);

        let (mut producer, handle) = MaybeProducer::new(CancellationToken::new());
        assert!(handle.complete_with(8u8));
        producer.on_stop(&StopReason::Cancelled);
        assert_eq!(handle.outcome().await, MaybeOutcome::Empty);
    }

    #[tokio::test]
    async fn delivered_value_survives_the_stop() {
        let (mut producer, handle) = MaybeProducer::new(CancellationToken::new());
        assert!(handle.complete_with(2u8));
        assert_eq!(producer.produce().await.unwrap(), Some(2));
        producer.on_stop(&StopReason::Completed);
        assert_eq!(handle.outcome().await, MaybeOutcome::Value);
        assert!(handle.failure().is_none());
    }

    #[tokio::test]
    async fn dropped_producer_fails_the_handle() {
        let (producer, handle) = MaybeProducer::<u8>::new(CancellationToken::new());
        drop(producer);
        assert_eq!(handle.outcome().await, MaybeOutcome::Failed);
        assert!(matches!(handle.failure(), Some(Error::AbruptTermination)));
    }
}
