//! Downstream side of a stage: one subscriber, its demand, and the stage's
//! termination state.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{Control, StagePublisher, Subscriber, Subscription};
use crate::traits::StopReason;

/// Demand at this level is treated as unbounded and never decremented.
const UNBOUNDED: u64 = u64::MAX;

#[derive(Debug, Clone)]
pub(crate) enum Termination {
    Open,
    Completed,
    Failed(Error),
    Cancelled,
}

pub(crate) enum DownstreamEvent<T> {
    Attached(Box<dyn Subscriber<T>>),
    AttachClosed,
    Control(Option<Control>),
}

pub(crate) struct Outbound<T> {
    stage: Arc<str>,
    attach: Option<mpsc::UnboundedReceiver<Box<dyn Subscriber<T>>>>,
    subscriber: Option<Box<dyn Subscriber<T>>>,
    control: Option<mpsc::UnboundedReceiver<Control>>,
    demand: u64,
    termination: Termination,
    /// Terminal signal reached before any subscriber attached.
    undelivered: Option<Result<()>>,
}

impl<T: Send + 'static> Outbound<T> {
    /// Create the publisher handed to the wiring and the outbound state kept by the stage.
    pub(crate) fn channel(stage: Arc<str>) -> (StagePublisher<T>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let publisher = StagePublisher::new(stage.clone(), tx);
        let outbound = Self {
            stage,
            attach: Some(rx),
            subscriber: None,
            control: None,
            demand: 0,
            termination: Termination::Open,
            undelivered: None,
        };
        (publisher, outbound)
    }

    pub(crate) fn demand(&self) -> u64 {
        self.demand
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.subscriber.is_some()
    }

    pub(crate) fn is_open(&self) -> bool {
        matches!(self.termination, Termination::Open)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        matches!(self.termination, Termination::Cancelled)
    }

    /// Terminated and nothing left to deliver.
    pub(crate) fn is_finished(&self) -> bool {
        !self.is_open() && self.undelivered.is_none()
    }

    /// Open, attached, and allowed to deliver at least one element.
    pub(crate) fn can_push(&self) -> bool {
        self.is_open() && self.is_attached() && self.demand > 0
    }

    /// Wait for the next downstream event. Cancel-safe.
    pub(crate) async fn next_event(&mut self) -> DownstreamEvent<T> {
        if let Some(attach) = self.attach.as_mut() {
            return match attach.recv().await {
                Some(subscriber) => DownstreamEvent::Attached(subscriber),
                None => DownstreamEvent::AttachClosed,
            };
        }
        if let Some(control) = self.control.as_mut() {
            return DownstreamEvent::Control(control.recv().await);
        }
        std::future::pending().await
    }

    pub(crate) fn handle(&mut self, event: DownstreamEvent<T>) {
        match event {
            DownstreamEvent::Attached(subscriber) => self.attach_subscriber(subscriber),
            DownstreamEvent::AttachClosed => {
                self.attach = None;
                if self.subscriber.is_none() {
                    trace!(stage = %self.stage, "publisher dropped without a subscriber");
                    self.undelivered = None;
                    self.termination = Termination::Cancelled;
                }
            }
            DownstreamEvent::Control(Some(Control::Request(0))) => {
                warn!(stage = %self.stage, "subscriber requested zero elements");
                self.fail(Error::InvalidDemand(0));
            }
            DownstreamEvent::Control(Some(Control::Request(n))) => {
                if self.is_open() {
                    self.demand = self.demand.saturating_add(n);
                    trace!(stage = %self.stage, requested = n, demand = self.demand, "demand");
                }
            }
            DownstreamEvent::Control(Some(Control::Cancel)) | DownstreamEvent::Control(None) => {
                self.cancel();
            }
        }
    }

    fn attach_subscriber(&mut self, mut subscriber: Box<dyn Subscriber<T>>) {
        self.attach = None;
        let (subscription, control) = Subscription::channel();
        subscriber.on_subscribe(subscription);
        trace!(stage = %self.stage, "subscriber attached");

        match self.undelivered.take() {
            Some(Ok(())) => subscriber.on_complete(),
            Some(Err(error)) => subscriber.on_error(error),
            None if self.is_open() => {
                self.subscriber = Some(subscriber);
                self.control = Some(control);
            }
            None => {}
        }
    }

    /// Deliver one element. Returns `false` if it had to be dropped.
    pub(crate) fn push(&mut self, element: T) -> bool {
        if !self.is_open() {
            trace!(stage = %self.stage, "dropping element after termination");
            return false;
        }
        if self.demand == 0 {
            warn!(stage = %self.stage, "dropping element pushed without demand");
            return false;
        }
        let Some(subscriber) = self.subscriber.as_mut() else {
            return false;
        };
        if self.demand != UNBOUNDED {
            self.demand -= 1;
        }
        subscriber.on_next(element);
        #[cfg(feature = "metrics")]
        crate::metrics::element_emitted();
        true
    }

    pub(crate) fn complete(&mut self) {
        self.terminate(Ok(()));
    }

    pub(crate) fn fail(&mut self, error: Error) {
        self.terminate(Err(error));
    }

    fn terminate(&mut self, outcome: Result<()>) {
        if !self.is_open() {
            trace!(stage = %self.stage, "ignoring second terminal signal");
            return;
        }
        self.termination = match &outcome {
            Ok(()) => Termination::Completed,
            Err(error) => Termination::Failed(error.clone()),
        };
        self.control = None;
        match self.subscriber.take() {
            Some(mut subscriber) => match outcome {
                Ok(()) => subscriber.on_complete(),
                Err(error) => subscriber.on_error(error),
            },
            None => self.undelivered = Some(outcome),
        }
    }

    fn cancel(&mut self) {
        if self.is_open() {
            trace!(stage = %self.stage, "downstream cancelled");
            self.termination = Termination::Cancelled;
        }
        self.subscriber = None;
        self.control = None;
    }

    #[cfg(test)]
    pub(crate) fn termination(&self) -> &Termination {
        &self.termination
    }

    /// How the stage ended, or `None` while it is still open.
    pub(crate) fn stop_reason(&self) -> Option<StopReason> {
        match &self.termination {
            Termination::Open => None,
            Termination::Completed => Some(StopReason::Completed),
            Termination::Failed(error) => Some(StopReason::Failed(error.clone())),
            Termination::Cancelled => Some(StopReason::Cancelled),
        }
    }
}
