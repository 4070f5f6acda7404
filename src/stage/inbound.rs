//! Upstream side of a stage: subscriptions to the stages feeding it.

use tokio::sync::mpsc;
use tracing::trace;

use crate::error::Error;
use crate::protocol::{Subscriber, Subscription};

/// An upstream signal, forwarded into the owning stage's mailbox.
pub(crate) enum Signal<T> {
    Subscribed(Subscription),
    Next(T),
    Completed,
    Failed(Error),
}

pub(crate) type SignalSender<T> = mpsc::UnboundedSender<(usize, Signal<T>)>;
pub(crate) type SignalReceiver<T> = mpsc::UnboundedReceiver<(usize, Signal<T>)>;

/// Subscriber handed to an upstream publisher; tags every signal with the
/// inlet it arrived on so a fan-in stage can tell its inputs apart.
pub(crate) struct InletSubscriber<T> {
    port: usize,
    mailbox: SignalSender<T>,
}

impl<T> InletSubscriber<T> {
    pub(crate) fn new(port: usize, mailbox: SignalSender<T>) -> Self {
        Self { port, mailbox }
    }
}

impl<T: Send + 'static> Subscriber<T> for InletSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Subscription) {
        if let Err(mpsc::error::SendError((_, Signal::Subscribed(subscription)))) = self
            .mailbox
            .send((self.port, Signal::Subscribed(subscription)))
        {
            // the stage is gone, nobody will ever request
            subscription.cancel();
        }
    }

    fn on_next(&mut self, element: T) {
        let _ = self.mailbox.send((self.port, Signal::Next(element)));
    }

    fn on_error(&mut self, error: Error) {
        let _ = self.mailbox.send((self.port, Signal::Failed(error)));
    }

    fn on_complete(&mut self) {
        let _ = self.mailbox.send((self.port, Signal::Completed));
    }
}

/// Protocol state for one upstream subscription.
#[derive(Debug, Default)]
pub(crate) struct Inbound {
    subscription: Option<Subscription>,
    outstanding: u64,
    closed: bool,
}

impl Inbound {
    pub(crate) fn on_subscribe(&mut self, subscription: Subscription) {
        if self.closed || self.subscription.is_some() {
            subscription.cancel();
            return;
        }
        self.subscription = Some(subscription);
    }

    pub(crate) fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// Elements requested but not yet received.
    pub(crate) fn outstanding(&self) -> u64 {
        self.outstanding
    }

    /// Request `n` more elements; a no-op until subscribed or once closed.
    pub(crate) fn request(&mut self, n: u64) {
        if n == 0 || self.closed {
            return;
        }
        if let Some(subscription) = &self.subscription {
            subscription.request(n);
            self.outstanding = self.outstanding.saturating_add(n);
        }
    }

    pub(crate) fn on_next(&mut self) {
        self.outstanding = self.outstanding.saturating_sub(1);
    }

    /// Upstream delivered its terminal signal.
    pub(crate) fn close(&mut self) {
        self.closed = true;
        self.outstanding = 0;
        self.subscription = None;
    }

    /// Stop listening to upstream. Idempotent.
    pub(crate) fn cancel(&mut self) {
        if self.closed {
            return;
        }
        if let Some(subscription) = self.subscription.take() {
            trace!("cancelling upstream subscription");
            subscription.cancel();
        }
        self.closed = true;
        self.outstanding = 0;
    }
}

/// Close a stage mailbox on exit, cancelling any subscription that arrived
/// after the stage stopped listening.
pub(crate) fn release<T>(mailbox: &mut SignalReceiver<T>) {
    mailbox.close();
    while let Ok((_, signal)) = mailbox.try_recv() {
        if let Signal::Subscribed(subscription) = signal {
            subscription.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Control;

    #[test]
    fn requests_are_tracked_until_elements_arrive() {
        let (subscription, mut control) = Subscription::channel();
        let mut inbound = Inbound::default();

        inbound.request(3);
        assert_eq!(inbound.outstanding(), 0);

        inbound.on_subscribe(subscription);
        inbound.request(3);
        assert_eq!(inbound.outstanding(), 3);
        assert_eq!(control.try_recv().ok(), Some(Control::Request(3)));

        inbound.on_next();
        assert_eq!(inbound.outstanding(), 2);
    }

    #[test]
    fn cancel_before_subscription_cancels_late_subscription() {
        let (subscription, mut control) = Subscription::channel();
        let mut inbound = Inbound::default();
        inbound.cancel();
        inbound.on_subscribe(subscription);
        assert_eq!(control.try_recv().ok(), Some(Control::Cancel));
        assert!(inbound.is_closed());
    }

    #[test]
    fn duplicate_subscription_is_cancelled() {
        let (first, mut first_control) = Subscription::channel();
        let (second, mut second_control) = Subscription::channel();
        let mut inbound = Inbound::default();
        inbound.on_subscribe(first);
        inbound.on_subscribe(second);
        assert!(first_control.try_recv().is_err());
        assert_eq!(second_control.try_recv().ok(), Some(Control::Cancel));
    }

    #[test]
    fn release_cancels_queued_subscriptions() {
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, Signal<u8>)>();
        let (subscription, mut control) = Subscription::channel();
        tx.send((0, Signal::Subscribed(subscription))).ok();
        release(&mut rx);
        assert_eq!(control.try_recv().ok(), Some(Control::Cancel));
    }

    #[test]
    fn inlet_subscriber_cancels_when_stage_is_gone() {
        let (tx, rx) = mpsc::unbounded_channel::<(usize, Signal<u8>)>();
        drop(rx);
        let (subscription, mut control) = Subscription::channel();
        let mut inlet = InletSubscriber::new(0, tx);
        inlet.on_subscribe(subscription);
        assert_eq!(control.try_recv().ok(), Some(Control::Cancel));
    }
}
