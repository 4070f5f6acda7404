//! The signaling contract between one producer and one consumer.
//!
//! A [`Publisher`] hands each [`Subscriber`] a [`Subscription`] through which
//! the subscriber signals demand (`request`) or loses interest (`cancel`). The
//! publisher answers with `on_next` for at most the requested number of
//! elements and then at most one of `on_complete` / `on_error`.
//!
//! All signals for one subscription are delivered from the publishing stage's
//! own task, one at a time, so a subscriber never sees two signals concurrently.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::error::Error;

/// The consuming side of a subscription.
///
/// Implementations must not block: they run on the publishing stage's task.
pub trait Subscriber<T>: Send + 'static {
    /// Called exactly once, before any other signal.
    fn on_subscribe(&mut self, subscription: Subscription);

    /// Delivers one element. Never called more often than requested.
    fn on_next(&mut self, element: T);

    /// Terminal failure signal.
    fn on_error(&mut self, error: Error);

    /// Terminal completion signal.
    fn on_complete(&mut self);
}

/// The producing side: accepts a subscriber and starts signaling it.
pub trait Publisher<T> {
    /// Attach a subscriber. A publisher accepts exactly one subscriber over
    /// its lifetime; every later attempt receives `on_subscribe` with a dead
    /// subscription followed by `on_error(Error::AlreadySubscribed)`.
    fn subscribe(&self, subscriber: Box<dyn Subscriber<T>>);
}

/// Demand and cancellation signals travelling upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    Request(u64),
    Cancel,
}

/// The live binding between one publisher and its subscriber.
///
/// Cloning yields another handle to the same subscription. Dropping the last
/// handle cancels the subscription, so a subscriber that wants elements must
/// keep one alive.
#[derive(Clone)]
pub struct Subscription {
    control: mpsc::UnboundedSender<Control>,
}

impl Subscription {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<Control>) {
        let (control, rx) = mpsc::unbounded_channel();
        (Self { control }, rx)
    }

    /// A subscription whose publisher will never deliver anything.
    pub(crate) fn rejected() -> Self {
        let (subscription, _) = Self::channel();
        subscription
    }

    /// Ask for `n` more elements. Demand adds up (saturating); `n == 0` is a
    /// protocol violation that the publisher answers with `on_error`.
    pub fn request(&self, n: u64) {
        let _ = self.control.send(Control::Request(n));
    }

    /// Stop the subscription. No signal is delivered after the publisher
    /// processes the cancellation.
    pub fn cancel(&self) {
        let _ = self.control.send(Control::Cancel);
    }

    /// Returns `true` once the publisher has released this subscription.
    pub fn is_closed(&self) -> bool {
        self.control.is_closed()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The publisher exposed by every running stage that has an output.
///
/// The first successful `subscribe` flips a single-assignment flag; later
/// subscribers are failed on the caller's thread without reaching the stage.
pub struct StagePublisher<T> {
    stage: Arc<str>,
    attach: mpsc::UnboundedSender<Box<dyn Subscriber<T>>>,
    subscribed: Arc<AtomicBool>,
}

impl<T> StagePublisher<T> {
    pub(crate) fn new(
        stage: Arc<str>,
        attach: mpsc::UnboundedSender<Box<dyn Subscriber<T>>>,
    ) -> Self {
        Self {
            stage,
            attach,
            subscribed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Name of the stage behind this publisher
    pub fn stage_name(&self) -> &str {
        &self.stage
    }

    /// Returns `true` once a subscriber has been accepted
    pub fn has_subscriber(&self) -> bool {
        self.subscribed.load(Ordering::Acquire)
    }
}

impl<T> Clone for StagePublisher<T> {
    fn clone(&self) -> Self {
        Self {
            stage: self.stage.clone(),
            attach: self.attach.clone(),
            subscribed: self.subscribed.clone(),
        }
    }
}

impl<T> fmt::Debug for StagePublisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagePublisher")
            .field("stage", &self.stage)
            .field("subscribed", &self.has_subscriber())
            .finish()
    }
}

impl<T: Send + 'static> Publisher<T> for StagePublisher<T> {
    fn subscribe(&self, subscriber: Box<dyn Subscriber<T>>) {
        if self
            .subscribed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(stage = %self.stage, "rejecting second subscriber");
            reject(subscriber, Error::AlreadySubscribed);
            return;
        }

        if let Err(mpsc::error::SendError(subscriber)) = self.attach.send(subscriber) {
            warn!(stage = %self.stage, "subscriber arrived after stage terminated");
            reject(subscriber, Error::StageTerminated);
        }
    }
}

fn reject<T: 'static>(mut subscriber: Box<dyn Subscriber<T>>, error: Error) {
    subscriber.on_subscribe(Subscription::rejected());
    subscriber.on_error(error);
}
