//! Test tooling: a manually driven subscriber.
//!
//! [`Sink::probe`](crate::sinks::Sink::probe) materializes to a
//! [`SubscriberProbe`], which lets a test decide exactly when and how much to
//! request and assert on every signal the upstream stage delivers.
//!
//! ```rust
//! use flowweld::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let materializer = Materializer::new(MaterializerConfig::default())?;
//!     let mut probe = Source::single(5).run_with(Sink::probe(), &materializer)?;
//!
//!     probe.expect_subscription().await?;
//!     assert_eq!(probe.request_next().await?, 5);
//!     probe.expect_complete().await?;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::protocol::{Subscriber, Subscription};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

enum ProbeEvent<T> {
    Subscribed(Subscription),
    Next(T),
    Error(Error),
    Complete,
}

impl<T> ProbeEvent<T> {
    fn describe(&self) -> String {
        match self {
            ProbeEvent::Subscribed(_) => "on_subscribe".to_string(),
            ProbeEvent::Next(_) => "on_next".to_string(),
            ProbeEvent::Error(error) => format!("on_error({error})"),
            ProbeEvent::Complete => "on_complete".to_string(),
        }
    }
}

/// The subscriber half of a probe; forwards every signal to its
/// [`SubscriberProbe`].
pub struct ProbeSubscriber<T> {
    events: mpsc::UnboundedSender<ProbeEvent<T>>,
}

impl<T: Send + 'static> Subscriber<T> for ProbeSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Subscription) {
        let _ = self.events.send(ProbeEvent::Subscribed(subscription));
    }

    fn on_next(&mut self, element: T) {
        let _ = self.events.send(ProbeEvent::Next(element));
    }

    fn on_error(&mut self, error: Error) {
        let _ = self.events.send(ProbeEvent::Error(error));
    }

    fn on_complete(&mut self) {
        let _ = self.events.send(ProbeEvent::Complete);
    }
}

/// Records the signals received by a [`ProbeSubscriber`].
///
/// Every `expect_*` call waits at most the probe's timeout (three seconds
/// unless changed) and reports anything unexpected as an error.
pub struct SubscriberProbe<T> {
    events: mpsc::UnboundedReceiver<ProbeEvent<T>>,
    subscription: Option<Subscription>,
    timeout: Duration,
}

impl<T: Send + 'static> SubscriberProbe<T> {
    /// A connected subscriber/probe pair, for subscribing to a publisher by hand
    pub fn pair() -> (ProbeSubscriber<T>, SubscriberProbe<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let probe = SubscriberProbe {
            events: rx,
            subscription: None,
            timeout: DEFAULT_TIMEOUT,
        };
        (ProbeSubscriber { events: tx }, probe)
    }

    /// Change how long each expectation waits
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    async fn next_event(&mut self) -> Result<ProbeEvent<T>> {
        match tokio::time::timeout(self.timeout, self.events.recv()).await {
            Ok(Some(event)) => Ok(event),
            Ok(None) => Err(Error::custom("probe: subscriber dropped without a terminal signal")),
            Err(_) => Err(Error::custom(format!(
                "probe: no signal within {:?}",
                self.timeout
            ))),
        }
    }

    /// Next signal after the subscription has been received
    async fn next_signal(&mut self) -> Result<ProbeEvent<T>> {
        self.expect_subscription().await?;
        self.next_event().await
    }

    /// Wait for `on_subscribe`. Returns immediately if it was already seen.
    pub async fn expect_subscription(&mut self) -> Result<()> {
        if self.subscription.is_some() {
            return Ok(());
        }
        match self.next_event().await? {
            ProbeEvent::Subscribed(subscription) => {
                self.subscription = Some(subscription);
                Ok(())
            }
            other => Err(Error::custom(format!(
                "probe: expected on_subscribe, got {}",
                other.describe()
            ))),
        }
    }

    /// Signal demand for `n` elements
    pub fn request(&self, n: u64) -> Result<()> {
        self.subscription()?.request(n);
        Ok(())
    }

    /// Cancel the subscription
    pub fn cancel(&self) -> Result<()> {
        self.subscription()?.cancel();
        Ok(())
    }

    fn subscription(&self) -> Result<&Subscription> {
        self.subscription
            .as_ref()
            .ok_or_else(|| Error::custom("probe: no subscription yet"))
    }

    /// Wait for one element
    pub async fn expect_next(&mut self) -> Result<T> {
        match self.next_signal().await? {
            ProbeEvent::Next(element) => Ok(element),
            other => Err(Error::custom(format!(
                "probe: expected on_next, got {}",
                other.describe()
            ))),
        }
    }

    /// Request one element and wait for it
    pub async fn request_next(&mut self) -> Result<T> {
        self.expect_subscription().await?;
        self.request(1)?;
        self.expect_next().await
    }

    /// Wait for `on_complete`
    pub async fn expect_complete(&mut self) -> Result<()> {
        match self.next_signal().await? {
            ProbeEvent::Complete => Ok(()),
            other => Err(Error::custom(format!(
                "probe: expected on_complete, got {}",
                other.describe()
            ))),
        }
    }

    /// Wait for `on_error` and return the error
    pub async fn expect_error(&mut self) -> Result<Error> {
        match self.next_signal().await? {
            ProbeEvent::Error(error) => Ok(error),
            other => Err(Error::custom(format!(
                "probe: expected on_error, got {}",
                other.describe()
            ))),
        }
    }

    /// Assert that nothing arrives for `duration`
    pub async fn expect_no_event(&mut self, duration: Duration) -> Result<()> {
        match tokio::time::timeout(duration, self.events.recv()).await {
            Err(_) | Ok(None) => Ok(()),
            Ok(Some(event)) => Err(Error::custom(format!(
                "probe: expected silence, got {}",
                event.describe()
            ))),
        }
    }
}

impl<T> std::fmt::Debug for SubscriberProbe<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberProbe")
            .field("subscribed", &self.subscription.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_signals_in_order() {
        let (mut subscriber, mut probe) = SubscriberProbe::<u8>::pair();
        let (subscription, _control) = Subscription::channel();
        subscriber.on_subscribe(subscription);
        subscriber.on_next(1);
        subscriber.on_complete();

        probe.expect_subscription().await.unwrap();
        assert_eq!(probe.expect_next().await.unwrap(), 1);
        probe.expect_complete().await.unwrap();
    }

    #[tokio::test]
    async fn reports_unexpected_signals() {
        let (mut subscriber, mut probe) = SubscriberProbe::<u8>::pair();
        let (subscription, _control) = Subscription::channel();
        subscriber.on_subscribe(subscription);
        subscriber.on_complete();

        let error = probe.expect_next().await.unwrap_err();
        assert!(error.to_string().contains("on_complete"));
    }

    #[tokio::test]
    async fn times_out_without_signals() {
        let (_subscriber, mut probe) = SubscriberProbe::<u8>::pair();
        probe.set_timeout(Duration::from_millis(10));
        assert!(probe.expect_subscription().await.is_err());
        assert!(probe.request(1).is_err());
    }
}
