//! Consumers behind the stock sinks.
//!
//! Each one reports how the stream ended through a oneshot sender that backs
//! the sink's [`Completion`](crate::sinks::Completion).

use std::marker::PhantomData;
use std::ops::ControlFlow;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::traits::Consumer;

type Reply<T> = oneshot::Sender<Result<T>>;

/// Collects every element into a vector.
pub(crate) struct SeqConsumer<T> {
    items: Vec<T>,
    reply: Option<Reply<Vec<T>>>,
}

impl<T> SeqConsumer<T> {
    pub(crate) fn new(reply: Reply<Vec<T>>) -> Self {
        Self {
            items: Vec::new(),
            reply: Some(reply),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Consumer for SeqConsumer<T> {
    type Item = T;

    async fn consume(&mut self, item: Self::Item) -> Result<ControlFlow<()>> {
        self.items.push(item);
        Ok(ControlFlow::Continue(()))
    }

    async fn finish(&mut self, outcome: Result<()>) {
        if let Some(reply) = self.reply.take() {
            let items = std::mem::take(&mut self.items);
            let _ = reply.send(outcome.map(|()| items));
        }
    }
}

/// Keeps the first element and cancels upstream.
pub(crate) struct FirstConsumer<T> {
    reply: Option<Reply<T>>,
}

impl<T> FirstConsumer<T> {
    pub(crate) fn new(reply: Reply<T>) -> Self {
        Self { reply: Some(reply) }
    }
}

#[async_trait]
impl<T: Send + 'static> Consumer for FirstConsumer<T> {
    type Item = T;

    async fn consume(&mut self, item: Self::Item) -> Result<ControlFlow<()>> {
        if let Some(reply) = self.reply.take() {
            let _ = reply.send(Ok(item));
        }
        Ok(ControlFlow::Break(()))
    }

    async fn finish(&mut self, outcome: Result<()>) {
        if let Some(reply) = self.reply.take() {
            let _ = reply.send(outcome.and(Err(Error::EmptyStream)));
        }
    }
}

/// Runs a callback for every element.
pub(crate) struct ForEachConsumer<T, F> {
    f: Arc<F>,
    reply: Option<Reply<()>>,
    _marker: PhantomData<fn(T)>,
}

impl<T, F> ForEachConsumer<T, F> {
    pub(crate) fn new(f: Arc<F>, reply: Reply<()>) -> Self {
        Self {
            f,
            reply: Some(reply),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T, F> Consumer for ForEachConsumer<T, F>
where
    T: Send + 'static,
    F: Fn(T) + Send + Sync + 'static,
{
    type Item = T;

    async fn consume(&mut self, item: Self::Item) -> Result<ControlFlow<()>> {
        (self.f)(item);
        Ok(ControlFlow::Continue(()))
    }

    async fn finish(&mut self, outcome: Result<()>) {
        if let Some(reply) = self.reply.take() {
            let _ = reply.send(outcome);
        }
    }
}

/// Cancels upstream as soon as it is subscribed.
pub(crate) struct CancelledConsumer<T> {
    _marker: PhantomData<fn(T)>,
}

impl<T> CancelledConsumer<T> {
    pub(crate) fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Consumer for CancelledConsumer<T> {
    type Item = T;

    async fn start(&mut self) -> ControlFlow<()> {
        ControlFlow::Break(())
    }

    async fn consume(&mut self, _item: Self::Item) -> Result<ControlFlow<()>> {
        Ok(ControlFlow::Break(()))
    }

    async fn finish(&mut self, _outcome: Result<()>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seq_reports_items_or_the_failure() {
        let (tx, rx) = oneshot::channel();
        let mut seq = SeqConsumer::new(tx);
        assert_eq!(seq.consume(1).await.unwrap(), ControlFlow::Continue(()));
        assert_eq!(seq.consume(2).await.unwrap(), ControlFlow::Continue(()));
        seq.finish(Ok(())).await;
        assert_eq!(rx.await.unwrap().unwrap(), vec![1, 2]);

        let (tx, rx) = oneshot::channel();
        let mut seq = SeqConsumer::<u8>::new(tx);
        seq.finish(Err(Error::custom("upstream"))).await;
        assert!(rx.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn first_stops_after_one_element() {
        let (tx, rx) = oneshot::channel();
        let mut first = FirstConsumer::new(tx);
        assert_eq!(first.consume("a").await.unwrap(), ControlFlow::Break(()));
        first.finish(Ok(())).await;
        assert_eq!(rx.await.unwrap().unwrap(), "a");
    }

    #[tokio::test]
    async fn first_of_nothing_is_an_error() {
        let (tx, rx) = oneshot::channel();
        let mut first = FirstConsumer::<u8>::new(tx);
        first.finish(Ok(())).await;
        assert!(matches!(rx.await.unwrap(), Err(Error::EmptyStream)));
    }
}
