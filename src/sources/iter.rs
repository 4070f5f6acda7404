//! Cursor-backed sources: iterators and async streams.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};

use crate::error::{Error, Result};
use crate::traits::Producer;

/// Pulls one element from the cursor per production opportunity.
pub(crate) struct IterProducer<I> {
    iter: I,
}

impl<I> IterProducer<I> {
    pub(crate) fn new(iter: I) -> Self {
        Self { iter }
    }
}

#[async_trait]
impl<I> Producer for IterProducer<I>
where
    I: Iterator + Send + 'static,
    I::Item: Send + 'static,
{
    type Item = I::Item;

    async fn produce(&mut self) -> Result<Option<Self::Item>> {
        Ok(self.iter.next())
    }
}

/// Like [`IterProducer`], but an `Err` from the cursor fails the stream.
pub(crate) struct TryIterProducer<I> {
    iter: I,
}

impl<I> TryIterProducer<I> {
    pub(crate) fn new(iter: I) -> Self {
        Self { iter }
    }
}

#[async_trait]
impl<I, T, E> Producer for TryIterProducer<I>
where
    I: Iterator<Item = std::result::Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = T;

    async fn produce(&mut self) -> Result<Option<Self::Item>> {
        self.iter.next().transpose().map_err(Error::generation)
    }
}

pub(crate) struct StreamProducer<T> {
    stream: Pin<Box<dyn Stream<Item = T> + Send>>,
}

impl<T> StreamProducer<T> {
    pub(crate) fn new<St>(stream: St) -> Self
    where
        St: Stream<Item = T> + Send + 'static,
    {
        Self {
            stream: Box::pin(stream),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Producer for StreamProducer<T> {
    type Item = T;

    async fn produce(&mut self) -> Result<Option<Self::Item>> {
        Ok(self.stream.next().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("cursor broke at {0}")]
    struct CursorError(u32);

    #[tokio::test]
    async fn iterator_is_pulled_one_element_at_a_time() {
        let mut producer = IterProducer::new(0..3);
        assert_eq!(producer.produce().await.unwrap(), Some(0));
        assert_eq!(producer.produce().await.unwrap(), Some(1));
        assert_eq!(producer.produce().await.unwrap(), Some(2));
        assert_eq!(producer.produce().await.unwrap(), None);
    }

    #[tokio::test]
    async fn cursor_errors_keep_their_cause() {
        let items = vec![Ok(1), Err(CursorError(2))];
        let mut producer = TryIterProducer::new(items.into_iter());
        assert_eq!(producer.produce().await.unwrap(), Some(1));
        let error = producer.produce().await.unwrap_err();
        let cause = error.cause().unwrap();
        assert_eq!(cause.to_string(), "cursor broke at 2");
    }

    #[tokio::test]
    async fn streams_are_drained_in_order() {
        let mut producer = StreamProducer::new(futures::stream::iter(vec!['a', 'b']));
        assert_eq!(producer.produce().await.unwrap(), Some('a'));
        assert_eq!(producer.produce().await.unwrap(), Some('b'));
        assert_eq!(producer.produce().await.unwrap(), None);
    }
}
