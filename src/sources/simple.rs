//! Sources that need no generation state beyond a single value.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::traits::Producer;

/// Emits its value once. Completion does not wait for further demand.
pub(crate) struct SingleProducer<T> {
    value: Option<T>,
}

impl<T> SingleProducer<T> {
    pub(crate) fn new(value: T) -> Self {
        Self { value: Some(value) }
    }
}

#[async_trait]
impl<T: Send + 'static> Producer for SingleProducer<T> {
    type Item = T;

    async fn produce(&mut self) -> Result<Option<Self::Item>> {
        Ok(self.value.take())
    }

    async fn await_termination(&mut self) -> Result<()> {
        if self.value.is_none() {
            return Ok(());
        }
        std::future::pending().await
    }
}

/// Completes as soon as a subscriber is attached.
pub(crate) struct EmptyProducer<T> {
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> EmptyProducer<T> {
    pub(crate) fn new() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Producer for EmptyProducer<T> {
    type Item = T;

    async fn produce(&mut self) -> Result<Option<Self::Item>> {
        Ok(None)
    }

    async fn await_termination(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Fails as soon as a subscriber is attached.
pub(crate) struct FailedProducer<T> {
    error: Error,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> FailedProducer<T> {
    pub(crate) fn new(error: Error) -> Self {
        Self {
            error,
            _marker: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Producer for FailedProducer<T> {
    type Item = T;

    async fn produce(&mut self) -> Result<Option<Self::Item>> {
        Err(self.error.clone())
    }

    async fn await_termination(&mut self) -> Result<()> {
        Err(self.error.clone())
    }
}

/// Emits clones of one value for as long as there is demand.
pub(crate) struct RepeatProducer<T> {
    value: T,
}

impl<T> RepeatProducer<T> {
    pub(crate) fn new(value: T) -> Self {
        Self { value }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Producer for RepeatProducer<T> {
    type Item = T;

    async fn produce(&mut self) -> Result<Option<Self::Item>> {
        Ok(Some(self.value.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn single_yields_once_then_may_terminate() {
        let mut single = SingleProducer::new("v");
        assert_eq!(single.produce().await.unwrap(), Some("v"));
        assert!(single.await_termination().await.is_ok());
        assert_eq!(single.produce().await.unwrap(), None);
    }

    #[tokio::test]
    async fn single_waits_for_demand_before_emitting() {
        let mut single = SingleProducer::new(1u8);
        let waiting = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            single.await_termination(),
        )
        .await;
        assert!(waiting.is_err());
    }

    #[tokio::test]
    async fn failed_reports_the_same_error_every_time() {
        let mut failed = FailedProducer::<u8>::new(Error::custom("boom"));
        assert!(matches!(failed.await_termination().await, Err(Error::Custom(m)) if m == "boom"));
        assert!(matches!(failed.produce().await, Err(Error::Custom(m)) if m == "boom"));
    }

    #[tokio::test]
    async fn repeat_never_runs_dry() {
        let mut repeat = RepeatProducer::new(7);
        for _ in 0..1000 {
            assert_eq!(repeat.produce().await.unwrap(), Some(7));
        }
    }
}
