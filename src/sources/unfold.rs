//! Stateful generators.
//!
//! Both variants walk the same state machine: the seed sits in `Idle`, a
//! step moves it to `AwaitingStep` until the step's result is known, and the
//! result either stores the next state back in `Idle` or ends the generator.
//! A state is never reused once its step has been started.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::traits::Producer;

enum UnfoldState<S> {
    Idle(S),
    AwaitingStep,
    Completed,
    Failed(Error),
}

impl<S> UnfoldState<S> {
    /// Start a step: hand out the current state, or report why there is none.
    fn begin(&mut self) -> std::result::Result<S, Result<Option<()>>> {
        match std::mem::replace(self, UnfoldState::AwaitingStep) {
            UnfoldState::Idle(state) => Ok(state),
            UnfoldState::Completed => {
                *self = UnfoldState::Completed;
                Err(Ok(None))
            }
            UnfoldState::Failed(error) => {
                *self = UnfoldState::Failed(error.clone());
                Err(Err(error))
            }
            UnfoldState::AwaitingStep => Err(Err(Error::custom(
                "unfold step started while the previous one is still pending",
            ))),
        }
    }

    /// Record a step's result.
    fn resolve<T>(&mut self, result: Result<Option<(S, T)>>) -> Result<Option<T>> {
        match result {
            Ok(Some((next, element))) => {
                *self = UnfoldState::Idle(next);
                Ok(Some(element))
            }
            Ok(None) => {
                *self = UnfoldState::Completed;
                Ok(None)
            }
            Err(error) => {
                *self = UnfoldState::Failed(error.clone());
                Err(error)
            }
        }
    }
}

pub(crate) struct UnfoldProducer<S, F> {
    state: UnfoldState<S>,
    step: Arc<F>,
}

impl<S, F> UnfoldProducer<S, F> {
    pub(crate) fn new(seed: S, step: Arc<F>) -> Self {
        Self {
            state: UnfoldState::Idle(seed),
            step,
        }
    }
}

#[async_trait]
impl<S, T, F> Producer for UnfoldProducer<S, F>
where
    S: Send + 'static,
    T: Send + 'static,
    F: Fn(S) -> Result<Option<(S, T)>> + Send + Sync + 'static,
{
    type Item = T;

    async fn produce(&mut self) -> Result<Option<Self::Item>> {
        let state = match self.state.begin() {
            Ok(state) => state,
            Err(Ok(_)) => return Ok(None),
            Err(Err(error)) => return Err(error),
        };
        let result = (self.step)(state);
        self.state.resolve(result)
    }
}

pub(crate) struct UnfoldAsyncProducer<S, F> {
    state: UnfoldState<S>,
    step: Arc<F>,
}

impl<S, F> UnfoldAsyncProducer<S, F> {
    pub(crate) fn new(seed: S, step: Arc<F>) -> Self {
        Self {
            state: UnfoldState::Idle(seed),
            step,
        }
    }
}

#[async_trait]
impl<S, T, F, Fut> Producer for UnfoldAsyncProducer<S, F>
where
    S: Send + 'static,
    T: Send + 'static,
    F: Fn(S) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<(S, T)>>> + Send + 'static,
{
    type Item = T;

    async fn produce(&mut self) -> Result<Option<Self::Item>> {
        let state = match self.state.begin() {
            Ok(state) => state,
            Err(Ok(_)) => return Ok(None),
            Err(Err(error)) => return Err(error),
        };
        let pending = (self.step)(state);
        let result = pending.await;
        self.state.resolve(result)
    }
}
