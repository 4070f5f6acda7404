//! Linear operators.
//!
//! Each operator is a [`Processor`] run by its own stage; [`Flow`] wraps it
//! into a graph description with one input and one output.

mod flow;

pub use flow::Flow;

use async_trait::async_trait;

use crate::error::Result;
use crate::traits::Processor;

/// A processor that maps events using a function.
pub struct MapProcessor<F, T, U> {
    f: F,
    _phantom: std::marker::PhantomData<fn(T) -> U>,
}

impl<F, T, U> MapProcessor<F, T, U> {
    /// Create a new map processor
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<F, T, U> Processor for MapProcessor<F, T, U>
where
    F: Fn(T) -> U + Send + Sync + 'static,
    T: Send + 'static,
    U: Send + 'static,
{
    type Input = T;
    type Output = U;

    async fn process(&mut self, item: Self::Input) -> Result<Vec<Self::Output>> {
        Ok(vec![(self.f)(item)])
    }
}

/// A processor that only passes elements satisfying a predicate.
pub struct FilterProcessor<F, T> {
    predicate: F,
    _phantom: std::marker::PhantomData<fn(T)>,
}

impl<F, T> FilterProcessor<F, T> {
    /// Create a new filter processor
    pub fn new(predicate: F) -> Self {
        Self {
            predicate,
            _phantom: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<F, T> Processor for FilterProcessor<F, T>
where
    F: Fn(&T) -> bool + Send + Sync + 'static,
    T: Send + 'static,
{
    type Input = T;
    type Output = T;

    async fn process(&mut self, item: Self::Input) -> Result<Vec<Self::Output>> {
        if (self.predicate)(&item) {
            Ok(vec![item])
        } else {
            Ok(vec![])
        }
    }
}

/// A processor that collects elements into fixed-size batches.
///
/// A shorter final batch is emitted when upstream completes.
pub struct GroupedProcessor<T> {
    size: usize,
    batch: Vec<T>,
}

impl<T> GroupedProcessor<T> {
    /// Create a new grouping processor; a size of zero is treated as one
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            batch: Vec::with_capacity(size),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Processor for GroupedProcessor<T> {
    type Input = T;
    type Output = Vec<T>;

    async fn process(&mut self, item: Self::Input) -> Result<Vec<Self::Output>> {
        self.batch.push(item);

        if self.batch.len() >= self.size {
            let batch = std::mem::replace(&mut self.batch, Vec::with_capacity(self.size));
            Ok(vec![batch])
        } else {
            Ok(vec![])
        }
    }

    async fn finish(&mut self) -> Result<Vec<Self::Output>> {
        if self.batch.is_empty() {
            Ok(vec![])
        } else {
            Ok(vec![std::mem::take(&mut self.batch)])
        }
    }
}

/// A processor that passes the first N elements and then reports itself
/// exhausted, so the stage cancels upstream.
pub struct TakeProcessor<T> {
    remaining: u64,
    _phantom: std::marker::PhantomData<fn(T)>,
}

impl<T> TakeProcessor<T> {
    /// Create a new take processor
    pub fn new(count: u64) -> Self {
        Self {
            remaining: count,
            _phantom: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Processor for TakeProcessor<T> {
    type Input = T;
    type Output = T;

    async fn process(&mut self, item: Self::Input) -> Result<Vec<Self::Output>> {
        if self.remaining > 0 {
            self.remaining -= 1;
            Ok(vec![item])
        } else {
            Ok(vec![])
        }
    }

    fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}
