//! Sources: graph descriptions with exactly one open output.
//!
//! Every constructor here only builds a description. Nothing is generated
//! until the description is materialized, and every materialization gets
//! fresh generator state.

mod iter;
mod maybe;
mod simple;
mod unfold;

pub use maybe::{MaybeHandle, MaybeOutcome};

use std::future::Future;
use std::sync::Arc;

use futures::{FutureExt, Stream};

use crate::error::{Error, Result};
use crate::graph::{
    combine_values, map_value, no_value, stage_value, AnyBox, CreatedStage, GraphBlueprint, Keep, MatFn,
    Outlet, StageBlueprint, StageFactory,
};
use crate::junctions::{FanIn, Merge};
use crate::materializer::Materializer;
use crate::processors::Flow;
use crate::sinks::{RunnableGraph, Sink};
use crate::stage::outbound::Outbound;
use crate::stage::producer::run_producer;
use crate::stage::StageContext;
use crate::traits::Producer;

use self::iter::{IterProducer, StreamProducer, TryIterProducer};
use self::maybe::MaybeProducer;
use self::simple::{EmptyProducer, FailedProducer, RepeatProducer, SingleProducer};
use self::unfold::{UnfoldAsyncProducer, UnfoldProducer};

/// A description with one open output producing `T`, materializing to `M`.
pub struct Source<T, M = ()> {
    pub(crate) graph: GraphBlueprint,
    pub(crate) outlet: Outlet<T>,
    pub(crate) mat: MatFn<M>,
}

impl<T, M> Clone for Source<T, M> {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            outlet: self.outlet,
            mat: self.mat.clone(),
        }
    }
}

impl<T, M> std::fmt::Debug for Source<T, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("graph", &self.graph)
            .field("outlet", &self.outlet)
            .finish()
    }
}

/// A single-stage source driven by the producer `make` builds per run.
pub(crate) fn from_producer_mat<P, M, F>(name: &'static str, make: F) -> Source<P::Item, M>
where
    P: Producer,
    M: Send + 'static,
    F: Fn(&StageContext) -> (P, M) + Send + Sync + 'static,
{
    let factory: StageFactory = Arc::new(move |ctx: StageContext| {
        let (producer, value) = make(&ctx);
        let (publisher, outbound) = Outbound::<P::Item>::channel(ctx.name_arc());
        CreatedStage {
            outlets: vec![Box::new(publisher) as AnyBox],
            inlets: Vec::new(),
            materialized: Box::new(value),
            task: Some(run_producer(producer, outbound, ctx).boxed()),
        }
    });
    let graph = GraphBlueprint::from_stage(StageBlueprint {
        name,
        inlets: 0,
        outlets: 1,
        factory,
    });
    Source::from_parts(graph, Outlet::new(0, 0), stage_value::<M>())
}

impl<T: Send + 'static> Source<T, ()> {
    /// Emit `value` once, then complete.
    pub fn single(value: T) -> Self
    where
        T: Clone + Sync,
    {
        from_producer_mat("single", move |_: &StageContext| {
            (SingleProducer::new(value.clone()), ())
        })
    }

    /// Complete as soon as a subscriber attaches, before any demand.
    pub fn empty() -> Self {
        from_producer_mat("empty", |_: &StageContext| (EmptyProducer::<T>::new(), ()))
    }

    /// Fail with `error` as soon as a subscriber attaches, before any demand.
    pub fn failed(error: Error) -> Self {
        from_producer_mat("failed", move |_: &StageContext| {
            (FailedProducer::<T>::new(error.clone()), ())
        })
    }

    /// Emit clones of `value` forever, never more than requested.
    pub fn repeat(value: T) -> Self
    where
        T: Clone + Sync,
    {
        from_producer_mat("repeat", move |_: &StageContext| {
            (RepeatProducer::new(value.clone()), ())
        })
    }

    /// Generate elements from a state.
    ///
    /// `step` returns the next state and the element to emit, or `None` to
    /// complete the stream.
    ///
    /// ```rust
    /// use flowweld::prelude::*;
    ///
    /// let countdown = Source::unfold(3u32, |n| (n > 0).then(|| (n - 1, n)));
    /// # let _ = countdown;
    /// ```
    pub fn unfold<S, F>(seed: S, step: F) -> Self
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(S) -> Option<(S, T)> + Send + Sync + 'static,
    {
        Self::try_unfold(seed, move |state| Ok(step(state)))
    }

    /// Like [`Source::unfold`], but an `Err` from `step` fails the stream.
    pub fn try_unfold<S, F>(seed: S, step: F) -> Self
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(S) -> Result<Option<(S, T)>> + Send + Sync + 'static,
    {
        let step = Arc::new(step);
        from_producer_mat("unfold", move |_: &StageContext| {
            (UnfoldProducer::new(seed.clone(), step.clone()), ())
        })
    }

    /// Generate elements from a state with an asynchronous step.
    ///
    /// No element is emitted while a step is pending, and the next step only
    /// starts once the previous one has resolved.
    pub fn unfold_async<S, F, Fut>(seed: S, step: F) -> Self
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(S) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<(S, T)>> + Send + 'static,
    {
        Self::try_unfold_async(seed, move |state| step(state).map(Ok))
    }

    /// Like [`Source::unfold_async`], but an `Err` from `step` fails the stream.
    pub fn try_unfold_async<S, F, Fut>(seed: S, step: F) -> Self
    where
        S: Clone + Send + Sync + 'static,
        F: Fn(S) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<(S, T)>>> + Send + 'static,
    {
        let step = Arc::new(step);
        from_producer_mat("unfold-async", move |_: &StageContext| {
            (UnfoldAsyncProducer::new(seed.clone(), step.clone()), ())
        })
    }

    /// Pull elements from the iterator `factory` creates for each run.
    pub fn from_iterator<I, F>(factory: F) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
        F: Fn() -> I + Send + Sync + 'static,
    {
        from_producer_mat("from-iterator", move |_: &StageContext| {
            (IterProducer::new(factory().into_iter()), ())
        })
    }

    /// Like [`Source::from_iterator`]; an `Err` element fails the stream.
    pub fn try_from_iterator<I, E, F>(factory: F) -> Self
    where
        I: IntoIterator<Item = std::result::Result<T, E>>,
        I::IntoIter: Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
        F: Fn() -> I + Send + Sync + 'static,
    {
        from_producer_mat("from-iterator", move |_: &StageContext| {
            (TryIterProducer::new(factory().into_iter()), ())
        })
    }

    /// Drain the stream `factory` creates for each run.
    pub fn from_stream<St, F>(factory: F) -> Self
    where
        St: Stream<Item = T> + Send + 'static,
        F: Fn() -> St + Send + Sync + 'static,
    {
        from_producer_mat("from-stream", move |_: &StageContext| {
            (StreamProducer::new(factory()), ())
        })
    }

    /// Run a custom [`Producer`], created fresh for each run.
    pub fn from_producer<P, F>(factory: F) -> Self
    where
        P: Producer<Item = T>,
        F: Fn() -> P + Send + Sync + 'static,
    {
        from_producer_mat("producer", move |_: &StageContext| (factory(), ()))
    }

    /// Connect two or more sources to one fan-in junction built by
    /// `strategy` and expose the junction's output.
    ///
    /// The materialized values of the inputs are dropped. `strategy`
    /// receives the number of sources. A junction with fewer
    /// inputs than sources (or more) leaves ports open, which materialization
    /// reports as [`Error::UnconnectedPort`].
    ///
    /// ```rust
    /// use flowweld::prelude::*;
    ///
    /// let merged = Source::combine(
    ///     Source::single(1),
    ///     Source::single(2),
    ///     vec![Source::single(3)],
    ///     Merge::new,
    /// );
    /// # let _ = merged;
    /// ```
    pub fn combine<In, M1, M2, S>(
        first: Source<In, M1>,
        second: Source<In, M2>,
        rest: Vec<Source<In>>,
        strategy: S,
    ) -> Self
    where
        In: Send + 'static,
        M1: 'static,
        M2: 'static,
        S: FnOnce(usize) -> FanIn<In, T>,
    {
        let junction = strategy(2 + rest.len());
        let mut graph = junction.graph;
        let mut inlets = junction.inlets.into_iter();

        let shapes = [first.into_shape(), second.into_shape()]
            .into_iter()
            .chain(rest.into_iter().map(Source::into_shape));
        for (source, outlet) in shapes {
            let offset = graph.absorb(source);
            if let Some(inlet) = inlets.next() {
                graph.link(outlet.shifted(offset), inlet);
            }
        }
        Source::from_parts(graph, junction.outlet, no_value())
    }

    /// A source completed from outside through its materialized handle.
    ///
    /// Cancelling the stream before the handle is resolved resolves it as
    /// [`MaybeOutcome::Empty`]; a stage failure resolves it as
    /// [`MaybeOutcome::Failed`].
    pub fn maybe() -> Source<T, MaybeHandle<T>>
    where
        T: Sync,
    {
        from_producer_mat("maybe", |ctx: &StageContext| {
            MaybeProducer::new(ctx.cancellation().clone())
        })
    }
}

impl<T: Send + 'static, M: 'static> Source<T, M> {
    pub(crate) fn from_parts(graph: GraphBlueprint, outlet: Outlet<T>, mat: MatFn<M>) -> Self {
        Self { graph, outlet, mat }
    }

    fn into_shape(self) -> (GraphBlueprint, Outlet<T>) {
        (self.graph, self.outlet)
    }

    /// Attach a flow, keeping this source's materialized value
    pub fn via<U, M2>(self, flow: Flow<T, U, M2>) -> Source<U, M>
    where
        U: Send + 'static,
        M2: 'static,
    {
        self.via_mat(flow, Keep::left)
    }

    /// Attach a flow, combining both materialized values with `combine`
    pub fn via_mat<U, M2, M3, F>(self, flow: Flow<T, U, M2>, combine: F) -> Source<U, M3>
    where
        U: Send + 'static,
        M2: 'static,
        M3: 'static,
        F: Fn(M, M2) -> M3 + Send + Sync + 'static,
    {
        let mut graph = self.graph;
        let offset = graph.absorb(flow.graph);
        graph.link(self.outlet, flow.inlet.shifted(offset));
        Source::from_parts(
            graph,
            flow.outlet.shifted(offset),
            combine_values(self.mat, flow.mat, offset, combine),
        )
    }

    /// Attach a sink, keeping this source's materialized value
    pub fn to<M2: 'static>(self, sink: Sink<T, M2>) -> RunnableGraph<M> {
        self.to_mat(sink, Keep::left)
    }

    /// Attach a sink, combining both materialized values with `combine`
    pub fn to_mat<M2, M3, F>(self, sink: Sink<T, M2>, combine: F) -> RunnableGraph<M3>
    where
        M2: 'static,
        M3: 'static,
        F: Fn(M, M2) -> M3 + Send + Sync + 'static,
    {
        let mut graph = self.graph;
        let offset = graph.absorb(sink.graph);
        graph.link(self.outlet, sink.inlet.shifted(offset));
        RunnableGraph::from_parts(graph, combine_values(self.mat, sink.mat, offset, combine))
    }

    /// Attach `sink` and run the result, returning the sink's materialized value
    pub fn run_with<M2: 'static>(self, sink: Sink<T, M2>, materializer: &Materializer) -> Result<M2> {
        self.to_mat(sink, Keep::right).run(materializer)
    }

    /// Transform the materialized value
    pub fn map_materialized_value<M2, F>(self, f: F) -> Source<T, M2>
    where
        M2: 'static,
        F: Fn(M) -> M2 + Send + Sync + 'static,
    {
        Source::from_parts(self.graph, self.outlet, map_value(self.mat, f))
    }

    /// Transform every element
    pub fn map<U, F>(self, f: F) -> Source<U, M>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.via(Flow::map(f))
    }

    /// Keep only the elements matching `predicate`
    pub fn filter<F>(self, predicate: F) -> Source<T, M>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.via(Flow::filter(predicate))
    }

    /// Emit at most `n` elements, then cancel upstream and complete
    pub fn take(self, n: u64) -> Source<T, M> {
        self.via(Flow::take(n))
    }

    /// Collect elements into batches of `size`; the last batch may be shorter
    pub fn grouped(self, size: usize) -> Source<Vec<T>, M> {
        self.via(Flow::grouped(size))
    }

    /// Merge with `other`, keeping this source's materialized value.
    pub fn merge<M2>(self, other: Source<T, M2>) -> Source<T, M> {
        let junction = Merge::new::<T>(2);
        let mut graph = self.graph;
        let other_offset = graph.absorb(other.graph);
        let junction_offset = graph.absorb(junction.graph);
        let mut inlets = junction
            .inlets
            .into_iter()
            .map(|inlet| inlet.shifted(junction_offset));
        if let (Some(left), Some(right)) = (inlets.next(), inlets.next()) {
            graph.link(self.outlet, left);
            graph.link(other.outlet.shifted(other_offset), right);
        }
        Source::from_parts(graph, junction.outlet.shifted(junction_offset), self.mat)
    }
}
