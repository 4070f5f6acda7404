//! Sinks: graph descriptions with exactly one open input, and the closed
//! graphs they produce.

mod consumers;

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::graph::{
    map_value, stage_value, AnyBox, CreatedStage, GraphBlueprint, Inlet, InletEndpoint,
    MatFn, MatValues, StageBlueprint, StageFactory,
};
use crate::materializer::Materializer;
use crate::protocol::{StagePublisher, Subscriber};
use crate::stage::consumer::run_consumer;
use crate::stage::inbound::{InletSubscriber, SignalReceiver, SignalSender};
use crate::stage::StageContext;
use crate::testing::SubscriberProbe;
use crate::traits::Consumer;

use self::consumers::{CancelledConsumer, FirstConsumer, ForEachConsumer, SeqConsumer};

/// Resolves once the stream ends for a sink.
///
/// A sink stage that stops without reporting (its runtime was shut down
/// under it) resolves the completion with [`Error::AbruptTermination`].
pub type Completion<T> = BoxFuture<'static, Result<T>>;

fn completion<T: Send + 'static>() -> (oneshot::Sender<Result<T>>, Completion<T>) {
    let (tx, rx) = oneshot::channel();
    let completion = async move { rx.await.unwrap_or_else(|closed| Err(closed.into())) }.boxed();
    (tx, completion)
}

/// A description with one open input consuming `T`, materializing to `M`.
pub struct Sink<T, M = ()> {
    pub(crate) graph: GraphBlueprint,
    pub(crate) inlet: Inlet<T>,
    pub(crate) mat: MatFn<M>,
}

impl<T, M> Clone for Sink<T, M> {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            inlet: self.inlet,
            mat: self.mat.clone(),
        }
    }
}

impl<T, M> std::fmt::Debug for Sink<T, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sink")
            .field("graph", &self.graph)
            .field("inlet", &self.inlet)
            .finish()
    }
}

fn single_inlet_stage(name: &'static str, factory: StageFactory) -> GraphBlueprint {
    GraphBlueprint::from_stage(StageBlueprint {
        name,
        inlets: 1,
        outlets: 0,
        factory,
    })
}

/// A single-stage sink driven by the consumer `make` builds per run.
fn from_consumer_mat<C, M, F>(name: &'static str, make: F) -> Sink<C::Item, M>
where
    C: Consumer,
    M: Send + 'static,
    F: Fn(&StageContext) -> (C, M) + Send + Sync + 'static,
{
    let factory: StageFactory = Arc::new(move |ctx: StageContext| {
        let (consumer, value) = make(&ctx);
        let (mailbox_tx, mailbox): (SignalSender<C::Item>, SignalReceiver<C::Item>) =
            mpsc::unbounded_channel();
        let endpoint =
            InletEndpoint::<C::Item>::Subscriber(Box::new(InletSubscriber::new(0, mailbox_tx)));
        CreatedStage {
            outlets: Vec::new(),
            inlets: vec![Box::new(endpoint) as AnyBox],
            materialized: Box::new(value),
            task: Some(run_consumer(consumer, mailbox, ctx).boxed()),
        }
    });
    Sink::from_parts(
        single_inlet_stage(name, factory),
        Inlet::new(0, 0),
        stage_value::<M>(),
    )
}

/// A task-less sink whose input is handed straight to a subscriber.
fn from_subscriber_mat<T, M, F>(name: &'static str, make: F) -> Sink<T, M>
where
    T: Send + 'static,
    M: Send + 'static,
    F: Fn() -> (Box<dyn Subscriber<T>>, M) + Send + Sync + 'static,
{
    let factory: StageFactory = Arc::new(move |_: StageContext| {
        let (subscriber, value) = make();
        CreatedStage {
            outlets: Vec::new(),
            inlets: vec![Box::new(InletEndpoint::Subscriber(subscriber)) as AnyBox],
            materialized: Box::new(value),
            task: None,
        }
    });
    Sink::from_parts(
        single_inlet_stage(name, factory),
        Inlet::new(0, 0),
        stage_value::<M>(),
    )
}

impl<T: Send + 'static> Sink<T, Completion<Vec<T>>> {
    /// Collect every element; resolves with all of them once upstream completes
    pub fn seq() -> Self {
        from_consumer_mat("seq", |_: &StageContext| {
            let (reply, done) = completion();
            (SeqConsumer::new(reply), done)
        })
    }
}

impl<T: Send + 'static> Sink<T, Completion<T>> {
    /// Resolve with the first element and cancel upstream.
    ///
    /// An empty stream resolves with [`Error::EmptyStream`].
    pub fn first() -> Self {
        from_consumer_mat("first", |_: &StageContext| {
            let (reply, done) = completion();
            (FirstConsumer::new(reply), done)
        })
    }
}

impl<T: Send + 'static> Sink<T, Completion<()>> {
    /// Drop every element; resolves when upstream terminates
    pub fn ignore() -> Self {
        Self::for_each(|_| {})
    }

    /// Run `f` on every element
    pub fn for_each<F>(f: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        from_consumer_mat("for-each", move |_: &StageContext| {
            let (reply, done) = completion();
            (ForEachConsumer::new(f.clone(), reply), done)
        })
    }
}

impl<T: Send + 'static> Sink<T, ()> {
    /// Cancel upstream immediately, without requesting anything
    pub fn cancelled() -> Self {
        from_consumer_mat("cancelled", |_: &StageContext| (CancelledConsumer::new(), ()))
    }

    /// Run a custom [`Consumer`], created fresh for each run
    pub fn from_consumer<C, F>(factory: F) -> Self
    where
        C: Consumer<Item = T>,
        F: Fn() -> C + Send + Sync + 'static,
    {
        from_consumer_mat("consumer", move |_: &StageContext| (factory(), ()))
    }
}

impl<T: Send + 'static> Sink<T, StagePublisher<T>> {
    /// Expose the upstream stage's publisher as the materialized value.
    ///
    /// The publisher accepts exactly one subscriber; every later attempt is
    /// failed with [`Error::AlreadySubscribed`].
    pub fn as_publisher() -> Self {
        let factory: StageFactory = Arc::new(|_: StageContext| {
            let (slot, publisher) = oneshot::channel::<StagePublisher<T>>();
            CreatedStage {
                outlets: Vec::new(),
                inlets: vec![Box::new(InletEndpoint::Expose(slot)) as AnyBox],
                materialized: Box::new(publisher),
                task: None,
            }
        });
        let mat: MatFn<StagePublisher<T>> = Arc::new(|values: &mut MatValues, base: usize| {
            let mut publisher: oneshot::Receiver<StagePublisher<T>> = values.take(base)?;
            publisher
                .try_recv()
                .map_err(|_| Error::MaterializedValue("publisher was never wired".to_string()))
        });
        Sink::from_parts(single_inlet_stage("publisher", factory), Inlet::new(0, 0), mat)
    }
}

impl<T: Send + 'static> Sink<T, SubscriberProbe<T>> {
    /// A sink driven manually from a test through its [`SubscriberProbe`]
    pub fn probe() -> Self {
        from_subscriber_mat("probe", || {
            let (subscriber, probe) = SubscriberProbe::pair();
            (Box::new(subscriber) as Box<dyn Subscriber<T>>, probe)
        })
    }
}

impl<T: Send + 'static, M: 'static> Sink<T, M> {
    pub(crate) fn from_parts(graph: GraphBlueprint, inlet: Inlet<T>, mat: MatFn<M>) -> Self {
        Self { graph, inlet, mat }
    }

    /// Transform the materialized value
    pub fn map_materialized_value<M2, F>(self, f: F) -> Sink<T, M2>
    where
        M2: 'static,
        F: Fn(M) -> M2 + Send + Sync + 'static,
    {
        Sink::from_parts(self.graph, self.inlet, map_value(self.mat, f))
    }
}

/// A closed description, ready to run.
///
/// Running it twice starts two independent sets of stages.
pub struct RunnableGraph<M = ()> {
    graph: GraphBlueprint,
    mat: MatFn<M>,
}

impl<M> Clone for RunnableGraph<M> {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            mat: self.mat.clone(),
        }
    }
}

impl<M> std::fmt::Debug for RunnableGraph<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnableGraph")
            .field("graph", &self.graph)
            .finish()
    }
}

impl<M: 'static> RunnableGraph<M> {
    pub(crate) fn from_parts(graph: GraphBlueprint, mat: MatFn<M>) -> Self {
        Self { graph, mat }
    }

    /// Materialize and start every stage, returning the materialized value.
    ///
    /// Fails before any stage starts if a port is left unconnected.
    pub fn run(&self, materializer: &Materializer) -> Result<M> {
        materializer.materialize(&self.graph, &self.mat)
    }

    /// Transform the materialized value
    pub fn map_materialized_value<M2, F>(self, f: F) -> RunnableGraph<M2>
    where
        M2: 'static,
        F: Fn(M) -> M2 + Send + Sync + 'static,
    {
        RunnableGraph::from_parts(self.graph, map_value(self.mat, f))
    }

    /// The underlying arena
    pub fn blueprint(&self) -> &GraphBlueprint {
        &self.graph
    }
}
