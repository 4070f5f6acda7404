//! Fan-in junctions: stages with several inputs and one output.

mod merge;

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;

use crate::graph::{
    AnyBox, CreatedStage, GraphBlueprint, Inlet, InletEndpoint, Outlet, StageBlueprint,
    StageFactory,
};
use crate::stage::inbound::{InletSubscriber, SignalReceiver, SignalSender};
use crate::stage::outbound::Outbound;
use crate::stage::StageContext;

/// A junction description: `inlets` inputs of `T` feeding one output of `U`.
///
/// Add it to a [`GraphBuilder`](crate::graph::GraphBuilder) or pass a
/// constructor such as [`Merge::new`] to
/// [`Source::combine`](crate::sources::Source::combine).
pub struct FanIn<T, U> {
    pub(crate) graph: GraphBlueprint,
    pub(crate) inlets: Vec<Inlet<T>>,
    pub(crate) outlet: Outlet<U>,
}

impl<T, U> FanIn<T, U> {
    /// Number of inputs
    pub fn input_count(&self) -> usize {
        self.inlets.len()
    }
}

impl<T, U> std::fmt::Debug for FanIn<T, U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanIn")
            .field("graph", &self.graph)
            .field("inlets", &self.inlets)
            .field("outlet", &self.outlet)
            .finish()
    }
}

/// Fair fan-in of any number of inputs.
///
/// Inputs are served round-robin. The junction never has more elements
/// requested upstream (or buffered) than it has downstream demand for, and
/// asks each input for at most one element at a time. It completes once every
/// input has completed and fails as soon as any input fails, cancelling the
/// others.
#[derive(Debug, Clone, Copy)]
pub struct Merge;

impl Merge {
    /// A merge junction with `inputs` inputs
    pub fn new<T: Send + 'static>(inputs: usize) -> FanIn<T, T> {
        let factory: StageFactory = Arc::new(move |ctx: StageContext| {
            let (mailbox_tx, mailbox): (SignalSender<T>, SignalReceiver<T>) =
                mpsc::unbounded_channel();
            let inlets = (0..inputs)
                .map(|port| {
                    let subscriber = InletSubscriber::new(port, mailbox_tx.clone());
                    Box::new(InletEndpoint::<T>::Subscriber(Box::new(subscriber))) as AnyBox
                })
                .collect();
            let (publisher, outbound) = Outbound::<T>::channel(ctx.name_arc());
            CreatedStage {
                outlets: vec![Box::new(publisher) as AnyBox],
                inlets,
                materialized: Box::new(()),
                task: Some(merge::run_merge(inputs, mailbox, outbound, ctx).boxed()),
            }
        });
        let graph = GraphBlueprint::from_stage(StageBlueprint {
            name: "merge",
            inlets: inputs,
            outlets: 1,
            factory,
        });
        FanIn {
            graph,
            inlets: (0..inputs).map(|slot| Inlet::new(0, slot)).collect(),
            outlet: Outlet::new(0, 0),
        }
    }
}
