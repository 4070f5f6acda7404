use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;

use crate::graph::{
    combine_values, map_value, stage_value, AnyBox, CreatedStage, GraphBlueprint, InletEndpoint, Inlet,
    Keep, MatFn, Outlet, StageBlueprint, StageFactory,
};
use crate::processors::{FilterProcessor, GroupedProcessor, MapProcessor, TakeProcessor};
use crate::sinks::Sink;
use crate::stage::inbound::{InletSubscriber, SignalReceiver, SignalSender};
use crate::stage::outbound::Outbound;
use crate::stage::processor::run_processor;
use crate::stage::StageContext;
use crate::traits::Processor;

/// A description with one open input and one open output.
pub struct Flow<In, Out, M = ()> {
    pub(crate) graph: GraphBlueprint,
    pub(crate) inlet: Inlet<In>,
    pub(crate) outlet: Outlet<Out>,
    pub(crate) mat: MatFn<M>,
}

impl<In, Out, M> Clone for Flow<In, Out, M> {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            inlet: self.inlet,
            outlet: self.outlet,
            mat: self.mat.clone(),
        }
    }
}

impl<In, Out, M> std::fmt::Debug for Flow<In, Out, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flow")
            .field("graph", &self.graph)
            .field("inlet", &self.inlet)
            .field("outlet", &self.outlet)
            .finish()
    }
}

fn from_processor_mat<P, M, F>(name: &'static str, make: F) -> Flow<P::Input, P::Output, M>
where
    P: Processor,
    M: Send + 'static,
    F: Fn(&StageContext) -> (P, M) + Send + Sync + 'static,
{
    let factory: StageFactory = Arc::new(move |ctx: StageContext| {
        let (processor, value) = make(&ctx);
        let (mailbox_tx, mailbox): (SignalSender<P::Input>, SignalReceiver<P::Input>) =
            mpsc::unbounded_channel();
        let endpoint =
            InletEndpoint::<P::Input>::Subscriber(Box::new(InletSubscriber::new(0, mailbox_tx)));
        let (publisher, outbound) = Outbound::<P::Output>::channel(ctx.name_arc());
        CreatedStage {
            outlets: vec![Box::new(publisher) as AnyBox],
            inlets: vec![Box::new(endpoint) as AnyBox],
            materialized: Box::new(value),
            task: Some(run_processor(processor, mailbox, outbound, ctx).boxed()),
        }
    });
    let graph = GraphBlueprint::from_stage(StageBlueprint {
        name,
        inlets: 1,
        outlets: 1,
        factory,
    });
    Flow::from_parts(graph, Inlet::new(0, 0), Outlet::new(0, 0), stage_value::<M>())
}

impl<In: Send + 'static, Out: Send + 'static> Flow<In, Out, ()> {
    /// Run a custom [`Processor`], created fresh for each run
    pub fn from_processor<P, F>(factory: F) -> Self
    where
        P: Processor<Input = In, Output = Out>,
        F: Fn() -> P + Send + Sync + 'static,
    {
        from_processor_mat("processor", move |_: &StageContext| (factory(), ()))
    }

    /// Transform every element with `f`
    pub fn map<F>(f: F) -> Self
    where
        F: Fn(In) -> Out + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        from_processor_mat("map", move |_: &StageContext| {
            let f = f.clone();
            (MapProcessor::new(move |item: In| f(item)), ())
        })
    }
}

impl<T: Send + 'static> Flow<T, T, ()> {
    /// Pass only the elements matching `predicate`
    pub fn filter<F>(predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        from_processor_mat("filter", move |_: &StageContext| {
            let predicate = predicate.clone();
            (FilterProcessor::new(move |item: &T| predicate(item)), ())
        })
    }

    /// Pass the first `n` elements, then cancel upstream and complete
    pub fn take(n: u64) -> Self {
        from_processor_mat("take", move |_: &StageContext| (TakeProcessor::new(n), ()))
    }
}

impl<T: Send + 'static> Flow<T, Vec<T>, ()> {
    /// Collect elements into batches of `size`
    pub fn grouped(size: usize) -> Self {
        from_processor_mat("grouped", move |_: &StageContext| {
            (GroupedProcessor::new(size), ())
        })
    }
}

impl<In: Send + 'static, Out: Send + 'static, M: 'static> Flow<In, Out, M> {
    pub(crate) fn from_parts(
        graph: GraphBlueprint,
        inlet: Inlet<In>,
        outlet: Outlet<Out>,
        mat: MatFn<M>,
    ) -> Self {
        Self {
            graph,
            inlet,
            outlet,
            mat,
        }
    }

    /// Append another flow, keeping this flow's materialized value
    pub fn via<Next, M2>(self, next: Flow<Out, Next, M2>) -> Flow<In, Next, M>
    where
        Next: Send + 'static,
        M2: 'static,
    {
        self.via_mat(next, Keep::left)
    }

    /// Append another flow, combining both materialized values
    pub fn via_mat<Next, M2, M3, F>(self, next: Flow<Out, Next, M2>, combine: F) -> Flow<In, Next, M3>
    where
        Next: Send + 'static,
        M2: 'static,
        M3: 'static,
        F: Fn(M, M2) -> M3 + Send + Sync + 'static,
    {
        let mut graph = self.graph;
        let offset = graph.absorb(next.graph);
        graph.link(self.outlet, next.inlet.shifted(offset));
        Flow::from_parts(
            graph,
            self.inlet,
            next.outlet.shifted(offset),
            combine_values(self.mat, next.mat, offset, combine),
        )
    }

    /// Terminate with a sink, keeping this flow's materialized value
    pub fn to<M2: 'static>(self, sink: Sink<Out, M2>) -> Sink<In, M> {
        self.to_mat(sink, Keep::left)
    }

    /// Terminate with a sink, combining both materialized values
    pub fn to_mat<M2, M3, F>(self, sink: Sink<Out, M2>, combine: F) -> Sink<In, M3>
    where
        M2: 'static,
        M3: 'static,
        F: Fn(M, M2) -> M3 + Send + Sync + 'static,
    {
        let mut graph = self.graph;
        let offset = graph.absorb(sink.graph);
        graph.link(self.outlet, sink.inlet.shifted(offset));
        Sink::from_parts(
            graph,
            self.inlet,
            combine_values(self.mat, sink.mat, offset, combine),
        )
    }

    /// Transform the materialized value
    pub fn map_materialized_value<M2, F>(self, f: F) -> Flow<In, Out, M2>
    where
        M2: 'static,
        F: Fn(M) -> M2 + Send + Sync + 'static,
    {
        Flow::from_parts(self.graph, self.inlet, self.outlet, map_value(self.mat, f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composing_flows_appends_stages_and_links_them() {
        let flow = Flow::map(|n: u32| n + 1)
            .via(Flow::filter(|n: &u32| n % 2 == 0))
            .via(Flow::grouped(3));
        assert_eq!(flow.graph.stage_count(), 3);
        assert_eq!(flow.graph.edge_count(), 2);
        assert_eq!(flow.inlet, Inlet::new(0, 0));
        assert_eq!(flow.outlet, Outlet::new(2, 0));
    }
}
