//! Explicit graph assembly for shapes the linear `via`/`to` operators cannot
//! express (fan-in, several sources feeding one junction).

use crate::error::{Error, Result};
use crate::graph::{no_value, GraphBlueprint, Inlet, MatFn, Outlet};
use crate::junctions::FanIn;
use crate::processors::Flow;
use crate::sinks::{RunnableGraph, Sink};
use crate::sources::Source;

/// Assembles descriptions into one graph by explicit port connections.
///
/// Every added part keeps its own stages; the builder's materialized value is
/// `()` unless it was started from a sink with [`GraphBuilder::with_sink`].
///
/// ```rust
/// use flowweld::prelude::*;
///
/// # fn main() -> Result<()> {
/// let (mut b, sink_in) = GraphBuilder::with_sink(Sink::<u32, _>::seq());
/// let left = b.add_source(Source::single(1));
/// let right = b.add_source(Source::single(2));
/// let (merge_in, merge_out) = b.add_fan_in(Merge::new(2));
/// b.connect(left, merge_in[0])?;
/// b.connect(right, merge_in[1])?;
/// b.connect(merge_out, sink_in)?;
/// let graph = b.build_closed();
/// # let _ = graph;
/// # Ok(())
/// # }
/// ```
pub struct GraphBuilder<M = ()> {
    graph: GraphBlueprint,
    mat: MatFn<M>,
}

impl GraphBuilder<()> {
    /// Start an empty graph
    pub fn new() -> Self {
        Self {
            graph: GraphBlueprint::default(),
            mat: no_value(),
        }
    }

    /// Start a graph whose materialized value is that of `sink`
    pub fn with_sink<T, M>(sink: Sink<T, M>) -> (GraphBuilder<M>, Inlet<T>)
    where
        T: Send + 'static,
        M: 'static,
    {
        let mut graph = GraphBlueprint::default();
        let offset = graph.absorb(sink.graph);
        let builder = GraphBuilder {
            graph,
            mat: sink.mat,
        };
        (builder, sink.inlet.shifted(offset))
    }
}

impl Default for GraphBuilder<()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: 'static> GraphBuilder<M> {
    /// Add a source; returns its output port
    pub fn add_source<T: Send + 'static, M2>(&mut self, source: Source<T, M2>) -> Outlet<T> {
        let offset = self.graph.absorb(source.graph);
        source.outlet.shifted(offset)
    }

    /// Add a flow; returns its input and output ports
    pub fn add_flow<I, O, M2>(&mut self, flow: Flow<I, O, M2>) -> (Inlet<I>, Outlet<O>)
    where
        I: Send + 'static,
        O: Send + 'static,
    {
        let offset = self.graph.absorb(flow.graph);
        (flow.inlet.shifted(offset), flow.outlet.shifted(offset))
    }

    /// Add a sink; returns its input port
    pub fn add_sink<T: Send + 'static, M2>(&mut self, sink: Sink<T, M2>) -> Inlet<T> {
        let offset = self.graph.absorb(sink.graph);
        sink.inlet.shifted(offset)
    }

    /// Add a fan-in junction; returns its input ports and its output port
    pub fn add_fan_in<T, U>(&mut self, fan_in: FanIn<T, U>) -> (Vec<Inlet<T>>, Outlet<U>)
    where
        T: Send + 'static,
        U: Send + 'static,
    {
        let offset = self.graph.absorb(fan_in.graph);
        let inlets = fan_in
            .inlets
            .into_iter()
            .map(|inlet| inlet.shifted(offset))
            .collect();
        (inlets, fan_in.outlet.shifted(offset))
    }

    /// Connect an output port to an input port.
    ///
    /// Fails immediately if either port is unknown to this builder or
    /// already connected.
    pub fn connect<T: Send + 'static>(&mut self, from: Outlet<T>, to: Inlet<T>) -> Result<()> {
        self.graph.connect(from, to)
    }

    /// Finish as a source exposing `outlet`. Any other port left open is
    /// reported when the graph is materialized.
    pub fn build_source<T: Send + 'static>(self, outlet: Outlet<T>) -> Result<Source<T, M>> {
        let port = outlet.port();
        let known = self
            .graph
            .stages()
            .get(port.stage)
            .is_some_and(|stage| port.slot < stage.outlets);
        if !known {
            return Err(Error::UnknownPort);
        }
        if self.graph.edges().iter().any(|edge| edge.from == port) {
            return Err(Error::PortAlreadyConnected);
        }
        Ok(Source::from_parts(self.graph, outlet, self.mat))
    }

    /// Finish as a closed graph. Open ports are reported when it is run.
    pub fn build_closed(self) -> RunnableGraph<M> {
        RunnableGraph::from_parts(self.graph, self.mat)
    }
}
