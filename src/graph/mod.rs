//! Graph descriptions.
//!
//! A description is an arena of stage blueprints plus edge records between
//! their ports. Ports are index pairs into that arena, so composing two
//! descriptions is just appending one arena to the other (shifting the
//! appended indices) and adding edges; nothing is shared between the parts
//! and nothing runs until the description is materialized.

mod builder;
mod keep;

pub use builder::GraphBuilder;
pub use keep::Keep;

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::protocol::{Publisher, StagePublisher, Subscriber};
use crate::stage::StageContext;

pub(crate) type AnyBox = Box<dyn Any + Send>;

/// Location of a port: a stage index in the arena and a slot on that stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PortRef {
    pub(crate) stage: usize,
    pub(crate) slot: usize,
}

impl PortRef {
    fn shifted(self, offset: usize) -> Self {
        Self {
            stage: self.stage + offset,
            slot: self.slot,
        }
    }
}

/// An output port producing elements of type `T`.
///
/// Ports are compared by identity (their position in a graph), never by value.
pub struct Outlet<T> {
    port: PortRef,
    _marker: PhantomData<fn() -> T>,
}

/// An input port consuming elements of type `T`.
pub struct Inlet<T> {
    port: PortRef,
    _marker: PhantomData<fn(T)>,
}

macro_rules! port_impls {
    ($port:ident, $label:literal) => {
        impl<T> $port<T> {
            pub(crate) fn new(stage: usize, slot: usize) -> Self {
                Self {
                    port: PortRef { stage, slot },
                    _marker: PhantomData,
                }
            }

            pub(crate) fn shifted(self, offset: usize) -> Self {
                Self {
                    port: self.port.shifted(offset),
                    _marker: PhantomData,
                }
            }

            pub(crate) fn port(&self) -> PortRef {
                self.port
            }
        }

        impl<T> Clone for $port<T> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<T> Copy for $port<T> {}

        impl<T> PartialEq for $port<T> {
            fn eq(&self, other: &Self) -> bool {
                self.port == other.port
            }
        }

        impl<T> Eq for $port<T> {}

        impl<T> fmt::Debug for $port<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({}.{})", $label, self.port.stage, self.port.slot)
            }
        }
    };
}

port_impls!(Outlet, "Outlet");
port_impls!(Inlet, "Inlet");

/// What the materializer attaches to an outlet's publisher.
pub(crate) enum InletEndpoint<T> {
    /// A stage input: subscribe it.
    Subscriber(Box<dyn Subscriber<T>>),
    /// Hand the publisher itself out as a materialized value.
    Expose(oneshot::Sender<StagePublisher<T>>),
}

/// A stage instantiated for one materialization.
pub(crate) struct CreatedStage {
    /// One `StagePublisher<T>` per outlet slot.
    pub(crate) outlets: Vec<AnyBox>,
    /// One `InletEndpoint<T>` per inlet slot.
    pub(crate) inlets: Vec<AnyBox>,
    pub(crate) materialized: AnyBox,
    pub(crate) task: Option<BoxFuture<'static, ()>>,
}

pub(crate) type StageFactory = Arc<dyn Fn(StageContext) -> CreatedStage + Send + Sync>;

#[derive(Clone)]
pub(crate) struct StageBlueprint {
    pub(crate) name: &'static str,
    pub(crate) inlets: usize,
    pub(crate) outlets: usize,
    pub(crate) factory: StageFactory,
}

type Wire = fn(AnyBox, AnyBox) -> Result<()>;

#[derive(Clone)]
pub(crate) struct Edge {
    pub(crate) from: PortRef,
    pub(crate) to: PortRef,
    pub(crate) wire: Wire,
}

/// Connect a typed publisher to a typed inlet endpoint.
fn wire<T: Send + 'static>(publisher: AnyBox, endpoint: AnyBox) -> Result<()> {
    let publisher = publisher
        .downcast::<StagePublisher<T>>()
        .map_err(|_| Error::custom("outlet does not carry the expected element type"))?;
    let endpoint = endpoint
        .downcast::<InletEndpoint<T>>()
        .map_err(|_| Error::custom("inlet does not carry the expected element type"))?;
    match *endpoint {
        InletEndpoint::Subscriber(subscriber) => publisher.subscribe(subscriber),
        InletEndpoint::Expose(slot) => {
            let _ = slot.send(*publisher);
        }
    }
    Ok(())
}

/// An immutable arena of stage blueprints and the edges between them.
#[derive(Clone, Default)]
pub struct GraphBlueprint {
    stages: Vec<StageBlueprint>,
    edges: Vec<Edge>,
}

impl GraphBlueprint {
    pub(crate) fn from_stage(stage: StageBlueprint) -> Self {
        Self {
            stages: vec![stage],
            edges: Vec::new(),
        }
    }

    /// Append `other` to this arena; returns the offset of its stages.
    pub(crate) fn absorb(&mut self, other: GraphBlueprint) -> usize {
        let offset = self.stages.len();
        self.stages.extend(other.stages);
        self.edges.extend(other.edges.into_iter().map(|edge| Edge {
            from: edge.from.shifted(offset),
            to: edge.to.shifted(offset),
            wire: edge.wire,
        }));
        offset
    }

    /// Record an edge between two ports that composition guarantees are
    /// open and part of this arena.
    pub(crate) fn link<T: Send + 'static>(&mut self, from: Outlet<T>, to: Inlet<T>) {
        self.edges.push(Edge {
            from: from.port(),
            to: to.port(),
            wire: wire::<T>,
        });
    }

    /// Record an edge after checking both ports.
    pub(crate) fn connect<T: Send + 'static>(&mut self, from: Outlet<T>, to: Inlet<T>) -> Result<()> {
        let (out, inp) = (from.port(), to.port());
        let outlet_known = self.stages.get(out.stage).is_some_and(|s| out.slot < s.outlets);
        let inlet_known = self.stages.get(inp.stage).is_some_and(|s| inp.slot < s.inlets);
        if !outlet_known || !inlet_known {
            return Err(Error::UnknownPort);
        }
        if self.edges.iter().any(|e| e.from == out || e.to == inp) {
            return Err(Error::PortAlreadyConnected);
        }
        self.link(from, to);
        Ok(())
    }

    /// Number of stage blueprints in the arena
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Number of connections in the arena
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub(crate) fn stages(&self) -> &[StageBlueprint] {
        &self.stages
    }

    pub(crate) fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Every port that no edge touches, as (stage name, port description).
    pub(crate) fn open_ports(&self) -> Vec<(String, String)> {
        let mut open = Vec::new();
        for (index, stage) in self.stages.iter().enumerate() {
            for slot in 0..stage.inlets {
                let port = PortRef { stage: index, slot };
                if !self.edges.iter().any(|e| e.to == port) {
                    open.push((format!("{}#{index}", stage.name), format!("inlet {slot}")));
                }
            }
            for slot in 0..stage.outlets {
                let port = PortRef { stage: index, slot };
                if !self.edges.iter().any(|e| e.from == port) {
                    open.push((format!("{}#{index}", stage.name), format!("outlet {slot}")));
                }
            }
        }
        open
    }

    /// Reject descriptions that still have open ports.
    pub(crate) fn validate_closed(&self) -> Result<()> {
        match self.open_ports().into_iter().next() {
            Some((stage, port)) => Err(Error::UnconnectedPort { stage, port }),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for GraphBlueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphBlueprint")
            .field(
                "stages",
                &self.stages.iter().map(|s| s.name).collect::<Vec<_>>(),
            )
            .field("edges", &self.edges.len())
            .finish()
    }
}

/// Materialized values of one run, indexed like the arena.
pub(crate) struct MatValues {
    values: Vec<Option<AnyBox>>,
}

impl MatValues {
    pub(crate) fn new(values: Vec<AnyBox>) -> Self {
        Self {
            values: values.into_iter().map(Some).collect(),
        }
    }

    pub(crate) fn take<M: 'static>(&mut self, stage: usize) -> Result<M> {
        let value = self
            .values
            .get_mut(stage)
            .and_then(Option::take)
            .ok_or_else(|| Error::MaterializedValue(format!("stage {stage} has no value")))?;
        value
            .downcast::<M>()
            .map(|boxed| *boxed)
            .map_err(|_| Error::MaterializedValue(format!("stage {stage} has another type")))
    }
}

/// Computes a description's materialized value from the per-stage values,
/// given the arena offset at which the description ended up.
pub(crate) type MatFn<M> = Arc<dyn Fn(&mut MatValues, usize) -> Result<M> + Send + Sync>;

/// The materialized value of the stage at local index 0.
pub(crate) fn stage_value<M: 'static>() -> MatFn<M> {
    Arc::new(|values: &mut MatValues, base: usize| values.take::<M>(base))
}

/// A description that materializes to nothing.
pub(crate) fn no_value() -> MatFn<()> {
    Arc::new(|_: &mut MatValues, _: usize| Ok(()))
}

/// Combine two materialized values; `right` lives `offset` stages after `left`.
pub(crate) fn combine_values<A, B, C, F>(left: MatFn<A>, right: MatFn<B>, offset: usize, f: F) -> MatFn<C>
where
    A: 'static,
    B: 'static,
    C: 'static,
    F: Fn(A, B) -> C + Send + Sync + 'static,
{
    Arc::new(move |values: &mut MatValues, base: usize| {
        let a = left(values, base)?;
        let b = right(values, base + offset)?;
        Ok(f(a, b))
    })
}

/// Post-process a materialized value.
pub(crate) fn map_value<A, B, F>(inner: MatFn<A>, f: F) -> MatFn<B>
where
    A: 'static,
    B: 'static,
    F: Fn(A) -> B + Send + Sync + 'static,
{
    Arc::new(move |values: &mut MatValues, base: usize| inner(values, base).map(&f))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blueprint(name: &'static str, inlets: usize, outlets: usize) -> GraphBlueprint {
        GraphBlueprint::from_stage(StageBlueprint {
            name,
            inlets,
            outlets,
            factory: Arc::new(|_: StageContext| CreatedStage {
                outlets: Vec::new(),
                inlets: Vec::new(),
                materialized: Box::new(()),
                task: None,
            }),
        })
    }

    #[test]
    fn absorb_shifts_ports_and_edges() {
        let mut left = blueprint("a", 0, 1);
        let mut right = blueprint("b", 1, 1);
        right.absorb(blueprint("c", 1, 0));
        right
            .connect(Outlet::<u8>::new(0, 0), Inlet::<u8>::new(1, 0))
            .unwrap();

        let offset = left.absorb(right);
        assert_eq!(offset, 1);
        assert_eq!(left.edges()[0].from, PortRef { stage: 1, slot: 0 });
        assert_eq!(left.edges()[0].to, PortRef { stage: 2, slot: 0 });

        left.connect(Outlet::<u8>::new(0, 0), Inlet::<u8>::new(0, 0).shifted(offset))
            .unwrap();
        assert!(left.open_ports().is_empty());
        assert!(left.validate_closed().is_ok());
    }

    #[test]
    fn connecting_twice_or_out_of_range_fails() {
        let mut graph = blueprint("src", 0, 1);
        graph.absorb(blueprint("sink", 1, 0));
        let out = Outlet::<u8>::new(0, 0);
        let inp = Inlet::<u8>::new(1, 0);

        assert!(matches!(
            graph.connect(out, Inlet::<u8>::new(5, 0)),
            Err(Error::UnknownPort)
        ));
        graph.connect(out, inp).unwrap();
        assert!(matches!(graph.connect(out, inp), Err(Error::PortAlreadyConnected)));
    }

    #[test]
    fn open_ports_are_reported() {
        let graph = blueprint("lonely", 1, 1);
        let err = graph.validate_closed().unwrap_err();
        assert!(matches!(err, Error::UnconnectedPort { ref port, .. } if port == "inlet 0"));
        assert_eq!(graph.open_ports().len(), 2);
    }

    #[test]
    fn ports_compare_by_identity() {
        assert_eq!(Outlet::<u8>::new(1, 0), Outlet::<u8>::new(1, 0));
        assert_ne!(Outlet::<u8>::new(1, 0), Outlet::<u8>::new(1, 1));
        assert_eq!(format!("{:?}", Inlet::<u8>::new(2, 3)), "Inlet(2.3)");
    }

    #[test]
    fn materialized_values_are_combined_by_offset() {
        let mut values = MatValues::new(vec![Box::new(1u32) as AnyBox, Box::new("two")]);
        let both = combine_values(stage_value::<u32>(), stage_value::<&str>(), 1, Keep::both);
        assert_eq!(both(&mut values, 0).unwrap(), (1, "two"));
        assert!(both(&mut values, 0).is_err());
    }
}
