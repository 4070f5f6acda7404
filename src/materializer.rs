//! Turns graph descriptions into running stages.
//!
//! Materialization is synchronous and all-or-nothing: the description is
//! validated, every stage is instantiated and every edge wired before a single
//! stage task is spawned, so a composition error never leaves half a graph
//! running.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, error, Instrument};

use crate::error::{Error, Result};
use crate::graph::{AnyBox, GraphBlueprint, MatFn, MatValues};
use crate::stage::StageContext;

/// Tuning knobs shared by every stage a materializer starts
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MaterializerConfig {
    /// Upstream elements a linear stage or sink keeps requested ahead of use
    pub input_buffer: usize,
    /// Elements a stage emits before yielding back to the scheduler
    pub max_elements_per_turn: usize,
    /// Prefix of generated stage names
    pub name_prefix: String,
}

impl Default for MaterializerConfig {
    fn default() -> Self {
        Self {
            input_buffer: 16,
            max_elements_per_turn: 128,
            name_prefix: "flow".to_string(),
        }
    }
}

impl MaterializerConfig {
    /// Set the input buffer size
    pub fn input_buffer(mut self, size: usize) -> Self {
        self.input_buffer = size;
        self
    }

    /// Set how many elements a stage emits per scheduling turn
    pub fn max_elements_per_turn(mut self, max: usize) -> Self {
        self.max_elements_per_turn = max;
        self
    }

    /// Set the stage name prefix
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }
}

/// A stage task that ended with a failure its own protocol handling could
/// not report.
#[derive(Debug, Clone)]
pub struct StageFailure {
    /// Name of the failed stage
    pub stage: String,
    /// What went wrong
    pub error: Error,
}

/// Spawns materialized graphs onto a tokio runtime.
///
/// Cloning is cheap; clones share the runtime handle, the shutdown token and
/// the supervisor channel.
#[derive(Clone)]
pub struct Materializer {
    handle: Handle,
    config: Arc<MaterializerConfig>,
    root: CancellationToken,
    runs: Arc<AtomicU64>,
    supervisor: Option<mpsc::UnboundedSender<StageFailure>>,
}

impl Materializer {
    /// Bind to the tokio runtime this is called from.
    pub fn new(config: MaterializerConfig) -> Result<Self> {
        let handle = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        Ok(Self::with_handle(handle, config))
    }

    /// Bind to an explicit runtime
    pub fn with_handle(handle: Handle, config: MaterializerConfig) -> Self {
        Self {
            handle,
            config: Arc::new(config),
            root: CancellationToken::new(),
            runs: Arc::new(AtomicU64::new(0)),
            supervisor: None,
        }
    }

    /// Report unhandled stage failures on the returned channel.
    pub fn with_supervisor(mut self) -> (Self, mpsc::UnboundedReceiver<StageFailure>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.supervisor = Some(tx);
        (self, rx)
    }

    pub fn config(&self) -> &MaterializerConfig {
        &self.config
    }

    /// Stop every stage started by this materializer (and its clones).
    ///
    /// Running stages fail their downstream with [`Error::Shutdown`] and
    /// cancel their upstream; later materializations are refused.
    pub fn shutdown(&self) {
        debug!("materializer shutting down");
        self.root.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.root.is_cancelled()
    }

    pub(crate) fn materialize<M>(&self, graph: &GraphBlueprint, mat: &MatFn<M>) -> Result<M> {
        if self.is_shutdown() {
            return Err(Error::Shutdown);
        }
        graph.validate_closed()?;

        let run = self.runs.fetch_add(1, Ordering::Relaxed);
        let run_token = self.root.child_token();
        let stage_count = graph.stage_count();

        let mut outlets: Vec<Vec<Option<AnyBox>>> = Vec::with_capacity(stage_count);
        let mut inlets: Vec<Vec<Option<AnyBox>>> = Vec::with_capacity(stage_count);
        let mut values: Vec<AnyBox> = Vec::with_capacity(stage_count);
        let mut tasks = Vec::with_capacity(stage_count);

        for (index, blueprint) in graph.stages().iter().enumerate() {
            let name: Arc<str> = Arc::from(format!(
                "{}-{run}-{index}-{}",
                self.config.name_prefix, blueprint.name
            ));
            let ctx = StageContext::new(
                name.clone(),
                run_token.clone(),
                self.config.input_buffer,
                self.config.max_elements_per_turn,
            );
            let created = (blueprint.factory)(ctx);
            outlets.push(created.outlets.into_iter().map(Some).collect());
            inlets.push(created.inlets.into_iter().map(Some).collect());
            values.push(created.materialized);
            if let Some(task) = created.task {
                tasks.push((name, task));
            }
        }

        for edge in graph.edges() {
            let publisher = outlets
                .get_mut(edge.from.stage)
                .and_then(|slots| slots.get_mut(edge.from.slot))
                .and_then(Option::take)
                .ok_or(Error::UnknownPort)?;
            let endpoint = inlets
                .get_mut(edge.to.stage)
                .and_then(|slots| slots.get_mut(edge.to.slot))
                .and_then(Option::take)
                .ok_or(Error::UnknownPort)?;
            (edge.wire)(publisher, endpoint)?;
        }

        let value = mat(&mut MatValues::new(values), 0)?;

        debug!(
            run,
            stages = stage_count,
            edges = graph.edge_count(),
            "graph materialized"
        );
        for (name, task) in tasks {
            self.spawn_stage(name, task);
        }
        Ok(value)
    }

    fn spawn_stage(&self, name: Arc<str>, task: futures::future::BoxFuture<'static, ()>) {
        let supervisor = self.supervisor.clone();
        let span = debug_span!("stage", name = %name);
        #[cfg(feature = "metrics")]
        crate::metrics::stage_started();

        self.handle.spawn(
            async move {
                if let Err(panic) = AssertUnwindSafe(task).catch_unwind().await {
                    let error = Error::panicked(panic);
                    error!(stage = %name, %error, "stage task failed");
                    #[cfg(feature = "metrics")]
                    crate::metrics::stage_failed();
                    if let Some(supervisor) = supervisor {
                        let _ = supervisor.send(StageFailure {
                            stage: name.to_string(),
                            error,
                        });
                    }
                }
            }
            .instrument(span),
        );
    }
}

impl std::fmt::Debug for Materializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Materializer")
            .field("config", &self.config)
            .field("shutdown", &self.root.is_cancelled())
            .field("supervised", &self.supervisor.is_some())
            .finish()
    }
}
