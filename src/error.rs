//! Error types for stream graphs and their running stages.

use std::convert::Infallible;
use std::sync::Arc;

/// The main error type for graph construction, materialization and stage signaling.
///
/// Errors are cheap to clone so a single failure can be handed to every party
/// that has to observe it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// User-supplied generation logic (an unfold step, an iterator cursor) failed
    #[error("generation failed: {0}")]
    Generation(Arc<dyn std::error::Error + Send + Sync>),

    /// User-supplied stage logic panicked; the panic was contained at the stage boundary
    #[error("stage logic panicked: {0}")]
    Panicked(String),

    /// A subscriber requested a non-positive number of elements
    #[error("demand must be positive, got {0}")]
    InvalidDemand(u64),

    /// A publisher that already has its subscriber was subscribed to again
    #[error("publisher accepts exactly one subscriber")]
    AlreadySubscribed,

    /// The stage behind a publisher is no longer running
    #[error("stage has terminated")]
    StageTerminated,

    /// A graph was materialized with a port left unconnected
    #[error("unconnected {port} on stage `{stage}`")]
    UnconnectedPort { stage: String, port: String },

    /// A port was connected twice
    #[error("port is already connected")]
    PortAlreadyConnected,

    /// A port does not belong to the graph it was used with
    #[error("port does not belong to this graph")]
    UnknownPort,

    /// The materialized value of a stage could not be produced
    #[error("materialized value unavailable: {0}")]
    MaterializedValue(String),

    /// No async runtime is available to schedule stages on
    #[error("no tokio runtime available to run stages")]
    NoRuntime,

    /// The materializer was shut down while the stage was running
    #[error("materializer was shut down")]
    Shutdown,

    /// A stage went away without sending a terminal signal
    #[error("stage terminated abruptly")]
    AbruptTermination,

    /// A sink that needs at least one element saw an empty stream
    #[error("stream completed without elements")]
    EmptyStream,

    /// A custom error with a message
    #[error("{0}")]
    Custom(String),
}

// Convenience constructors
impl Error {
    /// Wrap a failure raised by user generation logic
    pub fn generation<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Error::Generation(Arc::new(error))
    }

    /// Create a custom error with a message
    pub fn custom<S: Into<String>>(message: S) -> Self {
        Error::Custom(message.into())
    }

    /// Turn a caught panic payload into an error
    pub(crate) fn panicked(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Error::Panicked(message)
    }

    /// The user error behind a generation failure, if any
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Error::Generation(e) => Some(e.as_ref()),
            _ => None,
        }
    }

    /// Returns `true` for failures caused by a broken signaling contract
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Error::InvalidDemand(_) | Error::AlreadySubscribed | Error::StageTerminated
        )
    }
}

// Common conversions
impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Error::AbruptTermination
    }
}

impl From<Infallible> for Error {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Custom(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Custom(s.to_string())
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;
