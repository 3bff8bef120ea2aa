//! Engine error taxonomy.

use crate::context::ContextError;
use crate::graph::GraphError;
use crate::primitives::NodeError;

/// Errors surfaced to the UI layer by the session engine
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("unsupported mode: {0}")]
    UnsupportedMode(String),

    #[error("{0} Hz is not a valid frequency for this mode")]
    InvalidFrequency(f64),

    #[error("audio context unavailable: {0}")]
    ContextUnavailable(String),

    #[error("background audio unavailable: {0}")]
    BackgroundUnavailable(String),

    #[error("no audio graph is running")]
    NotRunning,

    #[error("cannot {intent} while {state}")]
    InvalidTransition {
        state: &'static str,
        intent: &'static str,
    },

    #[error("session driver has shut down")]
    DriverClosed,

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Node(#[from] NodeError),
}

impl EngineError {
    /// Whether this error should stop the user from starting a session.
    pub fn is_blocking(&self) -> bool {
        matches!(self, EngineError::ContextUnavailable(_))
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
