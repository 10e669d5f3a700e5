//! Error types for depflow-exec.

use depflow_core::{AlgorithmId, CoreError, FunctionId, ParameterId};
use depflow_graph::GraphError;
use thiserror::Error;

use crate::notifier::TaskStatus;

/// Failure reported by a Function body.
///
/// Bodies return this instead of unwinding; a panic inside a body is caught
/// at the pass boundary and converted into one as well.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FunctionError {
    pub message: String,
}

impl FunctionError {
    pub fn new(message: impl Into<String>) -> Self {
        FunctionError {
            message: message.into(),
        }
    }

    /// Converts a panic payload into an error.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        FunctionError::new(format!("function body panicked: {detail}"))
    }
}

impl From<CoreError> for FunctionError {
    fn from(err: CoreError) -> Self {
        FunctionError::new(err.to_string())
    }
}

/// Errors from the execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The model is absent.
    #[error("no graph: the model is absent")]
    NoGraph,

    /// A pass is in flight (the graph is frozen).
    #[error("busy: a pass is in flight")]
    Busy,

    /// The notifier handed to a launch already tracked another run.
    #[error("notifier is {status:?}; each run needs an idle notifier")]
    NotifierSpent { status: TaskStatus },

    /// A detached launch was requested outside a tokio runtime.
    #[error("detached launch requires a tokio runtime")]
    NoRuntime,

    #[error("no driver registered for algorithm {algorithm}")]
    UnknownAlgorithm { algorithm: AlgorithmId },

    /// The Parameter is not the controlling Parameter of a heavy Function.
    #[error("{parameter} does not control a heavy function")]
    NotHeavy { parameter: ParameterId },

    /// A forced Function body failed.
    #[error("{function} failed: {source}")]
    Execution {
        function: FunctionId,
        #[source]
        source: FunctionError,
    },

    /// The background worker could not be joined.
    #[error("task join failed: {message}")]
    Join { message: String },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}
