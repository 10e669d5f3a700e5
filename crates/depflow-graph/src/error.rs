//! Error types for depflow-graph.

use depflow_core::FunctionId;
use thiserror::Error;

use crate::graph::VertexId;

/// Errors produced while building or querying a dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The owning document/model is absent.
    #[error("no graph: the document is absent")]
    NoGraph,

    /// A Function declares an ordering dependency on a Function that does
    /// not exist.
    #[error("{function} depends on missing {dependency}")]
    DanglingDependency {
        function: FunctionId,
        dependency: FunctionId,
    },

    /// A vertex id is not part of the graph.
    #[error("vertex not found: {id}")]
    VertexNotFound { id: VertexId },
}
