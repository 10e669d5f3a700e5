//! Core error types for depflow-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! failure modes of document wiring and Parameter writes.

use crate::id::{FunctionId, NodeId, ParameterId};
use thiserror::Error;

/// Errors produced by the document model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A Node id was not found in the document.
    #[error("node not found: NodeId({id})", id = id.0)]
    NodeNotFound { id: NodeId },

    /// A Parameter id was not found in the document.
    #[error("parameter not found: {id}")]
    ParameterNotFound { id: ParameterId },

    /// A Function id was not found in the document.
    #[error("function not found: {id}")]
    FunctionNotFound { id: FunctionId },

    /// Function wiring was mutated while the dependency graph is frozen.
    #[error("dependency graph is frozen: a pass is in flight")]
    Busy,

    /// A wiring request would break a document invariant.
    #[error("invalid wiring: {reason}")]
    InvalidWiring { reason: String },

    /// A transaction was opened while another one is still open.
    #[error("a transaction is already open")]
    TransactionAlreadyOpen,

    /// A Parameter write or commit was attempted outside a transaction.
    #[error("no active transaction")]
    NoActiveTransaction,
}
