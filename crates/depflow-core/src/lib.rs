//! Data model for the depflow recomputation engine.
//!
//! This crate holds everything the engine reads from or writes to the
//! owning document: stable ids, Parameters, Function wiring, the
//! modification Ledger, and the [`DocumentStore`] contract with its
//! in-memory [`Document`] backend.

pub mod document;
pub mod error;
pub mod freeze;
pub mod function;
pub mod id;
pub mod ledger;
pub mod parameter;
pub mod store;

// Re-export commonly used types
pub use document::Document;
pub use error::CoreError;
pub use freeze::GraphFreeze;
pub use function::{FunctionDef, Priority};
pub use id::{AlgorithmId, FunctionId, NodeId, ParameterId};
pub use ledger::{LogBook, Modification};
pub use parameter::{Parameter, TypeTag};
pub use store::DocumentStore;
