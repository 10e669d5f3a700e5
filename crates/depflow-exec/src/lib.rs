//! Execution side of the depflow recomputation engine.
//!
//! # Architecture
//!
//! - [`registry`]: maps algorithm identifiers to [`TreeFunction`] drivers,
//!   registered at startup.
//! - [`notifier`]: the shared [`ProgressNotifier`] carrying task status,
//!   cooperative cancellation and progress counters.
//! - [`context`]: the per-document [`ExecutionContext`] (freeze flag, heavy
//!   deployment queue, side data, transaction payload).
//! - [`pass`]: one graph pass over the document ([`run_pass`]) and the
//!   force operations.
//! - [`task`]: [`ExecutionTask`] launching a pass on the caller's thread or
//!   on a blocking tokio worker, observed through a [`TaskHandle`].
//! - [`model`]: the [`Model`] façade tying a [`Document`](depflow_core::Document)
//!   to its context and registry.
//!
//! Nothing here installs a tracing subscriber; embedders choose their own.

pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod notifier;
pub mod pass;
pub mod registry;
pub mod task;

pub use config::EngineConfig;
pub use context::{ExecutionContext, Payload};
pub use error::{EngineError, FunctionError};
pub use model::Model;
pub use notifier::{ProgressNotifier, TaskStatus};
pub use pass::{run_pass, PassReport};
pub use registry::{ClosureFunction, FunctionCall, FunctionRegistry, TreeFunction};
pub use task::{ExecutionTask, LaunchMode, TaskHandle};
