//! Dependency analysis for depflow documents.
//!
//! Everything in this crate is pure and synchronous: it reads a
//! [`DocumentStore`](depflow_core::DocumentStore) and produces values.
//!
//! # Architecture
//!
//! - [`graph`]: builds the [`DependencyGraph`] of Function vertices from the
//!   document's Input/Output wiring.
//! - [`cycles`]: the cycle detector producing an [`AnalyzerResult`].
//! - [`iter`]: layered (breadth-level) forward/backward traversal.
//! - [`impact`]: which Functions a Ledger makes eligible for a pass.
//! - [`schedule`]: the independent-Function scheduler yielding ready batches.

pub mod cycles;
pub mod error;
pub mod graph;
pub mod impact;
pub mod iter;
pub mod schedule;

pub use cycles::{check_dependency_graph, AnalyzerResult, CycleDetector, CycleStrategy, GraphState};
pub use error::GraphError;
pub use graph::{DependencyEdge, DependencyGraph, Vertex, VertexId};
pub use impact::ImpactAnalysis;
pub use iter::{LevelIter, Visit};
pub use schedule::{BatchOrder, ExecStatus, Scheduler};

pub use petgraph::Direction;
