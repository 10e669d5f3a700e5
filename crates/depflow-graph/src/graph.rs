//! The dependency graph of Function vertices.
//!
//! [`DependencyGraph`] is rebuilt fresh for every pass or analysis call and
//! never persisted. Vertices live in a petgraph `StableGraph` arena addressed
//! by stable integer index ([`VertexId`]); adjacency is index-keyed, so no
//! vertex holds a pointer to another.
//!
//! An edge `V1 -> V2` means that V1 must complete before V2: either V1
//! writes a Parameter V2 reads ([`DependencyEdge::parameters`]), or V2
//! declared an explicit ordering dependency on V1
//! ([`DependencyEdge::ordering`]). Parallel reasons between the same pair are
//! merged into one edge.

use std::collections::HashMap;
use std::fmt;

use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::stable_graph::StableGraph;
use petgraph::{Directed, Direction};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use depflow_core::{DocumentStore, FunctionDef, FunctionId, NodeId, ParameterId, Priority};
use indexmap::IndexMap;

use crate::error::GraphError;

/// Stable vertex identifier. Maps to a petgraph `NodeIndex<u32>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VertexId(pub u32);

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

// Bridge between VertexId and petgraph's NodeIndex<u32>.

impl From<NodeIndex<u32>> for VertexId {
    fn from(idx: NodeIndex<u32>) -> Self {
        VertexId(idx.index() as u32)
    }
}

impl From<VertexId> for NodeIndex<u32> {
    fn from(id: VertexId) -> Self {
        NodeIndex::new(id.0 as usize)
    }
}

/// A Function vertex together with its controlling Parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vertex {
    pub function: FunctionId,
    /// The controlling Parameter of the Function.
    pub parameter: ParameterId,
    /// Owning Node.
    pub node: NodeId,
    pub priority: Priority,
    pub heavy: bool,
}

impl Vertex {
    fn from_def(def: &FunctionDef) -> Self {
        Vertex {
            function: def.id,
            parameter: def.parameter,
            node: def.node,
            priority: def.priority,
            heavy: def.heavy,
        }
    }
}

/// Why one vertex must precede another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Parameters written by the source and read by the target.
    pub parameters: SmallVec<[ParameterId; 2]>,
    /// `true` if the target declared an explicit ordering dependency.
    pub ordering: bool,
}

impl DependencyEdge {
    /// Returns `true` if data flows along this edge.
    pub fn is_data(&self) -> bool {
        !self.parameters.is_empty()
    }
}

/// Directed graph of Function vertices for one document.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: StableGraph<Vertex, DependencyEdge, Directed, u32>,
    /// Function -> vertex, in document order.
    by_function: IndexMap<FunctionId, VertexId>,
}

impl DependencyGraph {
    /// Builds the graph of every Function known to `doc`.
    ///
    /// Disconnected Functions become isolated vertices. Returns
    /// [`GraphError::NoGraph`] when the document is absent; never returns a
    /// partially built graph.
    pub fn build<D>(doc: Option<&D>) -> Result<Self, GraphError>
    where
        D: DocumentStore + ?Sized,
    {
        let doc = doc.ok_or(GraphError::NoGraph)?;
        let functions = doc.functions();

        let mut dg = DependencyGraph {
            graph: StableGraph::with_capacity(functions.len(), functions.len()),
            by_function: IndexMap::with_capacity(functions.len()),
        };

        let mut placed: Vec<(VertexId, &FunctionDef)> = Vec::with_capacity(functions.len());
        for def in functions {
            let id = VertexId::from(dg.graph.add_node(Vertex::from_def(def)));
            dg.by_function.insert(def.id, id);
            placed.push((id, def));
        }

        let mut producers: HashMap<ParameterId, VertexId> = HashMap::new();
        for (id, def) in &placed {
            for output in &def.outputs {
                producers.insert(*output, *id);
            }
        }

        for (target, def) in &placed {
            for input in &def.inputs {
                if let Some(source) = producers.get(input) {
                    dg.link(*source, *target, Some(*input));
                }
            }
            for dependency in &def.after {
                let source = dg.vertex_of(*dependency).ok_or(GraphError::DanglingDependency {
                    function: def.id,
                    dependency: *dependency,
                })?;
                dg.link(source, *target, None);
            }
        }

        tracing::debug!(
            vertices = dg.vertex_count(),
            edges = dg.edge_count(),
            "built dependency graph"
        );
        Ok(dg)
    }

    /// Adds or merges the edge `from -> to`.
    fn link(&mut self, from: VertexId, to: VertexId, parameter: Option<ParameterId>) {
        let (a, b): (NodeIndex<u32>, NodeIndex<u32>) = (from.into(), to.into());
        let edge_idx: EdgeIndex<u32> = match self.graph.find_edge(a, b) {
            Some(idx) => idx,
            None => self.graph.add_edge(a, b, DependencyEdge::default()),
        };
        if let Some(edge) = self.graph.edge_weight_mut(edge_idx) {
            match parameter {
                Some(p) if !edge.parameters.contains(&p) => edge.parameters.push(p),
                Some(_) => {}
                None => edge.ordering = true,
            }
        }
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    /// Returns a read-only reference to the underlying petgraph graph.
    pub fn inner(&self) -> &StableGraph<Vertex, DependencyEdge, Directed, u32> {
        &self.graph
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.graph.node_weight(id.into())
    }

    /// The vertex of a Function, if it is part of the graph.
    pub fn vertex_of(&self, function: FunctionId) -> Option<VertexId> {
        self.by_function.get(&function).copied()
    }

    /// All vertex ids in document order.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.by_function.values().copied()
    }

    pub fn contains(&self, id: VertexId) -> bool {
        self.graph.contains_node(id.into())
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// The edge `from -> to`, if present.
    pub fn edge(&self, from: VertexId, to: VertexId) -> Option<&DependencyEdge> {
        self.graph
            .find_edge(from.into(), to.into())
            .and_then(|idx| self.graph.edge_weight(idx))
    }

    /// Neighbors of `id` in `direction`, sorted by vertex index.
    pub fn neighbors(&self, id: VertexId, direction: Direction) -> Vec<VertexId> {
        let mut out: Vec<VertexId> = self
            .graph
            .neighbors_directed(id.into(), direction)
            .map(VertexId::from)
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Vertices fed by `id`.
    pub fn successors(&self, id: VertexId) -> Vec<VertexId> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Vertices feeding `id`.
    pub fn predecessors(&self, id: VertexId) -> Vec<VertexId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Returns `true` if `id` feeds itself.
    pub fn has_self_loop(&self, id: VertexId) -> bool {
        self.graph.find_edge(id.into(), id.into()).is_some()
    }

    /// Vertices with no predecessors, in document order.
    pub fn roots(&self) -> Vec<VertexId> {
        self.vertex_ids()
            .filter(|id| self.predecessors(*id).is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use depflow_core::{Document, LogBook, Modification, Parameter, CoreError};

    #[test]
    fn chain_produces_data_edges() {
        let fx = Fixture::chain(3);
        let g = DependencyGraph::build(Some(&fx.doc)).unwrap();
        assert_eq!(g.vertex_count(), 3);
        assert_eq!(g.edge_count(), 2);

        let a = g.vertex_of(fx.functions[0]).unwrap();
        let b = g.vertex_of(fx.functions[1]).unwrap();
        let c = g.vertex_of(fx.functions[2]).unwrap();
        assert_eq!(g.successors(a), vec![b]);
        assert_eq!(g.predecessors(c), vec![b]);
        assert_eq!(g.roots(), vec![a]);

        let edge = g.edge(a, b).unwrap();
        assert!(edge.is_data());
        assert!(!edge.ordering);
        assert_eq!(edge.parameters.as_slice(), &[fx.outputs[0]]);
    }

    #[test]
    fn disconnected_functions_are_isolated_vertices() {
        let fx = Fixture::new(3);
        let g = DependencyGraph::build(Some(&fx.doc)).unwrap();
        assert_eq!(g.vertex_count(), 3);
        assert_eq!(g.edge_count(), 0);
        assert_eq!(g.roots().len(), 3);
        let ids: Vec<_> = g.vertex_ids().collect();
        let expected: Vec<_> = fx
            .functions
            .iter()
            .map(|f| g.vertex_of(*f).unwrap())
            .collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn ordering_dependency_merges_with_data_edge() {
        let mut fx = Fixture::chain(2);
        fx.doc.add_ordering(fx.functions[1], fx.functions[0]).unwrap();
        let g = DependencyGraph::build(Some(&fx.doc)).unwrap();
        assert_eq!(g.edge_count(), 1);
        let a = g.vertex_of(fx.functions[0]).unwrap();
        let b = g.vertex_of(fx.functions[1]).unwrap();
        let edge = g.edge(a, b).unwrap();
        assert!(edge.ordering);
        assert!(edge.is_data());
    }

    #[test]
    fn explicit_ordering_alone_creates_edge() {
        let mut fx = Fixture::new(2);
        fx.doc.add_ordering(fx.functions[0], fx.functions[1]).unwrap();
        let g = DependencyGraph::build(Some(&fx.doc)).unwrap();
        let a = g.vertex_of(fx.functions[0]).unwrap();
        let b = g.vertex_of(fx.functions[1]).unwrap();
        let edge = g.edge(b, a).unwrap();
        assert!(edge.ordering);
        assert!(!edge.is_data());
    }

    #[test]
    fn function_reading_its_own_output_is_a_self_loop() {
        let mut fx = Fixture::new(1);
        fx.link(0, 0);
        let g = DependencyGraph::build(Some(&fx.doc)).unwrap();
        let a = g.vertex_of(fx.functions[0]).unwrap();
        assert!(g.has_self_loop(a));
        assert_eq!(g.successors(a), vec![a]);
    }

    #[test]
    fn absent_document_is_no_graph() {
        let err = DependencyGraph::build::<Document>(None).unwrap_err();
        assert_eq!(err, GraphError::NoGraph);
    }

    /// A store whose wiring references a Function that does not exist.
    struct DanglingStore {
        functions: Vec<FunctionDef>,
        ledger: LogBook,
    }

    impl DocumentStore for DanglingStore {
        fn functions(&self) -> Vec<&FunctionDef> {
            self.functions.iter().collect()
        }
        fn function(&self, id: FunctionId) -> Option<&FunctionDef> {
            self.functions.iter().find(|f| f.id == id)
        }
        fn parameter(&self, _id: ParameterId) -> Option<&Parameter> {
            None
        }
        fn node_parameters(&self, _node: NodeId) -> Vec<ParameterId> {
            Vec::new()
        }
        fn set_parameter_state(&mut self, id: ParameterId, _: bool, _: bool) -> Result<(), CoreError> {
            Err(CoreError::ParameterNotFound { id })
        }
        fn store_value(&mut self, id: ParameterId, _: serde_json::Value) -> Result<(), CoreError> {
            Err(CoreError::ParameterNotFound { id })
        }
        fn ledger(&self) -> &LogBook {
            &self.ledger
        }
        fn record_modification(&mut self, _: ParameterId, _: Modification) -> Result<(), CoreError> {
            Ok(())
        }
        fn clear_ledger(&mut self) {}
    }

    #[test]
    fn dangling_ordering_dependency_fails_whole_build() {
        let node = NodeId(0);
        let mut def = FunctionDef::new(FunctionId(0), "x".into(), node, ParameterId::new(node, 0));
        def.after.push(FunctionId(9));
        let store = DanglingStore {
            functions: vec![def],
            ledger: LogBook::new(),
        };
        let err = DependencyGraph::build(Some(&store)).unwrap_err();
        assert_eq!(
            err,
            GraphError::DanglingDependency {
                function: FunctionId(0),
                dependency: FunctionId(9),
            }
        );
    }

    #[test]
    fn vertex_id_bridges_node_index() {
        let idx = NodeIndex::<u32>::new(7);
        let id = VertexId::from(idx);
        assert_eq!(id, VertexId(7));
        let back: NodeIndex<u32> = id.into();
        assert_eq!(back.index(), 7);
        assert_eq!(id.to_string(), "v7");
    }
}
