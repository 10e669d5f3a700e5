//! Layered (breadth-level) traversal of a [`DependencyGraph`].
//!
//! [`LevelIter`] yields every vertex reachable from its root(s) in the
//! chosen [`Direction`], all vertices at graph distance 1 before any at
//! distance 2, and so on. Order within one level is unspecified (neighbors
//! come out in vertex-index order, with no sibling tie-break). The roots
//! themselves are never yielded, and a vertex is yielded at most once.
//!
//! The iterator is lazy: a vertex's neighbors are only looked up once the
//! vertex itself has been yielded. [`LevelIter::reset`] rewinds it to the
//! roots.

use std::collections::{HashSet, VecDeque};

use petgraph::Direction;
use serde::Serialize;

use crate::error::GraphError;
use crate::graph::{DependencyGraph, VertexId};

/// A vertex yielded by [`LevelIter`] with its distance from the roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Visit {
    pub vertex: VertexId,
    pub depth: usize,
}

/// Breadth-level iterator over successors or predecessors.
#[derive(Debug, Clone)]
pub struct LevelIter<'g> {
    graph: &'g DependencyGraph,
    roots: Vec<VertexId>,
    direction: Direction,
    queue: VecDeque<Visit>,
    seen: HashSet<VertexId>,
}

impl<'g> LevelIter<'g> {
    /// Starts at a single root.
    pub fn new(
        graph: &'g DependencyGraph,
        root: VertexId,
        direction: Direction,
    ) -> Result<Self, GraphError> {
        Self::from_roots(graph, [root], direction)
    }

    /// Walks successors of `root` (downstream consumers).
    pub fn forward(graph: &'g DependencyGraph, root: VertexId) -> Result<Self, GraphError> {
        Self::new(graph, root, Direction::Outgoing)
    }

    /// Walks predecessors of `root` (upstream producers).
    pub fn backward(graph: &'g DependencyGraph, root: VertexId) -> Result<Self, GraphError> {
        Self::new(graph, root, Direction::Incoming)
    }

    /// Starts at several roots at once; all of them count as depth 0.
    pub fn from_roots(
        graph: &'g DependencyGraph,
        roots: impl IntoIterator<Item = VertexId>,
        direction: Direction,
    ) -> Result<Self, GraphError> {
        let roots: Vec<VertexId> = roots.into_iter().collect();
        if let Some(missing) = roots.iter().find(|r| !graph.contains(**r)) {
            return Err(GraphError::VertexNotFound { id: *missing });
        }
        let mut iter = LevelIter {
            graph,
            roots,
            direction,
            queue: VecDeque::new(),
            seen: HashSet::new(),
        };
        iter.reset();
        Ok(iter)
    }

    /// Rewinds the traversal to its roots.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.seen.clear();
        self.seen.extend(self.roots.iter().copied());
        for i in 0..self.roots.len() {
            let root = self.roots[i];
            self.enqueue_neighbors(root, 1);
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn roots(&self) -> &[VertexId] {
        &self.roots
    }

    fn enqueue_neighbors(&mut self, vertex: VertexId, depth: usize) {
        for next in self.graph.neighbors(vertex, self.direction) {
            if self.seen.insert(next) {
                self.queue.push_back(Visit {
                    vertex: next,
                    depth,
                });
            }
        }
    }
}

impl Iterator for LevelIter<'_> {
    type Item = Visit;

    fn next(&mut self) -> Option<Visit> {
        let visit = self.queue.pop_front()?;
        self.enqueue_neighbors(visit.vertex, visit.depth + 1);
        Some(visit)
    }
}
