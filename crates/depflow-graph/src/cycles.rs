//! Cycle detection over a built [`DependencyGraph`].
//!
//! The default [`CycleStrategy::Exhaustive`] walks every simple path with a
//! per-path stack of visited vertices; reaching a vertex already on the
//! stack records the induced cycle (the sub-stack from its first occurrence
//! to the current vertex). Worst case is exponential in the vertex count,
//! which real Function graphs (shallow and sparse) never approach.
//! [`CycleStrategy::StronglyConnected`] is the linear alternative based on
//! Tarjan's algorithm. Both report the same faulty Parameter set.
//!
//! Detection always runs to completion so the full faulty set is reported
//! in one call.

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use depflow_core::{DocumentStore, FunctionId, ParameterId};

use crate::graph::{DependencyGraph, VertexId};

/// Outcome of a dependency graph health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GraphState {
    /// No analysis has run.
    #[default]
    Undefined,
    /// The graph is acyclic.
    Ok,
    /// One or more Functions form a cyclic chain.
    HasLoops,
    /// The owning document is absent (or its wiring is unusable).
    NoGraph,
}

/// Algorithm used to find cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStrategy {
    /// Depth-first enumeration of every elementary cycle.
    #[default]
    Exhaustive,
    /// Tarjan strongly-connected components; lists components, not cycles.
    #[serde(rename = "scc")]
    StronglyConnected,
}

/// Result of [`check_dependency_graph`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalyzerResult {
    pub state: GraphState,
    /// Parameters belonging to every Function found on a cycle.
    pub cyclic_parameters: BTreeSet<ParameterId>,
    /// The cycles found, each starting at its lowest Function, sorted.
    pub cycles: Vec<Vec<FunctionId>>,
}

impl AnalyzerResult {
    fn with_state(state: GraphState) -> Self {
        AnalyzerResult {
            state,
            ..AnalyzerResult::default()
        }
    }

    pub fn has_loops(&self) -> bool {
        self.state == GraphState::HasLoops
    }

    /// Every Function participating in at least one cycle.
    pub fn cyclic_functions(&self) -> BTreeSet<FunctionId> {
        self.cycles.iter().flatten().copied().collect()
    }

    /// One line per cycle, e.g. `f0 -> f1 -> f0`.
    pub fn describe_cycles(&self) -> Vec<String> {
        self.cycles
            .iter()
            .map(|cycle| {
                let mut parts: Vec<String> = cycle.iter().map(|f| f.to_string()).collect();
                if let Some(first) = cycle.first() {
                    parts.push(first.to_string());
                }
                parts.join(" -> ")
            })
            .collect()
    }
}

/// Validates a built graph and collects cyclic Parameters.
#[derive(Debug, Clone)]
pub struct CycleDetector<'g> {
    graph: &'g DependencyGraph,
    strategy: CycleStrategy,
    enrich: bool,
}

impl<'g> CycleDetector<'g> {
    pub fn new(graph: &'g DependencyGraph) -> Self {
        CycleDetector {
            graph,
            strategy: CycleStrategy::default(),
            enrich: false,
        }
    }

    pub fn with_strategy(mut self, strategy: CycleStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Widens the faulty set to every Parameter of the cyclic Functions'
    /// Nodes.
    pub fn enriched(mut self, enrich: bool) -> Self {
        self.enrich = enrich;
        self
    }

    /// Finds cycles as vertex lists, each rotated to start at its lowest
    /// vertex, sorted.
    pub fn find_cycles(&self) -> Vec<Vec<VertexId>> {
        let mut cycles = match self.strategy {
            CycleStrategy::Exhaustive => self.exhaustive_cycles(),
            CycleStrategy::StronglyConnected => self.strongly_connected(),
        };
        cycles.sort();
        cycles
    }

    fn exhaustive_cycles(&self) -> Vec<Vec<VertexId>> {
        let order: Vec<VertexId> = self.graph.vertex_ids().collect();
        let rank: HashMap<VertexId, usize> =
            order.iter().enumerate().map(|(i, v)| (*v, i)).collect();
        let mut found: IndexSet<Vec<VertexId>> = IndexSet::new();

        // Every cycle is reached at the latest when the walk starts from its
        // lowest-ranked vertex, so successors ranked below the start are
        // skipped.
        let successors_from = |vertex: VertexId, floor: usize| -> Vec<VertexId> {
            self.graph
                .successors(vertex)
                .into_iter()
                .filter(|s| rank.get(s).is_some_and(|r| *r >= floor))
                .collect()
        };

        for (floor, &start) in order.iter().enumerate() {
            let mut path: Vec<VertexId> = vec![start];
            let mut frames: Vec<(Vec<VertexId>, usize)> = vec![(successors_from(start, floor), 0)];

            while let Some((successors, cursor)) = frames.last_mut() {
                if *cursor >= successors.len() {
                    frames.pop();
                    path.pop();
                    continue;
                }
                let next = successors[*cursor];
                *cursor += 1;

                match path.iter().position(|v| *v == next) {
                    Some(pos) => {
                        found.insert(rotate_to_min(&path[pos..]));
                    }
                    None => {
                        path.push(next);
                        frames.push((successors_from(next, floor), 0));
                    }
                }
            }
        }

        found.into_iter().collect()
    }

    fn strongly_connected(&self) -> Vec<Vec<VertexId>> {
        petgraph::algo::tarjan_scc(self.graph.inner())
            .into_iter()
            .map(|component| {
                let mut ids: Vec<VertexId> = component.into_iter().map(VertexId::from).collect();
                ids.sort();
                ids
            })
            .filter(|ids| ids.len() > 1 || ids.first().is_some_and(|v| self.graph.has_self_loop(*v)))
            .collect()
    }

    /// Runs detection and resolves the faulty Parameter set against `doc`.
    pub fn run<D>(&self, doc: &D) -> AnalyzerResult
    where
        D: DocumentStore + ?Sized,
    {
        let vertex_cycles = self.find_cycles();
        if vertex_cycles.is_empty() {
            return AnalyzerResult::with_state(GraphState::Ok);
        }

        let to_function = |v: &VertexId| self.graph.vertex(*v).map(|vx| vx.function);
        let cycles: Vec<Vec<FunctionId>> = vertex_cycles
            .iter()
            .map(|cycle| cycle.iter().filter_map(to_function).collect())
            .collect();

        let mut cyclic_parameters = BTreeSet::new();
        let functions: BTreeSet<FunctionId> = cycles.iter().flatten().copied().collect();
        for function in &functions {
            let Some(def) = doc.function(*function) else {
                continue;
            };
            cyclic_parameters.extend(def.owned_parameters());
            if self.enrich {
                cyclic_parameters.extend(doc.node_parameters(def.node));
            }
        }

        tracing::warn!(
            cycles = cycles.len(),
            functions = functions.len(),
            parameters = cyclic_parameters.len(),
            "dependency graph has loops"
        );

        AnalyzerResult {
            state: GraphState::HasLoops,
            cyclic_parameters,
            cycles,
        }
    }
}

/// Rotates a cycle so that its smallest vertex comes first.
fn rotate_to_min(cycle: &[VertexId]) -> Vec<VertexId> {
    let start = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, v)| **v)
        .map(|(i, _)| i)
        .unwrap_or(0);
    cycle[start..].iter().chain(cycle[..start].iter()).copied().collect()
}

/// Health check of a document's Function wiring.
///
/// Builds the graph and runs the detector. Never executes anything.
/// Returns [`GraphState::NoGraph`] when `doc` is absent or its wiring cannot
/// be built into a graph.
pub fn check_dependency_graph<D>(
    doc: Option<&D>,
    strategy: CycleStrategy,
    enrich: bool,
) -> AnalyzerResult
where
    D: DocumentStore + ?Sized,
{
    let Some(doc) = doc else {
        return AnalyzerResult::with_state(GraphState::NoGraph);
    };
    match DependencyGraph::build(Some(doc)) {
        Ok(graph) => CycleDetector::new(&graph)
            .with_strategy(strategy)
            .enriched(enrich)
            .run(doc),
        Err(err) => {
            tracing::warn!(error = %err, "cannot build dependency graph");
            AnalyzerResult::with_state(GraphState::NoGraph)
        }
    }
}
