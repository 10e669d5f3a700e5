//! Which Functions a Ledger makes eligible for the next pass.
//!
//! A Function is a *seed* when its controlling Parameter or one of its
//! Inputs is marked Touched or Impacted in the Ledger, or when the caller's
//! `intact` predicate says it must always run. The impact set is the seeds
//! plus everything reachable downstream of them. Silent writes never reach
//! the Ledger, so they never seed anything.

use indexmap::IndexSet;
use petgraph::Direction;

use depflow_core::{DocumentStore, FunctionDef, FunctionId, ParameterId};

use crate::graph::{DependencyGraph, VertexId};
use crate::iter::LevelIter;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImpactAnalysis {
    seeds: IndexSet<VertexId>,
    impacted: IndexSet<VertexId>,
}

impl ImpactAnalysis {
    /// Computes the impact set of the document's current Ledger.
    pub fn analyze<D, F>(graph: &DependencyGraph, doc: &D, intact: F) -> Self
    where
        D: DocumentStore + ?Sized,
        F: Fn(&FunctionDef) -> bool,
    {
        let ledger = doc.ledger();
        let seeds: IndexSet<VertexId> = graph
            .vertex_ids()
            .filter(|id| {
                let Some(def) = graph.vertex(*id).and_then(|v| doc.function(v.function)) else {
                    return false;
                };
                ledger.is_modified(def.parameter)
                    || def.inputs.iter().any(|p| ledger.is_modified(*p))
                    || intact(def)
            })
            .collect();

        let mut impacted = seeds.clone();
        if let Ok(downstream) =
            LevelIter::from_roots(graph, seeds.iter().copied(), Direction::Outgoing)
        {
            impacted.extend(downstream.map(|visit| visit.vertex));
        }

        tracing::debug!(
            seeds = seeds.len(),
            impacted = impacted.len(),
            "computed impact set"
        );
        ImpactAnalysis { seeds, impacted }
    }

    /// Functions directly marked by the Ledger or forced by their driver.
    pub fn seeds(&self) -> &IndexSet<VertexId> {
        &self.seeds
    }

    /// Seeds first, then downstream vertices in breadth-level order.
    pub fn impacted(&self) -> &IndexSet<VertexId> {
        &self.impacted
    }

    pub fn contains(&self, id: VertexId) -> bool {
        self.impacted.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.impacted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.impacted.is_empty()
    }

    /// The impacted Functions, in impact order.
    pub fn functions(&self, graph: &DependencyGraph) -> Vec<FunctionId> {
        self.impacted
            .iter()
            .filter_map(|id| graph.vertex(*id).map(|v| v.function))
            .collect()
    }

    /// Outputs of every impacted Function; these become Pending.
    pub fn pending_outputs<D>(&self, graph: &DependencyGraph, doc: &D) -> Vec<ParameterId>
    where
        D: DocumentStore + ?Sized,
    {
        let mut outputs: IndexSet<ParameterId> = IndexSet::new();
        for id in &self.impacted {
            if let Some(def) = graph.vertex(*id).and_then(|v| doc.function(v.function)) {
                outputs.extend(def.outputs.iter().copied());
            }
        }
        outputs.into_iter().collect()
    }
}
