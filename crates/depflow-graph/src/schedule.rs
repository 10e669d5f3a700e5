//! The independent-Function scheduler.
//!
//! [`Scheduler`] tracks an [`ExecStatus`] per vertex. At any point
//! [`Scheduler::current_batch`] returns the NotReady vertices whose every
//! predecessor is Done; those are logically independent of each other.
//! After the caller updates statuses via [`Scheduler::set_status`], the next
//! query reflects the new readiness.
//!
//! With [`BatchOrder::PriorityInverted`] (the default) a batch is ordered by
//! ascending priority, so normal-priority Functions come before high-priority
//! ones and cheap work runs first. Ties keep document order.
//! [`BatchOrder::Unordered`] leaves the batch in document order, for callers
//! that would rather run a batch concurrently.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::graph::{DependencyGraph, VertexId};

/// Per-vertex state during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecStatus {
    NotReady,
    Executing,
    Done,
    Failed,
    /// Heavy Function held back for an explicit deployment.
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BatchOrder {
    #[default]
    #[serde(rename = "priority")]
    PriorityInverted,
    #[serde(rename = "unordered")]
    Unordered,
}

#[derive(Debug, Clone)]
pub struct Scheduler<'g> {
    graph: &'g DependencyGraph,
    status: IndexMap<VertexId, ExecStatus>,
    order: BatchOrder,
}

impl<'g> Scheduler<'g> {
    /// Schedules only `eligible`; every other vertex starts as Done so it
    /// never blocks its consumers.
    pub fn new(
        graph: &'g DependencyGraph,
        eligible: impl IntoIterator<Item = VertexId>,
        order: BatchOrder,
    ) -> Self {
        let mut status: IndexMap<VertexId, ExecStatus> = graph
            .vertex_ids()
            .map(|id| (id, ExecStatus::Done))
            .collect();
        for id in eligible {
            if let Some(slot) = status.get_mut(&id) {
                *slot = ExecStatus::NotReady;
            }
        }
        Scheduler {
            graph,
            status,
            order,
        }
    }

    /// Schedules every vertex of the graph.
    pub fn all(graph: &'g DependencyGraph, order: BatchOrder) -> Self {
        Self::new(graph, graph.vertex_ids(), order)
    }

    pub fn graph(&self) -> &'g DependencyGraph {
        self.graph
    }

    pub fn status(&self, id: VertexId) -> Option<ExecStatus> {
        self.status.get(&id).copied()
    }

    pub fn set_status(&mut self, id: VertexId, status: ExecStatus) -> Result<(), GraphError> {
        let slot = self
            .status
            .get_mut(&id)
            .ok_or(GraphError::VertexNotFound { id })?;
        *slot = status;
        Ok(())
    }

    fn is_ready(&self, id: VertexId) -> bool {
        self.status(id) == Some(ExecStatus::NotReady)
            && self
                .graph
                .predecessors(id)
                .iter()
                .all(|p| self.status(*p) == Some(ExecStatus::Done))
    }

    /// NotReady vertices whose predecessors are all Done.
    pub fn current_batch(&self) -> Vec<VertexId> {
        let mut batch: Vec<VertexId> = self
            .status
            .keys()
            .copied()
            .filter(|id| self.is_ready(*id))
            .collect();
        if self.order == BatchOrder::PriorityInverted {
            // sort_by_key is stable: equal priorities keep document order.
            batch.sort_by_key(|id| self.graph.vertex(*id).map(|v| v.priority));
        }
        batch
    }

    /// Number of vertices currently in `status`.
    pub fn count(&self, status: ExecStatus) -> usize {
        self.status.values().filter(|s| **s == status).count()
    }

    /// Vertices still NotReady, ready or not.
    pub fn remaining(&self) -> Vec<VertexId> {
        self.status
            .iter()
            .filter(|(_, s)| **s == ExecStatus::NotReady)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Returns `true` when no vertex can become ready any more.
    pub fn is_exhausted(&self) -> bool {
        self.current_batch().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use depflow_core::{AlgorithmId, Priority};

    fn graph_of(fx: &Fixture) -> DependencyGraph {
        DependencyGraph::build(Some(&fx.doc)).unwrap()
    }

    fn vs(g: &DependencyGraph, fx: &Fixture, idx: &[usize]) -> Vec<VertexId> {
        idx.iter()
            .map(|i| g.vertex_of(fx.functions[*i]).unwrap())
            .collect()
    }

    #[test]
    fn chain_releases_one_vertex_per_round() {
        let fx = Fixture::chain(3);
        let g = graph_of(&fx);
        let mut s = Scheduler::all(&g, BatchOrder::PriorityInverted);
        let mut order = Vec::new();
        loop {
            let batch = s.current_batch();
            if batch.is_empty() {
                break;
            }
            assert_eq!(batch.len(), 1);
            for id in batch {
                s.set_status(id, ExecStatus::Done).unwrap();
                order.push(id);
            }
        }
        assert_eq!(order, vs(&g, &fx, &[0, 1, 2]));
        assert_eq!(s.count(ExecStatus::Done), 3);
    }

    #[test]
    fn executing_predecessor_blocks() {
        let fx = Fixture::chain(2);
        let g = graph_of(&fx);
        let ids = vs(&g, &fx, &[0, 1]);
        let mut s = Scheduler::all(&g, BatchOrder::PriorityInverted);
        s.set_status(ids[0], ExecStatus::Executing).unwrap();
        assert!(s.current_batch().is_empty());
        s.set_status(ids[0], ExecStatus::Done).unwrap();
        assert_eq!(s.current_batch(), vec![ids[1]]);
    }

    #[test]
    fn failed_or_deferred_predecessor_blocks_downstream() {
        let fx = Fixture::chain(2);
        let g = graph_of(&fx);
        let ids = vs(&g, &fx, &[0, 1]);
        for blocking in [ExecStatus::Failed, ExecStatus::Deferred] {
            let mut s = Scheduler::all(&g, BatchOrder::PriorityInverted);
            s.set_status(ids[0], blocking).unwrap();
            assert!(s.is_exhausted());
            assert_eq!(s.remaining(), vec![ids[1]]);
        }
    }

    #[test]
    fn ineligible_vertices_start_done() {
        let fx = Fixture::chain(3);
        let g = graph_of(&fx);
        let ids = vs(&g, &fx, &[0, 1, 2]);
        let s = Scheduler::new(&g, [ids[2]], BatchOrder::PriorityInverted);
        assert_eq!(s.status(ids[0]), Some(ExecStatus::Done));
        assert_eq!(s.current_batch(), vec![ids[2]]);
    }

    #[test]
    fn normal_priority_runs_before_high() {
        let mut fx = Fixture::new(0);
        let node = fx.doc.add_node("n").unwrap();
        let mut add = |name: &str, priority: Priority| {
            fx.doc
                .add_function(node, AlgorithmId::new(name), false, priority)
                .unwrap()
        };
        let high = add("urgent", Priority::HIGH);
        let first = add("cheap", Priority::NORMAL);
        let second = add("cheaper", Priority::NORMAL);
        let g = graph_of(&fx);
        let v = |f| g.vertex_of(f).unwrap();

        let inverted = Scheduler::all(&g, BatchOrder::PriorityInverted).current_batch();
        assert_eq!(inverted, vec![v(first), v(second), v(high)]);

        let unordered = Scheduler::all(&g, BatchOrder::Unordered).current_batch();
        assert_eq!(unordered, vec![v(high), v(first), v(second)]);
    }

    #[test]
    fn unknown_vertex_status_is_an_error() {
        let fx = Fixture::new(1);
        let g = graph_of(&fx);
        let mut s = Scheduler::all(&g, BatchOrder::Unordered);
        assert_eq!(
            s.set_status(VertexId(42), ExecStatus::Done),
            Err(GraphError::VertexNotFound { id: VertexId(42) })
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn status_strategy() -> impl Strategy<Value = ExecStatus> {
            prop_oneof![
                Just(ExecStatus::NotReady),
                Just(ExecStatus::Executing),
                Just(ExecStatus::Done),
                Just(ExecStatus::Failed),
                Just(ExecStatus::Deferred),
            ]
        }

        proptest! {
            #[test]
            fn batch_membership(
                raw in proptest::collection::vec((0usize..6, 0usize..6), 0..12),
                statuses in proptest::collection::vec(status_strategy(), 6),
            ) {
                let mut fx = Fixture::new(6);
                for (from, to) in raw.iter().filter(|(a, b)| a < b) {
                    let _ = fx.doc.connect_input(fx.functions[*to], fx.outputs[*from]);
                }
                let g = graph_of(&fx);
                let mut s = Scheduler::all(&g, BatchOrder::PriorityInverted);
                let ids: Vec<VertexId> = g.vertex_ids().collect();
                for (id, status) in ids.iter().zip(&statuses) {
                    s.set_status(*id, *status).unwrap();
                }

                let batch = s.current_batch();
                for (id, status) in ids.iter().zip(&statuses) {
                    let preds_done = g
                        .predecessors(*id)
                        .iter()
                        .all(|p| s.status(*p) == Some(ExecStatus::Done));
                    let expected = *status == ExecStatus::NotReady && preds_done;
                    prop_assert_eq!(batch.contains(id), expected);
                }
            }
        }
    }
}
