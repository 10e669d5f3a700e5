//! Function wiring records.
//!
//! A [`FunctionDef`] is pure wiring metadata: which algorithm runs, which
//! Node owns it, which Parameters it reads and writes, and any explicit
//! ordering dependencies. The executable body lives in the function
//! registry of the execution crate, keyed by [`AlgorithmId`].

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::id::{AlgorithmId, FunctionId, NodeId, ParameterId};

/// Scheduling priority used as a tie-break inside one batch.
///
/// Lower values run first within a batch: normal work is placed before
/// high-priority work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Priority(pub i32);

impl Priority {
    pub const NORMAL: Priority = Priority(0);
    pub const HIGH: Priority = Priority(1);
}

/// Wiring of one Function in the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDef {
    /// Unique identity for this Function.
    pub id: FunctionId,
    /// Which registered algorithm executes this Function.
    pub algorithm: AlgorithmId,
    /// Node owning the Function (and its controlling Parameter).
    pub node: NodeId,
    /// The controlling Parameter: the document cell addressing this Function.
    pub parameter: ParameterId,
    /// Input Parameters in declaration order.
    pub inputs: SmallVec<[ParameterId; 4]>,
    /// Output Parameters in declaration order.
    pub outputs: SmallVec<[ParameterId; 4]>,
    /// Explicit ordering dependencies: Functions that must complete before
    /// this one even without a shared Parameter.
    pub after: SmallVec<[FunctionId; 2]>,
    /// Heavy Functions are deferred to explicit deployment.
    pub heavy: bool,
    /// Tie-break inside a batch.
    pub priority: Priority,
}

impl FunctionDef {
    /// Creates a Function with no inputs, outputs or ordering dependencies.
    pub fn new(id: FunctionId, algorithm: AlgorithmId, node: NodeId, parameter: ParameterId) -> Self {
        FunctionDef {
            id,
            algorithm,
            node,
            parameter,
            inputs: SmallVec::new(),
            outputs: SmallVec::new(),
            after: SmallVec::new(),
            heavy: false,
            priority: Priority::NORMAL,
        }
    }

    /// Returns `true` if this Function reads `id`.
    pub fn reads(&self, id: ParameterId) -> bool {
        self.inputs.contains(&id)
    }

    /// Returns `true` if this Function writes `id`.
    pub fn writes(&self, id: ParameterId) -> bool {
        self.outputs.contains(&id)
    }

    /// All Parameters belonging to this Function: the controlling cell
    /// followed by inputs and outputs, without duplicates.
    pub fn owned_parameters(&self) -> Vec<ParameterId> {
        let mut owned = Vec::with_capacity(1 + self.inputs.len() + self.outputs.len());
        owned.push(self.parameter);
        for id in self.inputs.iter().chain(self.outputs.iter()) {
            if !owned.contains(id) {
                owned.push(*id);
            }
        }
        owned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(node: u32, local: u32) -> ParameterId {
        ParameterId::new(NodeId(node), local)
    }

    #[test]
    fn normal_priority_sorts_before_high() {
        assert!(Priority::NORMAL < Priority::HIGH);
        assert_eq!(Priority::default(), Priority::NORMAL);
    }

    #[test]
    fn owned_parameters_deduplicates() {
        let mut f = FunctionDef::new(FunctionId(0), "copy".into(), NodeId(0), pid(0, 0));
        f.inputs.push(pid(0, 1));
        f.outputs.push(pid(0, 2));
        f.outputs.push(pid(0, 1));
        assert_eq!(f.owned_parameters(), vec![pid(0, 0), pid(0, 1), pid(0, 2)]);
        assert!(f.reads(pid(0, 1)));
        assert!(f.writes(pid(0, 2)));
        assert!(!f.writes(pid(0, 0)));
    }
}
