//! Stable ID newtypes for document entities.
//!
//! Nodes and Functions are addressed by distinct newtype wrappers over
//! `u32`. Parameters use an owner-scoped global id ([`ParameterId`]): the
//! owning Node plus a Node-local index, so two Nodes can both own a
//! Parameter `1` without colliding.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of a Node (the entity owning Parameters and Functions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Stable identifier of a Function within its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

/// Global id of a Parameter: owning Node plus Node-local index.
///
/// Ordering is by Node first, then local index, which keeps reports sorted
/// by owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParameterId {
    /// The Node owning this Parameter.
    pub node: NodeId,
    /// Index of the Parameter among its Node's children.
    pub local: u32,
}

impl ParameterId {
    /// Creates a Parameter id from its owner and local index.
    pub fn new(node: NodeId, local: u32) -> Self {
        ParameterId { node, local }
    }
}

/// Identifier of a Function algorithm (the key into the function registry).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AlgorithmId(String);

impl AlgorithmId {
    pub fn new(id: impl Into<String>) -> Self {
        AlgorithmId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AlgorithmId {
    fn from(id: &str) -> Self {
        AlgorithmId::new(id)
    }
}

// Display implementations -- ids print compactly for logs and reports.

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node.0, self.local)
    }
}

impl fmt::Display for AlgorithmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
