//! Parameters: typed, independently addressable data cells owned by a Node.
//!
//! The payload is kept opaque as a `serde_json::Value`; concrete payload
//! types (arrays, meshes, shapes) belong to the embedding application. The
//! engine only reads and writes the Valid and Pending flags and moves
//! payloads between the document and Function bodies.

use serde::{Deserialize, Serialize};

use crate::id::ParameterId;

/// Type tag of a Parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    Integer,
    Real,
    Boolean,
    Text,
    RealArray,
    /// Reference to another document entity.
    Reference,
    /// The controlling cell of a Function.
    TreeFunction,
    /// Application-defined payload type.
    Custom(String),
}

/// A single Parameter cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Global id (owning Node + local index).
    pub id: ParameterId,
    /// Human-readable name, unique only for diagnostics.
    pub name: String,
    /// Payload type tag.
    pub type_tag: TypeTag,
    /// Opaque payload.
    pub value: serde_json::Value,
    /// `true` once the payload holds a meaningful value.
    pub valid: bool,
    /// `true` while an upstream change has not yet been recomputed into this
    /// cell by its producing Function.
    pub pending: bool,
}

impl Parameter {
    /// Creates an empty, invalid, non-pending Parameter.
    pub fn new(id: ParameterId, name: impl Into<String>, type_tag: TypeTag) -> Self {
        Parameter {
            id,
            name: name.into(),
            type_tag,
            value: serde_json::Value::Null,
            valid: false,
            pending: false,
        }
    }

    /// Returns the payload as an `f64`, if it is a JSON number.
    pub fn as_f64(&self) -> Option<f64> {
        self.value.as_f64()
    }

    /// Returns the payload as an `i64`, if it is an integral JSON number.
    pub fn as_i64(&self) -> Option<i64> {
        self.value.as_i64()
    }

    /// Replaces the payload and marks the cell valid and up to date.
    pub fn set_value(&mut self, value: serde_json::Value) {
        self.value = value;
        self.valid = true;
        self.pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::NodeId;
    use serde_json::json;

    #[test]
    fn new_parameter_is_invalid_and_idle() {
        let p = Parameter::new(ParameterId::new(NodeId(0), 0), "x", TypeTag::Real);
        assert!(!p.valid);
        assert!(!p.pending);
        assert!(p.value.is_null());
    }

    #[test]
    fn set_value_validates_and_clears_pending() {
        let mut p = Parameter::new(ParameterId::new(NodeId(0), 0), "x", TypeTag::Real);
        p.pending = true;
        p.set_value(json!(2.5));
        assert!(p.valid);
        assert!(!p.pending);
        assert_eq!(p.as_f64(), Some(2.5));
    }
}
