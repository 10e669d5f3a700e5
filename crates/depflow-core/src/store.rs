//! The [`DocumentStore`] trait: what the engine consumes from the document.
//!
//! The engine never owns Parameters or Functions. It reads the Function
//! wiring and Parameter state through this contract, writes the Valid and
//! Pending flags and computed payloads back, and reads/clears the Ledger.
//! [`Document`](crate::Document) is the in-memory backend; persistent
//! backends implement the same trait.

use crate::error::CoreError;
use crate::function::FunctionDef;
use crate::id::{FunctionId, NodeId, ParameterId};
use crate::ledger::{LogBook, Modification};
use crate::parameter::Parameter;

/// The storage contract consumed by the dependency engine.
///
/// The trait is synchronous; callers needing shared access wrap the store
/// in a lock.
pub trait DocumentStore {
    // -------------------------------------------------------------------
    // Function wiring (read-only)
    // -------------------------------------------------------------------

    /// All Functions in document order.
    fn functions(&self) -> Vec<&FunctionDef>;

    /// Looks up a Function by id.
    fn function(&self, id: FunctionId) -> Option<&FunctionDef>;

    // -------------------------------------------------------------------
    // Parameters
    // -------------------------------------------------------------------

    /// Looks up a Parameter by global id.
    fn parameter(&self, id: ParameterId) -> Option<&Parameter>;

    /// Ids of every Parameter owned by `node`, in creation order.
    fn node_parameters(&self, node: NodeId) -> Vec<ParameterId>;

    /// Writes the {Valid, Pending} state of a Parameter.
    fn set_parameter_state(
        &mut self,
        id: ParameterId,
        valid: bool,
        pending: bool,
    ) -> Result<(), CoreError>;

    /// Stores a computed payload. Does not touch the Ledger.
    fn store_value(&mut self, id: ParameterId, value: serde_json::Value) -> Result<(), CoreError>;

    // -------------------------------------------------------------------
    // Ledger
    // -------------------------------------------------------------------

    /// The modification Ledger of the current transaction scope.
    fn ledger(&self) -> &LogBook;

    /// Records an engine-side modification (no transaction required).
    fn record_modification(
        &mut self,
        id: ParameterId,
        modification: Modification,
    ) -> Result<(), CoreError>;

    /// Clears the Ledger in bulk.
    fn clear_ledger(&mut self);

    // -------------------------------------------------------------------
    // Convenience
    // -------------------------------------------------------------------

    /// Clones the Parameters behind `ids`, failing on the first unknown id.
    fn snapshot(&self, ids: &[ParameterId]) -> Result<Vec<Parameter>, CoreError> {
        ids.iter()
            .map(|id| {
                self.parameter(*id)
                    .cloned()
                    .ok_or(CoreError::ParameterNotFound { id: *id })
            })
            .collect()
    }

    /// The Function producing `id` as an Output, if any.
    fn producer_of(&self, id: ParameterId) -> Option<FunctionId> {
        self.functions()
            .into_iter()
            .find(|f| f.writes(id))
            .map(|f| f.id)
    }
}
