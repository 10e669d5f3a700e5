//! In-memory document: Nodes, their Parameters, Function wiring and the
//! Ledger.
//!
//! [`Document`] is the single entry point for building and mutating a
//! document. Wiring mutations (Nodes, Parameters, Functions, connections)
//! check the shared [`GraphFreeze`] flag and fail with
//! [`CoreError::Busy`] while a pass is in flight. Parameter writes go
//! through transactions so the Ledger stays scoped to one top-level
//! transaction.

use indexmap::IndexMap;

use crate::error::CoreError;
use crate::freeze::GraphFreeze;
use crate::function::{FunctionDef, Priority};
use crate::id::{AlgorithmId, FunctionId, NodeId, ParameterId};
use crate::ledger::{LogBook, Modification};
use crate::parameter::{Parameter, TypeTag};
use crate::store::DocumentStore;

/// A Node and the Parameters it owns.
#[derive(Debug, Clone)]
struct NodeEntry {
    name: String,
    parameters: IndexMap<u32, Parameter>,
    next_local: u32,
}

/// The in-memory document backend.
#[derive(Debug)]
pub struct Document {
    name: String,
    /// Nodes indexed by NodeId, in creation order.
    nodes: IndexMap<NodeId, NodeEntry>,
    /// Functions indexed by FunctionId, in document order.
    functions: IndexMap<FunctionId, FunctionDef>,
    ledger: LogBook,
    transaction_open: bool,
    freeze: GraphFreeze,
    next_node_id: u32,
    next_function_id: u32,
}

impl Document {
    /// Creates an empty document.
    pub fn new(name: &str) -> Self {
        Document {
            name: name.to_string(),
            nodes: IndexMap::new(),
            functions: IndexMap::new(),
            ledger: LogBook::new(),
            transaction_open: false,
            freeze: GraphFreeze::new(),
            next_node_id: 0,
            next_function_id: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle to this document's GraphFrozen flag.
    pub fn freeze_handle(&self) -> GraphFreeze {
        self.freeze.clone()
    }

    fn ensure_unfrozen(&self) -> Result<(), CoreError> {
        if self.freeze.is_frozen() {
            return Err(CoreError::Busy);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Nodes and Parameters
    // -----------------------------------------------------------------------

    /// Adds an empty Node.
    pub fn add_node(&mut self, name: &str) -> Result<NodeId, CoreError> {
        self.ensure_unfrozen()?;
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        self.nodes.insert(
            id,
            NodeEntry {
                name: name.to_string(),
                parameters: IndexMap::new(),
                next_local: 0,
            },
        );
        Ok(id)
    }

    /// Returns the name of a Node.
    pub fn node_name(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(&id).map(|n| n.name.as_str())
    }

    /// Adds a Parameter as the next child of `node`.
    pub fn add_parameter(
        &mut self,
        node: NodeId,
        name: &str,
        type_tag: TypeTag,
    ) -> Result<ParameterId, CoreError> {
        self.ensure_unfrozen()?;
        let entry = self
            .nodes
            .get_mut(&node)
            .ok_or(CoreError::NodeNotFound { id: node })?;
        let id = ParameterId::new(node, entry.next_local);
        entry.next_local += 1;
        entry
            .parameters
            .insert(id.local, Parameter::new(id, name, type_tag));
        Ok(id)
    }

    fn parameter_mut(&mut self, id: ParameterId) -> Result<&mut Parameter, CoreError> {
        self.nodes
            .get_mut(&id.node)
            .and_then(|n| n.parameters.get_mut(&id.local))
            .ok_or(CoreError::ParameterNotFound { id })
    }

    fn ensure_parameter(&self, id: ParameterId) -> Result<(), CoreError> {
        match self.parameter(id) {
            Some(_) => Ok(()),
            None => Err(CoreError::ParameterNotFound { id }),
        }
    }

    // -----------------------------------------------------------------------
    // Function wiring
    // -----------------------------------------------------------------------

    /// Adds a Function owned by `node`.
    ///
    /// Creates the controlling Parameter on `node` and an empty wiring
    /// record. Inputs, outputs and ordering dependencies are connected
    /// afterwards.
    pub fn add_function(
        &mut self,
        node: NodeId,
        algorithm: AlgorithmId,
        heavy: bool,
        priority: Priority,
    ) -> Result<FunctionId, CoreError> {
        self.ensure_unfrozen()?;
        let cell_name = format!("fn:{}", algorithm);
        let parameter = self.add_parameter(node, &cell_name, TypeTag::TreeFunction)?;

        let id = FunctionId(self.next_function_id);
        self.next_function_id += 1;

        let mut def = FunctionDef::new(id, algorithm, node, parameter);
        def.heavy = heavy;
        def.priority = priority;
        self.functions.insert(id, def);
        Ok(id)
    }

    fn function_mut(&mut self, id: FunctionId) -> Result<&mut FunctionDef, CoreError> {
        self.functions
            .get_mut(&id)
            .ok_or(CoreError::FunctionNotFound { id })
    }

    /// Appends `parameter` to the Inputs of `function`.
    pub fn connect_input(
        &mut self,
        function: FunctionId,
        parameter: ParameterId,
    ) -> Result<(), CoreError> {
        self.ensure_unfrozen()?;
        self.ensure_parameter(parameter)?;
        let def = self.function_mut(function)?;
        if def.reads(parameter) {
            return Err(CoreError::InvalidWiring {
                reason: format!("{} already reads {}", function, parameter),
            });
        }
        def.inputs.push(parameter);
        Ok(())
    }

    /// Appends `parameter` to the Outputs of `function`.
    ///
    /// A Parameter can be the Output of at most one Function.
    pub fn connect_output(
        &mut self,
        function: FunctionId,
        parameter: ParameterId,
    ) -> Result<(), CoreError> {
        self.ensure_unfrozen()?;
        self.ensure_parameter(parameter)?;
        if !self.functions.contains_key(&function) {
            return Err(CoreError::FunctionNotFound { id: function });
        }
        if let Some(producer) = self.producer_of(parameter) {
            return Err(CoreError::InvalidWiring {
                reason: format!("{} is already produced by {}", parameter, producer),
            });
        }
        self.function_mut(function)?.outputs.push(parameter);
        Ok(())
    }

    /// Removes `parameter` from the Inputs of `function`.
    pub fn disconnect_input(
        &mut self,
        function: FunctionId,
        parameter: ParameterId,
    ) -> Result<bool, CoreError> {
        self.ensure_unfrozen()?;
        let def = self.function_mut(function)?;
        let before = def.inputs.len();
        def.inputs.retain(|p| *p != parameter);
        Ok(def.inputs.len() != before)
    }

    /// Removes `parameter` from the Outputs of `function`.
    pub fn disconnect_output(
        &mut self,
        function: FunctionId,
        parameter: ParameterId,
    ) -> Result<bool, CoreError> {
        self.ensure_unfrozen()?;
        let def = self.function_mut(function)?;
        let before = def.outputs.len();
        def.outputs.retain(|p| *p != parameter);
        Ok(def.outputs.len() != before)
    }

    /// Declares that `function` must run after `dependency` completes.
    pub fn add_ordering(
        &mut self,
        function: FunctionId,
        dependency: FunctionId,
    ) -> Result<(), CoreError> {
        self.ensure_unfrozen()?;
        if !self.functions.contains_key(&dependency) {
            return Err(CoreError::FunctionNotFound { id: dependency });
        }
        let def = self.function_mut(function)?;
        if !def.after.contains(&dependency) {
            def.after.push(dependency);
        }
        Ok(())
    }

    /// Removes a Function and drops it from other Functions' ordering lists.
    ///
    /// The controlling Parameter stays on its Node.
    pub fn remove_function(&mut self, id: FunctionId) -> Result<FunctionDef, CoreError> {
        self.ensure_unfrozen()?;
        let removed = self
            .functions
            .shift_remove(&id)
            .ok_or(CoreError::FunctionNotFound { id })?;
        for def in self.functions.values_mut() {
            def.after.retain(|f| *f != id);
        }
        Ok(removed)
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// Finds the Function controlled by `parameter`.
    pub fn function_by_parameter(&self, parameter: ParameterId) -> Option<&FunctionDef> {
        self.functions.values().find(|f| f.parameter == parameter)
    }

    /// Position of a Function in document order.
    pub fn document_index(&self, id: FunctionId) -> Option<usize> {
        self.functions.get_index_of(&id)
    }

    // -----------------------------------------------------------------------
    // Transactions and Parameter writes
    // -----------------------------------------------------------------------

    /// Opens the top-level transaction.
    pub fn open_transaction(&mut self) -> Result<(), CoreError> {
        if self.transaction_open {
            return Err(CoreError::TransactionAlreadyOpen);
        }
        self.transaction_open = true;
        Ok(())
    }

    /// Commits the open transaction. The Ledger is kept for the next pass.
    pub fn commit_transaction(&mut self) -> Result<(), CoreError> {
        if !self.transaction_open {
            return Err(CoreError::NoActiveTransaction);
        }
        self.transaction_open = false;
        Ok(())
    }

    /// Aborts the open transaction and clears the Ledger.
    ///
    /// Payload changes are not rolled back here; that belongs to the undo
    /// log of the embedding document.
    pub fn abort_transaction(&mut self) -> Result<(), CoreError> {
        if !self.transaction_open {
            return Err(CoreError::NoActiveTransaction);
        }
        self.transaction_open = false;
        self.ledger.clear();
        Ok(())
    }

    pub fn has_open_transaction(&self) -> bool {
        self.transaction_open
    }

    /// Writes a Parameter payload inside the open transaction and records
    /// `modification` in the Ledger.
    pub fn modify(
        &mut self,
        id: ParameterId,
        value: serde_json::Value,
        modification: Modification,
    ) -> Result<(), CoreError> {
        if !self.transaction_open {
            return Err(CoreError::NoActiveTransaction);
        }
        self.parameter_mut(id)?.set_value(value);
        self.ledger.mark(id, modification);
        Ok(())
    }

    /// Marks a Parameter modified without changing its payload.
    pub fn touch(&mut self, id: ParameterId, modification: Modification) -> Result<(), CoreError> {
        if !self.transaction_open {
            return Err(CoreError::NoActiveTransaction);
        }
        self.ensure_parameter(id)?;
        self.ledger.mark(id, modification);
        Ok(())
    }
}

impl DocumentStore for Document {
    fn functions(&self) -> Vec<&FunctionDef> {
        self.functions.values().collect()
    }

    fn function(&self, id: FunctionId) -> Option<&FunctionDef> {
        self.functions.get(&id)
    }

    fn parameter(&self, id: ParameterId) -> Option<&Parameter> {
        self.nodes
            .get(&id.node)
            .and_then(|n| n.parameters.get(&id.local))
    }

    fn node_parameters(&self, node: NodeId) -> Vec<ParameterId> {
        self.nodes
            .get(&node)
            .map(|n| n.parameters.values().map(|p| p.id).collect())
            .unwrap_or_default()
    }

    fn set_parameter_state(
        &mut self,
        id: ParameterId,
        valid: bool,
        pending: bool,
    ) -> Result<(), CoreError> {
        let param = self.parameter_mut(id)?;
        param.valid = valid;
        param.pending = pending;
        Ok(())
    }

    fn store_value(&mut self, id: ParameterId, value: serde_json::Value) -> Result<(), CoreError> {
        self.parameter_mut(id)?.value = value;
        Ok(())
    }

    fn ledger(&self) -> &LogBook {
        &self.ledger
    }

    fn record_modification(
        &mut self,
        id: ParameterId,
        modification: Modification,
    ) -> Result<(), CoreError> {
        self.ensure_parameter(id)?;
        self.ledger.mark(id, modification);
        Ok(())
    }

    fn clear_ledger(&mut self) {
        self.ledger.clear();
    }
}
