//! Function drivers and their registry.
//!
//! Every Function in a document names an algorithm; the [`FunctionRegistry`]
//! maps that identifier to a [`TreeFunction`] driver. Drivers are registered
//! at startup and shared as `Arc<dyn TreeFunction>`.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use depflow_core::{AlgorithmId, FunctionDef, Parameter, Priority};

use crate::context::ExecutionContext;
use crate::error::FunctionError;
use crate::notifier::ProgressNotifier;

/// A computation driver bound to an algorithm identifier.
pub trait TreeFunction: Send + Sync {
    fn algorithm(&self) -> AlgorithmId;

    /// Heavy Functions are deferred in normal passes and only run on an
    /// explicit deployment.
    fn is_heavy(&self) -> bool {
        false
    }

    fn priority(&self) -> Priority {
        Priority::NORMAL
    }

    /// Returns `true` when the Function must run in every pass, whether or
    /// not the Ledger marks it.
    fn must_execute_intact(&self, _inputs: &[Parameter], _outputs: &[Parameter]) -> bool {
        false
    }

    /// Runs the body. Reads come from [`FunctionCall::inputs`], results go
    /// to [`FunctionCall::set_output`].
    fn execute(&self, call: &mut FunctionCall<'_>) -> Result<(), FunctionError>;
}

/// Everything a body sees while it runs.
///
/// Inputs and Outputs are snapshots taken just before the call; Output
/// values written here are stored back into the document only when the
/// body succeeds.
pub struct FunctionCall<'a> {
    function: &'a FunctionDef,
    inputs: Vec<Parameter>,
    outputs: Vec<Parameter>,
    context: &'a ExecutionContext,
    notifier: Option<&'a ProgressNotifier>,
}

impl<'a> FunctionCall<'a> {
    pub(crate) fn new(
        function: &'a FunctionDef,
        inputs: Vec<Parameter>,
        outputs: Vec<Parameter>,
        context: &'a ExecutionContext,
        notifier: Option<&'a ProgressNotifier>,
    ) -> Self {
        FunctionCall {
            function,
            inputs,
            outputs,
            context,
            notifier,
        }
    }

    pub fn function(&self) -> &FunctionDef {
        self.function
    }

    pub fn inputs(&self) -> &[Parameter] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Parameter] {
        &self.outputs
    }

    /// The numeric payload of Input `index`.
    pub fn input_f64(&self, index: usize) -> Result<f64, FunctionError> {
        let param = self
            .inputs
            .get(index)
            .ok_or_else(|| FunctionError::new(format!("no input #{index}")))?;
        param
            .as_f64()
            .ok_or_else(|| FunctionError::new(format!("input {} is not a number", param.id)))
    }

    /// Writes Output `index`.
    pub fn set_output(
        &mut self,
        index: usize,
        value: impl Into<serde_json::Value>,
    ) -> Result<(), FunctionError> {
        let param = self
            .outputs
            .get_mut(index)
            .ok_or_else(|| FunctionError::new(format!("no output #{index}")))?;
        param.set_value(value.into());
        Ok(())
    }

    pub fn context(&self) -> &ExecutionContext {
        self.context
    }

    /// Side data bound to this Function's algorithm.
    pub fn side_data<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.context.side_data::<T>(&self.function.algorithm)
    }

    pub fn notifier(&self) -> Option<&ProgressNotifier> {
        self.notifier
    }

    pub fn is_cancelled(&self) -> bool {
        self.notifier.is_some_and(|n| n.is_cancelled())
    }

    pub(crate) fn into_outputs(self) -> Vec<Parameter> {
        self.outputs
    }
}

type Body = dyn Fn(&mut FunctionCall<'_>) -> Result<(), FunctionError> + Send + Sync;
type IntactRule = dyn Fn(&[Parameter], &[Parameter]) -> bool + Send + Sync;

/// A driver built from closures.
pub struct ClosureFunction {
    algorithm: AlgorithmId,
    heavy: bool,
    priority: Priority,
    body: Box<Body>,
    intact: Option<Box<IntactRule>>,
}

impl ClosureFunction {
    pub fn new<F>(algorithm: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut FunctionCall<'_>) -> Result<(), FunctionError> + Send + Sync + 'static,
    {
        ClosureFunction {
            algorithm: AlgorithmId::new(algorithm),
            heavy: false,
            priority: Priority::NORMAL,
            body: Box::new(body),
            intact: None,
        }
    }

    pub fn heavy(mut self) -> Self {
        self.heavy = true;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_intact_rule<F>(mut self, rule: F) -> Self
    where
        F: Fn(&[Parameter], &[Parameter]) -> bool + Send + Sync + 'static,
    {
        self.intact = Some(Box::new(rule));
        self
    }
}

impl fmt::Debug for ClosureFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureFunction")
            .field("algorithm", &self.algorithm)
            .field("heavy", &self.heavy)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

impl TreeFunction for ClosureFunction {
    fn algorithm(&self) -> AlgorithmId {
        self.algorithm.clone()
    }

    fn is_heavy(&self) -> bool {
        self.heavy
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn must_execute_intact(&self, inputs: &[Parameter], outputs: &[Parameter]) -> bool {
        self.intact.as_ref().is_some_and(|rule| rule(inputs, outputs))
    }

    fn execute(&self, call: &mut FunctionCall<'_>) -> Result<(), FunctionError> {
        (self.body)(call)
    }
}

/// Algorithm identifier -> driver.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    drivers: IndexMap<AlgorithmId, Arc<dyn TreeFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a driver under its own algorithm identifier, returning the
    /// driver it replaces.
    pub fn register<T>(&mut self, driver: T) -> Option<Arc<dyn TreeFunction>>
    where
        T: TreeFunction + 'static,
    {
        self.register_arc(Arc::new(driver))
    }

    pub fn register_arc(&mut self, driver: Arc<dyn TreeFunction>) -> Option<Arc<dyn TreeFunction>> {
        self.drivers.insert(driver.algorithm(), driver)
    }

    pub fn get(&self, algorithm: &AlgorithmId) -> Option<Arc<dyn TreeFunction>> {
        self.drivers.get(algorithm).cloned()
    }

    pub fn contains(&self, algorithm: &AlgorithmId) -> bool {
        self.drivers.contains_key(algorithm)
    }

    /// Registered identifiers in registration order.
    pub fn algorithms(&self) -> impl Iterator<Item = &AlgorithmId> {
        self.drivers.keys()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.drivers.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str) -> ClosureFunction {
        ClosureFunction::new(name, |_| Ok(()))
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = FunctionRegistry::new();
        assert!(registry.register(noop("copy")).is_none());
        assert!(registry.contains(&AlgorithmId::new("copy")));
        assert!(registry.get(&AlgorithmId::new("missing")).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn re_registering_replaces_driver() {
        let mut registry = FunctionRegistry::new();
        registry.register(noop("copy"));
        let previous = registry.register(noop("copy").heavy());
        assert!(previous.is_some_and(|d| !d.is_heavy()));
        assert!(registry
            .get(&AlgorithmId::new("copy"))
            .is_some_and(|d| d.is_heavy()));
    }

    #[test]
    fn closure_driver_settings() {
        let driver = noop("sum")
            .with_priority(Priority::HIGH)
            .with_intact_rule(|inputs, _| inputs.is_empty());
        assert_eq!(driver.priority(), Priority::HIGH);
        assert!(!driver.is_heavy());
        assert!(driver.must_execute_intact(&[], &[]));
        assert_eq!(driver.algorithm(), AlgorithmId::new("sum"));
    }
}
