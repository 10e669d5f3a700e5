//! The data-model façade.
//!
//! A [`Model`] owns one [`Document`] together with its
//! [`ExecutionContext`] and [`FunctionRegistry`]. The context is created in
//! [`Model::new`] and torn down in [`Model::close`], which hands the document
//! back.
//!
//! While the graph is frozen (a pass or a force operation is in flight),
//! every document edit made through the façade fails with
//! [`CoreError::Busy`] instead of waiting for the pass.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use depflow_core::{
    AlgorithmId, CoreError, Document, DocumentStore, FunctionId, GraphFreeze, Modification, NodeId,
    Parameter, ParameterId,
};
use depflow_graph::{check_dependency_graph, AnalyzerResult, DependencyGraph};

use crate::config::EngineConfig;
use crate::context::{ExecutionContext, Payload};
use crate::error::EngineError;
use crate::notifier::ProgressNotifier;
use crate::pass::{self, PassReport};
use crate::registry::{FunctionRegistry, TreeFunction};
use crate::task::{ExecutionTask, TaskHandle};

/// State shared between the façade and a detached pass.
pub(crate) struct Shared {
    document: RwLock<Document>,
    registry: RwLock<FunctionRegistry>,
    freeze: GraphFreeze,
    pub(crate) context: ExecutionContext,
}

impl Shared {
    fn read_document(&self) -> RwLockReadGuard<'_, Document> {
        self.document.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write_document(&self) -> RwLockWriteGuard<'_, Document> {
        self.document.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cheap copy of the registry (drivers are shared by `Arc`).
    pub(crate) fn registry_snapshot(&self) -> FunctionRegistry {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

pub struct Model {
    shared: Arc<Shared>,
}

impl Model {
    pub fn new(document: Document, registry: FunctionRegistry, config: EngineConfig) -> Self {
        let freeze = document.freeze_handle();
        let context = ExecutionContext::init(freeze.clone(), config);
        tracing::debug!(document = document.name(), "model opened");
        Model {
            shared: Arc::new(Shared {
                document: RwLock::new(document),
                registry: RwLock::new(registry),
                freeze,
                context,
            }),
        }
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.shared.context
    }

    pub fn config(&self) -> EngineConfig {
        *self.shared.context.config()
    }

    /// Registers a driver; see [`FunctionRegistry::register`].
    pub fn register<T>(&self, driver: T) -> Option<Arc<dyn TreeFunction>>
    where
        T: TreeFunction + 'static,
    {
        self.shared
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(driver)
    }

    // -----------------------------------------------------------------------
    // Document access
    // -----------------------------------------------------------------------

    /// Reads the document. Blocks while a pass holds it.
    pub fn read<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        f(&*self.shared.read_document())
    }

    /// Edits the document; refused with `Busy` while the graph is frozen.
    pub fn edit<R>(
        &self,
        f: impl FnOnce(&mut Document) -> Result<R, CoreError>,
    ) -> Result<R, EngineError> {
        if self.shared.freeze.is_frozen() {
            return Err(CoreError::Busy.into());
        }
        let mut doc = self.shared.write_document();
        Ok(f(&mut *doc)?)
    }

    pub fn parameter(&self, id: ParameterId) -> Option<Parameter> {
        self.read(|doc| doc.parameter(id).cloned())
    }

    /// Adds a Function driven by `algorithm`, taking its heavy flag and
    /// priority from the registered driver.
    pub fn add_function(
        &self,
        node: NodeId,
        algorithm: &AlgorithmId,
    ) -> Result<FunctionId, EngineError> {
        let driver = self
            .shared
            .registry_snapshot()
            .get(algorithm)
            .ok_or_else(|| EngineError::UnknownAlgorithm {
                algorithm: algorithm.clone(),
            })?;
        self.edit(|doc| {
            doc.add_function(
                node,
                algorithm.clone(),
                driver.is_heavy(),
                driver.priority(),
            )
        })
    }

    pub fn open_transaction(&self) -> Result<(), EngineError> {
        self.edit(|doc| doc.open_transaction())
    }

    /// Commits and releases the transaction payload.
    pub fn commit_transaction(&self) -> Result<(), EngineError> {
        self.edit(|doc| doc.commit_transaction())?;
        self.shared.context.release_payload();
        Ok(())
    }

    /// Aborts (clearing the Ledger) and releases the transaction payload.
    pub fn abort_transaction(&self) -> Result<(), EngineError> {
        self.edit(|doc| doc.abort_transaction())?;
        self.shared.context.release_payload();
        Ok(())
    }

    pub fn modify(
        &self,
        id: ParameterId,
        value: serde_json::Value,
        modification: Modification,
    ) -> Result<(), EngineError> {
        self.edit(|doc| doc.modify(id, value, modification))
    }

    pub fn touch(&self, id: ParameterId, modification: Modification) -> Result<(), EngineError> {
        self.edit(|doc| doc.touch(id, modification))
    }

    // -----------------------------------------------------------------------
    // Graph analysis
    // -----------------------------------------------------------------------

    /// Builds the dependency graph without executing anything.
    pub fn rebuild_graph_view(&self) -> Result<DependencyGraph, EngineError> {
        let doc = self.shared.read_document();
        Ok(DependencyGraph::build(Some(&*doc))?)
    }

    /// Health check; never executes anything.
    pub fn check_dependency_graph(&self) -> AnalyzerResult {
        let config = self.config();
        let doc = self.shared.read_document();
        check_dependency_graph(
            Some(&*doc),
            config.cycle_strategy,
            config.enrich_cycle_report,
        )
    }

    // -----------------------------------------------------------------------
    // Force operations
    // -----------------------------------------------------------------------

    /// Freezes the graph around `f`.
    fn with_frozen<R>(
        &self,
        f: impl FnOnce(&mut Document, &ExecutionContext, &FunctionRegistry) -> R,
    ) -> Result<R, EngineError> {
        let context = &self.shared.context;
        context.freeze_graph()?;
        let registry = self.shared.registry_snapshot();
        let result = {
            let mut doc = self.shared.write_document();
            f(&mut *doc, context, &registry)
        };
        context.unfreeze_graph();
        Ok(result)
    }

    /// Re-executes one Function regardless of its Pending state.
    pub fn force_function(&self, function: FunctionId) -> Result<(), EngineError> {
        let notifier = self.shared.context.active_notifier();
        self.with_frozen(|doc, context, registry| {
            pass::force_function(doc, context, registry, function, notifier.as_ref())
        })?
    }

    /// Deploys the heavy Function controlled by `parameter`.
    pub fn force_deploy_heavy(&self, parameter: ParameterId) -> Result<FunctionId, EngineError> {
        let notifier = self.shared.context.active_notifier();
        self.with_frozen(|doc, context, registry| {
            pass::force_deploy_heavy(doc, context, registry, parameter, notifier.as_ref())
        })?
    }

    /// Deploys every queued heavy Function in document order, publishing a
    /// terminal status on `notifier` (a fresh one when absent) and progress
    /// while the notifier switch is On.
    ///
    /// Like [`launch`](Self::launch), `notifier` must be Idle and is only
    /// installed on the context once the graph is frozen.
    pub fn force_deploy_all_heavy(
        &self,
        notifier: Option<ProgressNotifier>,
    ) -> Result<PassReport, EngineError> {
        let context = &self.shared.context;
        context.freeze_graph()?;
        let install = notifier.is_some();
        let notifier = notifier.unwrap_or_default();
        if !notifier.begin() {
            context.unfreeze_graph();
            return Err(EngineError::NotifierSpent {
                status: notifier.status(),
            });
        }
        if install {
            context.set_notifier(Some(notifier.clone()));
        }
        let registry = self.shared.registry_snapshot();
        let report = {
            let mut doc = self.shared.write_document();
            pass::force_deploy_all_heavy(&mut *doc, context, &registry, Some(&notifier))
        };
        context.unfreeze_graph();
        notifier.finish(report.status());
        Ok(report)
    }

    pub fn heavy_queue(&self) -> Vec<ParameterId> {
        self.shared.context.heavy_queue()
    }

    // -----------------------------------------------------------------------
    // Notifier and freeze switches
    // -----------------------------------------------------------------------

    pub fn set_notifier(&self, notifier: Option<ProgressNotifier>) {
        self.shared.context.set_notifier(notifier);
    }

    pub fn notifier(&self) -> Option<ProgressNotifier> {
        self.shared.context.notifier()
    }

    pub fn enable_notifier(&self, on: bool) {
        self.shared.context.enable_notifier(on);
    }

    pub fn is_notifier_enabled(&self) -> bool {
        self.shared.context.is_notifier_enabled()
    }

    pub fn freeze_graph(&self) -> Result<(), EngineError> {
        self.shared.context.freeze_graph()
    }

    pub fn unfreeze_graph(&self) -> bool {
        self.shared.context.unfreeze_graph()
    }

    pub fn is_graph_frozen(&self) -> bool {
        self.shared.context.is_graph_frozen()
    }

    // -----------------------------------------------------------------------
    // Passes
    // -----------------------------------------------------------------------

    /// Launches a pass; see [`ExecutionTask::launch`].
    pub fn launch(
        &self,
        notifier: Option<ProgressNotifier>,
        payload: Option<Payload>,
    ) -> Result<TaskHandle, EngineError> {
        ExecutionTask::launch(Some(self), notifier, payload)
    }

    pub fn last_report(&self) -> Option<PassReport> {
        self.shared.context.last_report()
    }

    /// Tears down the execution context and returns the document.
    ///
    /// Like `Arc::try_unwrap`, hands the model back unchanged while a pass is
    /// in flight or a detached worker still holds it.
    pub fn close(self) -> Result<Document, Model> {
        if self.is_graph_frozen() {
            return Err(self);
        }
        let shared = Arc::try_unwrap(self.shared).map_err(|shared| Model { shared })?;
        shared.context.teardown();
        tracing::debug!("model closed");
        Ok(shared
            .document
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner))
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("context", &self.shared.context)
            .finish_non_exhaustive()
    }
}
