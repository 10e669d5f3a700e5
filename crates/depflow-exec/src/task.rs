//! Launching a pass as a task.
//!
//! [`ExecutionTask::launch`] freezes the graph and flips the notifier to
//! Running on the caller's thread before anything else happens, so a caller
//! polling the returned handle never observes Idle. The pass then runs
//! either right there ([`LaunchMode::Blocking`]) or on a tokio blocking
//! worker ([`LaunchMode::Detached`]). Both modes are observed through the
//! same [`TaskHandle`], and exactly one terminal status is published:
//! Cancelled > Failed > Succeeded.

use std::sync::Arc;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::context::Payload;
use crate::error::EngineError;
use crate::model::{Model, Shared};
use crate::notifier::{ProgressNotifier, TaskStatus};
use crate::pass::{run_pass, PassReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    /// Runs on the caller's thread; the handle is terminal on return.
    Blocking,
    /// Runs on a blocking worker of the current tokio runtime.
    Detached,
}

/// Handle to a launched pass.
#[derive(Debug)]
pub struct TaskHandle {
    id: Uuid,
    mode: LaunchMode,
    notifier: ProgressNotifier,
    join: Option<JoinHandle<PassReport>>,
    report: Option<PassReport>,
}

impl TaskHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> LaunchMode {
        self.mode
    }

    pub fn notifier(&self) -> &ProgressNotifier {
        &self.notifier
    }

    pub fn status(&self) -> TaskStatus {
        self.notifier.status()
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }

    /// Requests cooperative cancellation.
    pub fn cancel(&self) {
        self.notifier.cancel();
    }

    /// The report of a blocking launch.
    pub fn report(&self) -> Option<&PassReport> {
        self.report.as_ref()
    }

    /// Waits for the pass to end and returns its report.
    pub async fn wait(self) -> Result<PassReport, EngineError> {
        match (self.join, self.report) {
            (Some(join), _) => join.await.map_err(|err| EngineError::Join {
                message: err.to_string(),
            }),
            (None, Some(report)) => Ok(report),
            (None, None) => Err(EngineError::Join {
                message: "task has neither a worker nor a report".to_string(),
            }),
        }
    }
}

/// Entry point for running a pass over a model.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionTask;

impl ExecutionTask {
    /// Launches one pass over `model`.
    ///
    /// `notifier`, when given, tracks this run and is installed on the
    /// model's context; the notifier switch is not touched. Without one the
    /// task gets a fresh notifier of its own. Progress is reported only while
    /// the switch is On. `payload` is made available to the pass as the
    /// transaction payload.
    ///
    /// Fails with [`EngineError::NoGraph`] when `model` is absent,
    /// [`EngineError::NoRuntime`] for a detached launch outside a tokio
    /// runtime, [`EngineError::Busy`] while another pass is in flight, and
    /// [`EngineError::NotifierSpent`] when `notifier` is no longer Idle.
    #[tracing::instrument(skip_all)]
    pub fn launch(
        model: Option<&Model>,
        notifier: Option<ProgressNotifier>,
        payload: Option<Payload>,
    ) -> Result<TaskHandle, EngineError> {
        let model = model.ok_or(EngineError::NoGraph)?;
        let shared = model.shared();
        let context = &shared.context;

        let mode = if context.config().detach {
            LaunchMode::Detached
        } else {
            LaunchMode::Blocking
        };
        let runtime = match mode {
            LaunchMode::Detached => Some(Handle::try_current().map_err(|_| EngineError::NoRuntime)?),
            LaunchMode::Blocking => None,
        };

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
        if let Some(payload) = payload {
            context.set_payload(payload);
        }

        let id = Uuid::new_v4();
        tracing::info!(task = %id, mode = ?mode, "launching pass");

        let (join, report) = match runtime {
            None => (None, Some(run_task(shared, &notifier))),
            Some(runtime) => {
                let shared = Arc::clone(shared);
                let worker = notifier.clone();
                let join = runtime.spawn_blocking(move || run_task(&shared, &worker));
                (Some(join), None)
            }
        };

        Ok(TaskHandle {
            id,
            mode,
            notifier,
            join,
            report,
        })
    }
}

/// Runs the pass, unfreezes the graph, then publishes the terminal status.
fn run_task(shared: &Shared, notifier: &ProgressNotifier) -> PassReport {
    let registry = shared.registry_snapshot();
    let report = {
        let mut doc = shared.write_document();
        run_pass(&mut *doc, &shared.context, &registry, Some(notifier))
    };
    shared.context.unfreeze_graph();

    let status = report.status();
    notifier.finish(status);
    tracing::info!(status = ?status, "pass task finished");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::registry::{ClosureFunction, FunctionRegistry};
    use depflow_core::{AlgorithmId, Document, Modification, Priority, TypeTag};
    use serde_json::json;

    fn model(config: EngineConfig) -> Model {
        let mut registry = FunctionRegistry::new();
        registry.register(ClosureFunction::new("double", |call| {
            let x = call.input_f64(0)?;
            call.set_output(0, x * 2.0)
        }));
        let mut doc = Document::new("task");
        let node = doc.add_node("n").unwrap();
        let input = doc.add_parameter(node, "x", TypeTag::Real).unwrap();
        let output = doc.add_parameter(node, "y", TypeTag::Real).unwrap();
        let f = doc
            .add_function(node, AlgorithmId::new("double"), false, Priority::NORMAL)
            .unwrap();
        doc.connect_input(f, input).unwrap();
        doc.connect_output(f, output).unwrap();
        doc.open_transaction().unwrap();
        doc.modify(input, json!(21.0), Modification::Touched).unwrap();
        doc.commit_transaction().unwrap();
        Model::new(doc, registry, config)
    }

    #[test]
    fn blocking_launch_is_terminal_on_return() {
        let m = model(EngineConfig::default());
        let handle = ExecutionTask::launch(Some(&m), None, None).unwrap();
        assert_eq!(handle.mode(), LaunchMode::Blocking);
        assert_eq!(handle.status(), TaskStatus::Succeeded);
        assert_eq!(handle.report().map(|r| r.executed.len()), Some(1));
        assert!(!m.is_graph_frozen());
    }

    #[test]
    fn absent_model_is_no_graph() {
        let err = ExecutionTask::launch(None, None, None).unwrap_err();
        assert_eq!(err, EngineError::NoGraph);
    }

    #[test]
    fn detached_launch_without_runtime() {
        let m = model(EngineConfig::default().with_detach(true));
        let err = ExecutionTask::launch(Some(&m), None, None).unwrap_err();
        assert_eq!(err, EngineError::NoRuntime);
        assert!(!m.is_graph_frozen());
    }

    #[test]
    fn frozen_graph_is_busy() {
        let m = model(EngineConfig::default());
        m.freeze_graph().unwrap();
        let notifier = ProgressNotifier::new();
        let err = ExecutionTask::launch(Some(&m), Some(notifier.clone()), None).unwrap_err();
        assert_eq!(err, EngineError::Busy);
        assert_eq!(notifier.status(), TaskStatus::Idle);
    }

    #[test]
    fn spent_notifier_is_refused() {
        let m = model(EngineConfig::default());
        let notifier = ProgressNotifier::new();
        ExecutionTask::launch(Some(&m), Some(notifier.clone()), None).unwrap();
        assert_eq!(notifier.status(), TaskStatus::Succeeded);

        let err = ExecutionTask::launch(Some(&m), Some(notifier.clone()), None).unwrap_err();
        assert_eq!(
            err,
            EngineError::NotifierSpent {
                status: TaskStatus::Succeeded
            }
        );
        assert_eq!(notifier.status(), TaskStatus::Succeeded);
        assert!(!m.is_graph_frozen());
    }

    #[test]
    fn launch_leaves_notifier_switch_alone() {
        let m = model(EngineConfig::default());
        let notifier = ProgressNotifier::new();
        ExecutionTask::launch(Some(&m), Some(notifier.clone()), None).unwrap();
        assert!(!m.is_notifier_enabled());
        assert!(m.notifier().is_some());
        // Progress is only reported while the switch is On.
        assert_eq!(notifier.total(), 0);
    }

    #[test]
    fn payload_is_visible_to_context() {
        let m = model(EngineConfig::default());
        let payload: Payload = Arc::new("undo-group-7".to_string());
        ExecutionTask::launch(Some(&m), None, Some(payload)).unwrap();
        let seen = m.context().payload().and_then(|p| p.downcast::<String>().ok());
        assert_eq!(seen.as_deref().map(String::as_str), Some("undo-group-7"));
    }
}
