//! One graph pass, plus the force operations built on the same machinery.
//!
//! # Pass
//!
//! 1. Build the [`DependencyGraph`]; an unusable document ends the pass as
//!    `NoGraph`.
//! 2. Run the cycle detector; a cyclic graph executes nothing and keeps the
//!    Ledger so the pass can be retried once the wiring is fixed.
//! 3. Compute the impact set from the Ledger and flag the Outputs of every
//!    impacted Function Pending.
//! 4. Drain the [`Scheduler`] batch by batch. Heavy Functions are deferred
//!    to the context's heavy queue; every other Function body runs with a
//!    snapshot of its Inputs and Outputs. A failing (or panicking) body is
//!    recorded and its downstream stays unexecuted; bookkeeping for the rest
//!    of the batch continues.
//! 5. Unless cancelled, clear the Ledger. Failed Functions are re-marked so
//!    the next pass retries them.
//!
//! Cancellation is checked between Functions (when
//! [`EngineConfig::cancel_per_function`](crate::EngineConfig) is set) and
//! once at the end of the pass. Parameter state committed by earlier
//! Functions is never rolled back.

use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;

use depflow_core::{CoreError, DocumentStore, FunctionDef, FunctionId, Modification, ParameterId};
use depflow_graph::{
    CycleDetector, DependencyGraph, ExecStatus, GraphState, ImpactAnalysis, Scheduler,
};

use crate::context::ExecutionContext;
use crate::error::{EngineError, FunctionError};
use crate::notifier::{ProgressNotifier, TaskStatus};
use crate::registry::{FunctionCall, FunctionRegistry};

/// Summary of one pass or heavy deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Graph health found at the start of the pass.
    pub state: GraphState,
    /// Functions whose body succeeded, in execution order.
    pub executed: Vec<FunctionId>,
    /// Functions whose body failed, with the failure message.
    pub failed: Vec<(FunctionId, String)>,
    /// Heavy Functions held back for deployment.
    pub deferred: Vec<FunctionId>,
    /// Number of scheduler batches processed.
    pub batches: usize,
    pub cancelled: bool,
}

impl PassReport {
    fn with_state(state: GraphState) -> Self {
        PassReport {
            state,
            ..PassReport::default()
        }
    }

    /// Terminal status: Cancelled > Failed > Succeeded.
    pub fn status(&self) -> TaskStatus {
        if self.cancelled {
            TaskStatus::Cancelled
        } else if !self.failed.is_empty() || self.state != GraphState::Ok {
            TaskStatus::Failed
        } else {
            TaskStatus::Succeeded
        }
    }
}

fn is_cancelled(notifier: Option<&ProgressNotifier>) -> bool {
    notifier.is_some_and(|n| n.is_cancelled())
}

fn must_execute_intact<D>(doc: &D, registry: &FunctionRegistry, def: &FunctionDef) -> bool
where
    D: DocumentStore + ?Sized,
{
    let Some(driver) = registry.get(&def.algorithm) else {
        return false;
    };
    let inputs = doc.snapshot(&def.inputs).unwrap_or_default();
    let outputs = doc.snapshot(&def.outputs).unwrap_or_default();
    driver.must_execute_intact(&inputs, &outputs)
}

/// Runs one pass over `doc`.
///
/// `notifier` is consulted for cancellation; progress is reported to it
/// only while the context's notifier switch is On.
#[tracing::instrument(skip_all)]
pub fn run_pass<D>(
    doc: &mut D,
    context: &ExecutionContext,
    registry: &FunctionRegistry,
    notifier: Option<&ProgressNotifier>,
) -> PassReport
where
    D: DocumentStore + ?Sized,
{
    let config = *context.config();
    let progress = notifier.filter(|_| context.is_notifier_enabled());

    let graph = match DependencyGraph::build(Some(&*doc)) {
        Ok(graph) => graph,
        Err(err) => {
            tracing::warn!(error = %err, "cannot build dependency graph");
            let report = PassReport::with_state(GraphState::NoGraph);
            context.set_last_report(report.clone());
            return report;
        }
    };

    let analysis = CycleDetector::new(&graph)
        .with_strategy(config.cycle_strategy)
        .enriched(config.enrich_cycle_report)
        .run(&*doc);
    let mut report = PassReport::with_state(analysis.state);
    if analysis.has_loops() {
        tracing::warn!(cycles = ?analysis.describe_cycles(), "refusing to run a cyclic graph");
        if let Some(p) = progress {
            p.message(format!("graph has {} cycle(s)", analysis.cycles.len()));
        }
        report.cancelled = is_cancelled(notifier);
        context.set_last_report(report.clone());
        return report;
    }

    let impact = ImpactAnalysis::analyze(&graph, &*doc, |def| {
        must_execute_intact(&*doc, registry, def)
    });
    for id in impact.pending_outputs(&graph, &*doc) {
        let valid = doc.parameter(id).is_some_and(|p| p.valid);
        if let Err(err) = doc.set_parameter_state(id, valid, true) {
            tracing::warn!(parameter = %id, error = %err, "cannot flag parameter pending");
        }
    }
    if let Some(p) = progress {
        p.set_total(impact.len());
    }
    tracing::info!(
        functions = graph.vertex_count(),
        impacted = impact.len(),
        "pass started"
    );

    let mut scheduler = Scheduler::new(&graph, impact.impacted().iter().copied(), config.batch_order);
    let mut visited = 0usize;
    'batches: loop {
        let batch = scheduler.current_batch();
        if batch.is_empty() {
            break;
        }
        report.batches += 1;

        for vertex in batch {
            if config.cancel_per_function && is_cancelled(notifier) {
                report.cancelled = true;
                break 'batches;
            }

            let Some(def) = graph
                .vertex(vertex)
                .and_then(|v| doc.function(v.function))
                .cloned()
            else {
                let _ = scheduler.set_status(vertex, ExecStatus::Failed);
                continue;
            };

            if def.heavy {
                let _ = scheduler.set_status(vertex, ExecStatus::Deferred);
                if context.enqueue_heavy(def.parameter) {
                    tracing::debug!(function = %def.id, "heavy function deferred");
                }
                report.deferred.push(def.id);
                visited += 1;
                if let Some(p) = progress {
                    p.advance();
                }
                continue;
            }

            let _ = scheduler.set_status(vertex, ExecStatus::Executing);
            match execute_function(doc, context, registry, &def, notifier) {
                Ok(()) => {
                    let _ = scheduler.set_status(vertex, ExecStatus::Done);
                    tracing::debug!(function = %def.id, algorithm = %def.algorithm, "executed");
                    report.executed.push(def.id);
                }
                Err(err) => {
                    let _ = scheduler.set_status(vertex, ExecStatus::Failed);
                    tracing::warn!(function = %def.id, error = %err, "function failed");
                    if let Some(p) = progress {
                        p.message(format!("{} failed: {}", def.id, err));
                    }
                    report.failed.push((def.id, err.message));
                }
            }
            visited += 1;
            if let Some(p) = progress {
                p.advance();
            }
        }
    }

    if is_cancelled(notifier) {
        report.cancelled = true;
    }

    if !report.cancelled {
        // Functions below a failed or deferred one were never reached.
        if let Some(p) = progress {
            p.set_total(visited);
        }
        doc.clear_ledger();
        for (function, _) in &report.failed {
            let Some(control) = doc.function(*function).map(|def| def.parameter) else {
                continue;
            };
            if let Err(err) = doc.record_modification(control, Modification::Impacted) {
                tracing::warn!(
                    function = %function,
                    parameter = %control,
                    error = %err,
                    "cannot re-mark failed function for retry"
                );
            }
        }
    }

    tracing::info!(
        executed = report.executed.len(),
        failed = report.failed.len(),
        deferred = report.deferred.len(),
        cancelled = report.cancelled,
        "pass finished"
    );
    context.set_last_report(report.clone());
    report
}

/// Runs one body and writes its Outputs back on success.
///
/// On failure the Outputs are left invalid and Pending.
pub(crate) fn execute_function<D>(
    doc: &mut D,
    context: &ExecutionContext,
    registry: &FunctionRegistry,
    def: &FunctionDef,
    notifier: Option<&ProgressNotifier>,
) -> Result<(), FunctionError>
where
    D: DocumentStore + ?Sized,
{
    let driver = registry.get(&def.algorithm).ok_or_else(|| {
        FunctionError::new(format!("no driver registered for algorithm {}", def.algorithm))
    })?;
    let inputs = doc.snapshot(&def.inputs)?;
    let outputs = doc.snapshot(&def.outputs)?;

    let mut call = FunctionCall::new(def, inputs, outputs, context, notifier);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| driver.execute(&mut call)))
        .unwrap_or_else(|payload| Err(FunctionError::from_panic(payload)));

    match outcome {
        Ok(()) => {
            for output in call.into_outputs() {
                doc.store_value(output.id, output.value)?;
                doc.set_parameter_state(output.id, true, false)?;
            }
            Ok(())
        }
        Err(err) => {
            for id in &def.outputs {
                let _ = doc.set_parameter_state(*id, false, true);
            }
            Err(err)
        }
    }
}

/// Runs one Function unconditionally and marks its Outputs Impacted so the
/// next pass recomputes its downstream.
pub fn force_function<D>(
    doc: &mut D,
    context: &ExecutionContext,
    registry: &FunctionRegistry,
    function: FunctionId,
    notifier: Option<&ProgressNotifier>,
) -> Result<(), EngineError>
where
    D: DocumentStore + ?Sized,
{
    let def = doc
        .function(function)
        .cloned()
        .ok_or(CoreError::FunctionNotFound { id: function })?;
    if !registry.contains(&def.algorithm) {
        return Err(EngineError::UnknownAlgorithm {
            algorithm: def.algorithm,
        });
    }

    execute_function(doc, context, registry, &def, notifier)
        .map_err(|source| EngineError::Execution { function, source })?;
    for id in &def.outputs {
        doc.record_modification(*id, Modification::Impacted)?;
    }
    if def.heavy {
        context.dequeue_heavy(def.parameter);
    }
    tracing::info!(function = %function, "forced execution");
    Ok(())
}

/// Deploys the heavy Function controlled by `parameter`.
pub fn force_deploy_heavy<D>(
    doc: &mut D,
    context: &ExecutionContext,
    registry: &FunctionRegistry,
    parameter: ParameterId,
    notifier: Option<&ProgressNotifier>,
) -> Result<FunctionId, EngineError>
where
    D: DocumentStore + ?Sized,
{
    let function = doc
        .functions()
        .into_iter()
        .find(|def| def.parameter == parameter && def.heavy)
        .map(|def| def.id)
        .ok_or(EngineError::NotHeavy { parameter })?;
    force_function(doc, context, registry, function, notifier)?;
    Ok(function)
}

/// Deploys every queued heavy Function in document order.
pub fn force_deploy_all_heavy<D>(
    doc: &mut D,
    context: &ExecutionContext,
    registry: &FunctionRegistry,
    notifier: Option<&ProgressNotifier>,
) -> PassReport
where
    D: DocumentStore + ?Sized,
{
    let progress = notifier.filter(|_| context.is_notifier_enabled());
    let queued = context.heavy_queue();
    let targets: Vec<(FunctionId, ParameterId)> = doc
        .functions()
        .into_iter()
        .filter(|def| def.heavy && queued.contains(&def.parameter))
        .map(|def| (def.id, def.parameter))
        .collect();

    // Entries whose Function is gone (or no longer heavy) are dropped.
    for parameter in &queued {
        if !targets.iter().any(|(_, p)| p == parameter) {
            context.dequeue_heavy(*parameter);
        }
    }

    let mut report = PassReport::with_state(GraphState::Ok);
    if !targets.is_empty() {
        report.batches = 1;
    }
    if let Some(p) = progress {
        p.set_total(targets.len());
    }

    for (function, _) in targets {
        if is_cancelled(notifier) {
            report.cancelled = true;
            break;
        }
        match force_function(doc, context, registry, function, notifier) {
            Ok(()) => {
                report.executed.push(function);
                if let Some(p) = progress {
                    p.message(format!("deployed {function}"));
                }
            }
            Err(err) => {
                tracing::warn!(function = %function, error = %err, "heavy deployment failed");
                let message = match err {
                    EngineError::Execution { source, .. } => source.message,
                    other => other.to_string(),
                };
                report.failed.push((function, message));
            }
        }
        if let Some(p) = progress {
            p.advance();
        }
    }

    if is_cancelled(notifier) {
        report.cancelled = true;
    }
    context.set_last_report(report.clone());
    report
}
