//! Per-document execution state.
//!
//! An [`ExecutionContext`] is created together with its document
//! ([`ExecutionContext::init`]) and torn down with it. It holds:
//!
//! - the optional [`ProgressNotifier`] and its On/Off switch,
//! - the shared GraphFrozen flag (see [`GraphFreeze`]),
//! - the heavy deployment queue (controlling Parameters of deferred heavy
//!   Functions, in enqueue order),
//! - one side-data slot per algorithm identifier (last write wins),
//! - the opaque payload of the active transaction,
//! - the report of the last pass.
//!
//! All methods take `&self`; a running pass and the owning façade may use
//! the context at the same time.

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use indexmap::IndexSet;

use depflow_core::{AlgorithmId, GraphFreeze, ParameterId};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::notifier::ProgressNotifier;
use crate::pass::PassReport;

/// Opaque value handed to a pass for the duration of one transaction.
pub type Payload = Arc<dyn Any + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ExecutionContext {
    config: EngineConfig,
    freeze: GraphFreeze,
    notifier: Mutex<Option<ProgressNotifier>>,
    notifier_enabled: AtomicBool,
    heavy_queue: Mutex<IndexSet<ParameterId>>,
    side_data: DashMap<AlgorithmId, Payload>,
    payload: Mutex<Option<Payload>>,
    last_report: Mutex<Option<PassReport>>,
}

impl ExecutionContext {
    /// Creates the context of a document sharing `freeze` with it.
    pub fn init(freeze: GraphFreeze, config: EngineConfig) -> Self {
        ExecutionContext {
            config,
            freeze,
            notifier: Mutex::new(None),
            notifier_enabled: AtomicBool::new(false),
            heavy_queue: Mutex::new(IndexSet::new()),
            side_data: DashMap::new(),
            payload: Mutex::new(None),
            last_report: Mutex::new(None),
        }
    }

    /// Drops notifier, side data, payload, heavy queue and last report.
    pub fn teardown(&self) {
        *lock(&self.notifier) = None;
        self.notifier_enabled.store(false, Ordering::Release);
        lock(&self.heavy_queue).clear();
        self.side_data.clear();
        *lock(&self.payload) = None;
        *lock(&self.last_report) = None;
        tracing::debug!("execution context torn down");
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Notifier
    // -----------------------------------------------------------------------

    /// Installs (or removes) the notifier. The On/Off switch is left alone.
    pub fn set_notifier(&self, notifier: Option<ProgressNotifier>) {
        *lock(&self.notifier) = notifier;
    }

    pub fn notifier(&self) -> Option<ProgressNotifier> {
        lock(&self.notifier).clone()
    }

    pub fn enable_notifier(&self, on: bool) {
        self.notifier_enabled.store(on, Ordering::Release);
    }

    pub fn is_notifier_enabled(&self) -> bool {
        self.notifier_enabled.load(Ordering::Acquire)
    }

    /// The notifier, if one is installed and switched On.
    pub fn active_notifier(&self) -> Option<ProgressNotifier> {
        if self.is_notifier_enabled() {
            self.notifier()
        } else {
            None
        }
    }

    // -----------------------------------------------------------------------
    // Graph freeze
    // -----------------------------------------------------------------------

    pub fn freeze_graph(&self) -> Result<(), EngineError> {
        if self.freeze.try_freeze() {
            Ok(())
        } else {
            Err(EngineError::Busy)
        }
    }

    /// Returns `false` if the graph was not frozen.
    pub fn unfreeze_graph(&self) -> bool {
        self.freeze.unfreeze()
    }

    pub fn is_graph_frozen(&self) -> bool {
        self.freeze.is_frozen()
    }

    // -----------------------------------------------------------------------
    // Heavy deployment queue
    // -----------------------------------------------------------------------

    /// Enqueues a heavy Function's controlling Parameter. Returns `false` if
    /// it was already queued.
    pub fn enqueue_heavy(&self, parameter: ParameterId) -> bool {
        lock(&self.heavy_queue).insert(parameter)
    }

    /// Removes one entry, keeping the order of the rest.
    pub fn dequeue_heavy(&self, parameter: ParameterId) -> bool {
        lock(&self.heavy_queue).shift_remove(&parameter)
    }

    pub fn is_heavy_queued(&self, parameter: ParameterId) -> bool {
        lock(&self.heavy_queue).contains(&parameter)
    }

    /// Snapshot of the queue in enqueue order.
    pub fn heavy_queue(&self) -> Vec<ParameterId> {
        lock(&self.heavy_queue).iter().copied().collect()
    }

    // -----------------------------------------------------------------------
    // Side data
    // -----------------------------------------------------------------------

    /// Binds `value` to `algorithm`, replacing any previous binding.
    pub fn bind_side_data<T: Any + Send + Sync>(&self, algorithm: AlgorithmId, value: T) {
        self.side_data.insert(algorithm, Arc::new(value));
    }

    /// Returns `true` if a binding was removed.
    pub fn unbind_side_data(&self, algorithm: &AlgorithmId) -> bool {
        self.side_data.remove(algorithm).is_some()
    }

    /// The binding of `algorithm`, if present and of type `T`.
    pub fn side_data<T: Any + Send + Sync>(&self, algorithm: &AlgorithmId) -> Option<Arc<T>> {
        let slot = self.side_data.get(algorithm)?.value().clone();
        slot.downcast::<T>().ok()
    }

    // -----------------------------------------------------------------------
    // Transaction payload
    // -----------------------------------------------------------------------

    pub fn set_payload(&self, payload: Payload) {
        *lock(&self.payload) = Some(payload);
    }

    pub fn payload(&self) -> Option<Payload> {
        lock(&self.payload).clone()
    }

    /// Releases the payload at transaction commit or abort.
    pub fn release_payload(&self) -> Option<Payload> {
        lock(&self.payload).take()
    }

    // -----------------------------------------------------------------------
    // Reports
    // -----------------------------------------------------------------------

    pub(crate) fn set_last_report(&self, report: PassReport) {
        *lock(&self.last_report) = Some(report);
    }

    pub fn last_report(&self) -> Option<PassReport> {
        lock(&self.last_report).clone()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("config", &self.config)
            .field("frozen", &self.is_graph_frozen())
            .field("notifier_enabled", &self.is_notifier_enabled())
            .field("heavy_queue", &self.heavy_queue())
            .field("side_data", &self.side_data.len())
            .finish_non_exhaustive()
    }
}
