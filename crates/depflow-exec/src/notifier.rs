//! Progress notification and cooperative cancellation.
//!
//! A [`ProgressNotifier`] is shared between the launcher of a pass, the
//! worker running it, and Function bodies. Status lives in a
//! `tokio::sync::watch` channel so it can be polled ([`status`]) or awaited
//! ([`wait`]). A notifier moves `Idle -> Running -> terminal` once; every
//! launch needs a notifier that is still Idle.
//!
//! [`status`]: ProgressNotifier::status
//! [`wait`]: ProgressNotifier::wait

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Lifecycle of an execution task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Idle,
    Running,
    Cancelled,
    Failed,
    Succeeded,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Cancelled | TaskStatus::Failed | TaskStatus::Succeeded
        )
    }
}

#[derive(Debug)]
struct Inner {
    status: watch::Sender<TaskStatus>,
    cancel: AtomicBool,
    processed: AtomicUsize,
    total: AtomicUsize,
    messages: Mutex<Vec<String>>,
}

/// Cloneable handle; clones observe the same task.
#[derive(Debug, Clone)]
pub struct ProgressNotifier {
    inner: Arc<Inner>,
}

impl Default for ProgressNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressNotifier {
    pub fn new() -> Self {
        let (status, _) = watch::channel(TaskStatus::Idle);
        ProgressNotifier {
            inner: Arc::new(Inner {
                status,
                cancel: AtomicBool::new(false),
                processed: AtomicUsize::new(0),
                total: AtomicUsize::new(0),
                messages: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn status(&self) -> TaskStatus {
        *self.inner.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskStatus> {
        self.inner.status.subscribe()
    }

    /// Waits until a terminal status is published and returns it.
    pub async fn wait(&self) -> TaskStatus {
        let mut rx = self.subscribe();
        let status = match rx.wait_for(|s| s.is_terminal()).await {
            Ok(status) => *status,
            Err(_) => self.status(),
        };
        status
    }

    /// Moves an Idle notifier to Running.
    ///
    /// A notifier tracks a single run: returns `false` once it has left
    /// Idle, so a terminal status is never overwritten by a later run.
    pub(crate) fn begin(&self) -> bool {
        self.inner.status.send_if_modified(|status| {
            if *status == TaskStatus::Idle {
                *status = TaskStatus::Running;
                true
            } else {
                false
            }
        })
    }

    /// Publishes a terminal status. Only the first call after
    /// [`begin`](Self::begin) has any effect.
    pub(crate) fn finish(&self, terminal: TaskStatus) -> bool {
        self.inner.status.send_if_modified(|status| {
            if *status == TaskStatus::Running && terminal.is_terminal() {
                *status = terminal;
                true
            } else {
                false
            }
        })
    }

    /// Requests cooperative cancellation. Checked by the engine between
    /// Functions and at the end of a pass, never inside a body.
    pub fn cancel(&self) {
        self.inner.cancel.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.load(Ordering::Acquire)
    }

    pub fn set_total(&self, total: usize) {
        self.inner.total.store(total, Ordering::Release);
    }

    /// Counts one more processed Function.
    pub fn advance(&self) {
        self.inner.processed.fetch_add(1, Ordering::AcqRel);
    }

    pub fn processed(&self) -> usize {
        self.inner.processed.load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.inner.total.load(Ordering::Acquire)
    }

    pub fn message(&self, message: impl Into<String>) {
        self.inner
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.into());
    }

    pub fn messages(&self) -> Vec<String> {
        self.inner
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle() {
        let n = ProgressNotifier::new();
        assert_eq!(n.status(), TaskStatus::Idle);
        assert!(n.begin());
        assert!(!n.begin());
        assert_eq!(n.status(), TaskStatus::Running);
        assert!(n.finish(TaskStatus::Succeeded));
        assert_eq!(n.status(), TaskStatus::Succeeded);
    }

    #[test]
    fn terminal_status_is_published_once() {
        let n = ProgressNotifier::new();
        n.begin();
        assert!(n.finish(TaskStatus::Cancelled));
        assert!(!n.finish(TaskStatus::Succeeded));
        assert_eq!(n.status(), TaskStatus::Cancelled);
    }

    #[test]
    fn finish_requires_terminal_status() {
        let n = ProgressNotifier::new();
        n.begin();
        assert!(!n.finish(TaskStatus::Idle));
        assert_eq!(n.status(), TaskStatus::Running);
    }

    #[test]
    fn finished_notifier_cannot_run_again() {
        let n = ProgressNotifier::new();
        n.begin();
        n.set_total(3);
        n.advance();
        n.finish(TaskStatus::Succeeded);

        assert!(!n.begin());
        assert_eq!(n.status(), TaskStatus::Succeeded);
        assert_eq!(n.processed(), 1);
        assert_eq!(n.total(), 3);
    }

    #[test]
    fn cancel_before_begin_is_kept() {
        let n = ProgressNotifier::new();
        n.cancel();
        assert!(n.begin());
        assert!(n.is_cancelled());
    }

    #[test]
    fn clones_share_state() {
        let n = ProgressNotifier::new();
        let other = n.clone();
        other.message("hello");
        n.cancel();
        assert!(other.is_cancelled());
        assert_eq!(n.messages(), vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn wait_returns_terminal_status() {
        let n = ProgressNotifier::new();
        n.begin();
        let worker = n.clone();
        tokio::spawn(async move {
            worker.finish(TaskStatus::Failed);
        });
        assert_eq!(n.wait().await, TaskStatus::Failed);
    }
}
