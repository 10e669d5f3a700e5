//! Shared freeze flag guarding Function wiring.
//!
//! A [`GraphFreeze`] is created with its [`Document`](crate::Document) and
//! shared with the execution context. While frozen, every wiring mutation
//! on the document fails with [`CoreError::Busy`](crate::CoreError::Busy).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable handle to a document's GraphFrozen flag.
#[derive(Debug, Clone, Default)]
pub struct GraphFreeze(Arc<AtomicBool>);

impl GraphFreeze {
    pub fn new() -> Self {
        GraphFreeze::default()
    }

    /// Freezes the graph. Returns `false` if it was already frozen.
    pub fn try_freeze(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Unfreezes the graph. Returns `false` if it was not frozen.
    pub fn unfreeze(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    pub fn is_frozen(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freeze_is_exclusive() {
        let flag = GraphFreeze::new();
        assert!(flag.try_freeze());
        assert!(!flag.try_freeze());
        assert!(flag.is_frozen());
        assert!(flag.unfreeze());
        assert!(!flag.unfreeze());
    }

    #[test]
    fn clones_share_state() {
        let flag = GraphFreeze::new();
        let other = flag.clone();
        assert!(flag.try_freeze());
        assert!(other.is_frozen());
    }
}
