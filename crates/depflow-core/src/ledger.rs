//! The modification Ledger ("LogBook").
//!
//! Records which Parameters were modified since the last pass and how.
//! The Ledger is scoped to the current top-level transaction: it is cleared
//! in bulk when a pass completes, or when the transaction is aborted.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::id::ParameterId;

/// Modification marker attached to a Parameter write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modification {
    /// Changed by the user; triggers recomputation downstream.
    Touched,
    /// Marked as affected by the engine (e.g. after a forced execution).
    Impacted,
    /// Changed without leaving a trace: no Ledger entry is recorded.
    Silent,
}

/// Per-document record of modified Parameters, in modification order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogBook {
    entries: IndexMap<ParameterId, Modification>,
}

impl LogBook {
    pub fn new() -> Self {
        LogBook::default()
    }

    /// Records a modification of `id`.
    ///
    /// `Silent` records nothing. `Touched` is never downgraded to
    /// `Impacted`. Returns `true` if an entry was created or changed.
    pub fn mark(&mut self, id: ParameterId, modification: Modification) -> bool {
        match modification {
            Modification::Silent => false,
            Modification::Touched => {
                self.entries.insert(id, Modification::Touched) != Some(Modification::Touched)
            }
            Modification::Impacted => {
                if self.entries.contains_key(&id) {
                    false
                } else {
                    self.entries.insert(id, Modification::Impacted);
                    true
                }
            }
        }
    }

    pub fn touch(&mut self, id: ParameterId) -> bool {
        self.mark(id, Modification::Touched)
    }

    pub fn impact(&mut self, id: ParameterId) -> bool {
        self.mark(id, Modification::Impacted)
    }

    /// Returns the marker recorded for `id`, if any.
    pub fn get(&self, id: ParameterId) -> Option<Modification> {
        self.entries.get(&id).copied()
    }

    pub fn is_touched(&self, id: ParameterId) -> bool {
        self.get(id) == Some(Modification::Touched)
    }

    pub fn is_impacted(&self, id: ParameterId) -> bool {
        self.get(id) == Some(Modification::Impacted)
    }

    /// Returns `true` if `id` has any entry.
    pub fn is_modified(&self, id: ParameterId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Iterates over all entries in modification order.
    pub fn entries(&self) -> impl Iterator<Item = (ParameterId, Modification)> + '_ {
        self.entries.iter().map(|(id, m)| (*id, *m))
    }

    pub fn remove(&mut self, id: ParameterId) -> Option<Modification> {
        self.entries.shift_remove(&id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::NodeId;

    fn pid(local: u32) -> ParameterId {
        ParameterId::new(NodeId(0), local)
    }

    #[test]
    fn silent_leaves_no_entry() {
        let mut book = LogBook::new();
        assert!(!book.mark(pid(0), Modification::Silent));
        assert!(book.is_empty());
        assert!(!book.is_modified(pid(0)));
    }

    #[test]
    fn touched_is_not_downgraded() {
        let mut book = LogBook::new();
        assert!(book.touch(pid(0)));
        assert!(!book.impact(pid(0)));
        assert!(book.is_touched(pid(0)));
    }

    #[test]
    fn impacted_upgrades_to_touched() {
        let mut book = LogBook::new();
        assert!(book.impact(pid(1)));
        assert!(book.is_impacted(pid(1)));
        assert!(book.touch(pid(1)));
        assert!(book.is_touched(pid(1)));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn entries_keep_modification_order() {
        let mut book = LogBook::new();
        book.touch(pid(2));
        book.impact(pid(0));
        book.touch(pid(1));
        let ids: Vec<_> = book.entries().map(|(id, _)| id.local).collect();
        assert_eq!(ids, vec![2, 0, 1]);

        book.remove(pid(0));
        let ids: Vec<_> = book.entries().map(|(id, _)| id.local).collect();
        assert_eq!(ids, vec![2, 1]);

        book.clear();
        assert!(book.is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn modification() -> impl Strategy<Value = Modification> {
            prop_oneof![
                Just(Modification::Touched),
                Just(Modification::Impacted),
                Just(Modification::Silent),
            ]
        }

        proptest! {
            #[test]
            fn entry_reflects_strongest_marker(
                marks in proptest::collection::vec((0u32..6, modification()), 0..40)
            ) {
                let mut book = LogBook::new();
                for (local, m) in &marks {
                    book.mark(pid(*local), *m);
                }
                for local in 0u32..6 {
                    let seen: Vec<_> = marks
                        .iter()
                        .filter(|(l, _)| *l == local)
                        .map(|(_, m)| *m)
                        .collect();
                    let expected = if seen.contains(&Modification::Touched) {
                        Some(Modification::Touched)
                    } else if seen.contains(&Modification::Impacted) {
                        Some(Modification::Impacted)
                    } else {
                        None
                    };
                    prop_assert_eq!(book.get(pid(local)), expected);
                }
            }
        }
    }
}
