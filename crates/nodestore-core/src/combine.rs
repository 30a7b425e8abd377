//! Per-node `combine`/`any` action barriers (`spec.md` §4.6).

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::action::Action;

static NEXT_BARRIER_ID: AtomicU64 = AtomicU64::new(1);

/// Result of feeding one observed action type through a barrier's gate.
pub struct BarrierObservation {
    /// Whether the matched action should also continue to ordinary
    /// handling (`true`) or is fully consumed by the barrier (`false`).
    pub keep_origin: bool,
    /// Whether this observation completed (and removed) the barrier.
    pub barrier_done: bool,
    /// `Some(action)` if completion should dispatch a follow-on action back
    /// to the owning node (`combine`'s `combine_action`). `any` completes
    /// silently — the matching action itself continues to ordinary
    /// handling via `keep_origin`, nothing further is emitted.
    pub completed: Option<Action>,
}

/// A per-node temporary gate installed by a reducer to suspend ordinary
/// handling until a set of action types has been observed, all of them
/// (`combine`) or any one of them (`any`).
pub struct Barrier {
    id: u64,
    remaining: HashSet<String>,
    finish_action: Action,
    timeout_action: Action,
    is_any: bool,
    keep_origin: bool,
}

impl Barrier {
    /// `combine(types, combine_action, timeout_action, keep_origin)` —
    /// completes once every listed type has been observed at least once.
    pub fn combine(
        types: impl IntoIterator<Item = String>,
        combine_action: Action,
        timeout_action: Action,
        keep_origin: bool,
    ) -> Self {
        Barrier {
            id: NEXT_BARRIER_ID.fetch_add(1, Ordering::Relaxed),
            remaining: types.into_iter().collect(),
            finish_action: combine_action,
            timeout_action,
            is_any: false,
            keep_origin,
        }
    }

    /// `any(types, timeout_action)` — completes on the first observed match
    /// among the listed types; `keep_origin` is implicitly `true`.
    pub fn any(types: impl IntoIterator<Item = String>, timeout_action: Action) -> Self {
        Barrier {
            id: NEXT_BARRIER_ID.fetch_add(1, Ordering::Relaxed),
            remaining: types.into_iter().collect(),
            finish_action: Action::no_op(),
            timeout_action,
            is_any: true,
            keep_origin: true,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn timeout_action(&self) -> Action {
        self.timeout_action.clone()
    }

    /// Feed one observed action type through the gate. Returns `None` if
    /// this barrier does not care about this type at all.
    pub fn observe(&mut self, action_type: &str) -> Option<BarrierObservation> {
        if !self.remaining.contains(action_type) {
            return None;
        }
        if self.is_any {
            return Some(BarrierObservation {
                keep_origin: self.keep_origin,
                barrier_done: true,
                completed: None,
            });
        }
        self.remaining.remove(action_type);
        let done = self.remaining.is_empty();
        let completed = done.then(|| self.finish_action.clone());
        Some(BarrierObservation { keep_origin: self.keep_origin, barrier_done: done, completed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_completes_once_all_types_seen() {
        let mut b = Barrier::combine(
            ["A".to_string(), "B".to_string()],
            Action::new("COMBINE_FINISH"),
            Action::new("COMBINE_ERROR"),
            false,
        );
        assert!(b.observe("C").is_none());
        let first = b.observe("A").expect("A is tracked");
        assert!(first.completed.is_none());
        let second = b.observe("B").expect("B is tracked");
        assert!(second.completed.is_some());
        assert!(second.completed.unwrap().matches("COMBINE_FINISH"));
    }

    #[test]
    fn any_completes_on_first_match_and_keeps_origin() {
        let mut b = Barrier::any(["A".to_string(), "B".to_string()], Action::new("TIMEOUT"));
        let obs = b.observe("B").expect("B is tracked");
        assert!(obs.keep_origin);
        assert!(obs.barrier_done);
        assert!(obs.completed.is_none());
    }
}
