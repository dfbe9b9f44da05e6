//! Global SET admission control.
//!
//! Commitment of a cell to a SET is linearised here: the ledger lock is the
//! outermost lock in the system, and `completed + in_progress` can never
//! exceed the target, so at most `target` commitments happen across a run.

use crate::invariants::debug_assert_ledger_bounds;
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct LedgerState {
    completed: u32,
    in_progress: u32,
}

/// The run-wide SET counters.
#[derive(Debug)]
pub struct SetLedger {
    state: Mutex<LedgerState>,
    target: u32,
}

impl SetLedger {
    pub fn new(target: u32) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            target,
        }
    }

    /// The number of SETs this run is asked to produce.
    #[inline]
    pub fn target(&self) -> u32 {
        self.target
    }

    /// Operator-acknowledged OK SETs so far.
    pub fn completed(&self) -> u32 {
        self.state.lock().completed
    }

    /// SETs currently committed to a cell but not yet acknowledged.
    pub fn in_progress(&self) -> u32 {
        self.state.lock().in_progress
    }

    /// SETs neither completed nor committed yet.
    pub fn pending(&self) -> u32 {
        let state = self.state.lock();
        self.target
            .saturating_sub(state.completed)
            .saturating_sub(state.in_progress)
    }

    /// `true` once the target has been reached.
    pub fn reached_target(&self) -> bool {
        self.completed() >= self.target
    }

    /// Attempts to commit one more SET.
    ///
    /// `mark` runs under the ledger lock and must flip the cell's own
    /// commitment flag (taking the cell lock — the documented
    /// ledger-before-cell order); it returns `false` if the cell was already
    /// committed by a racing arm, in which case the ledger is left untouched
    /// and the commitment still counts as in place.
    pub fn try_commit(&self, mark: impl FnOnce() -> bool) -> bool {
        let mut state = self.state.lock();
        if state.completed + state.in_progress >= self.target {
            return false;
        }
        if !mark() {
            // Another arm of the same cell won the race; its commitment is
            // already accounted for.
            return true;
        }
        state.in_progress += 1;
        debug_assert_ledger_bounds!(state.completed, state.in_progress, self.target);
        true
    }

    /// Records the operator's verdict for one acknowledged SET: an OK kit
    /// credits `completed`; either way the cell's commitment ends.
    pub fn acknowledge(&self, ok: bool) {
        let mut state = self.state.lock();
        if ok {
            state.completed += 1;
        }
        state.in_progress = state.in_progress.saturating_sub(1);
        debug_assert_ledger_bounds!(state.completed, state.in_progress, self.target);
    }

    /// Ends a commitment without producing a SET (the cell released its
    /// parts back to the belt).
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.in_progress = state.in_progress.saturating_sub(1);
    }
}
