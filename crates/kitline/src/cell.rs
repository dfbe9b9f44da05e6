//! Packaging cells and their robotic arms.
//!
//! A cell owns a kit-in-progress, an overflow buffer for parts that are
//! momentarily un-assignable, a bounded withdraw permit, and a fixed set of
//! arms. Lock order inside a cell follows the system-wide discipline:
//! cell flags → kit (through its placer permit) → overflow; belt slot locks
//! are only ever taken after these. Arm status locks are leaf locks, never
//! held across another acquisition.

use crate::config::SimConfig;
use crate::kit::Kit;
use crate::part::{KindMap, Part, PartKind};
use crate::sync::Semaphore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Cell lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    /// Operating normally.
    Active,
    /// Kit complete, waiting for the operator's acknowledgement.
    AwaitingOperator,
    /// Disabled by the dynamic manager.
    Inactive,
}

/// Arm activity states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmState {
    Idle,
    /// Picking a part off the belt.
    Withdrawing,
    /// Placing a part into the kit.
    Placing,
    /// Parked by load balancing.
    Suspended,
}

#[derive(Debug)]
struct ArmStatus {
    state: ArmState,
    suspended_at: Option<Instant>,
}

/// One robotic arm.
#[derive(Debug)]
pub struct Arm {
    index: usize,
    status: Mutex<ArmStatus>,
    moved: AtomicU64,
}

impl Arm {
    fn new(index: usize) -> Self {
        Self {
            index,
            status: Mutex::new(ArmStatus {
                state: ArmState::Idle,
                suspended_at: None,
            }),
            moved: AtomicU64::new(0),
        }
    }

    /// Index of this arm within its cell.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> ArmState {
        self.status.lock().state
    }

    pub(crate) fn set_state(&self, state: ArmState) {
        self.status.lock().state = state;
    }

    /// Parks the arm if it is currently idle. Load balancing only suspends
    /// arms that are not mid-move.
    pub(crate) fn suspend_if_idle(&self, now: Instant) -> bool {
        let mut status = self.status.lock();
        if status.state != ArmState::Idle {
            return false;
        }
        status.state = ArmState::Suspended;
        status.suspended_at = Some(now);
        true
    }

    /// Wakes a suspended arm once `suspension` has elapsed. Returns `true`
    /// if the arm is (now) runnable.
    pub(crate) fn wake_if_due(&self, suspension: Duration) -> bool {
        let mut status = self.status.lock();
        if status.state != ArmState::Suspended {
            return true;
        }
        match status.suspended_at {
            Some(since) if since.elapsed() >= suspension => {
                status.state = ArmState::Idle;
                status.suspended_at = None;
                true
            }
            _ => false,
        }
    }

    /// Total parts this arm has moved into its cell's kit.
    pub fn moved(&self) -> u64 {
        self.moved.load(Ordering::Relaxed)
    }

    pub(crate) fn record_move(&self) {
        self.moved.fetch_add(1, Ordering::Relaxed);
    }
}

/// Mutable cell bookkeeping behind the cell lock.
#[derive(Debug, Clone, Copy)]
pub struct CellFlags {
    pub state: CellState,
    /// The cell has committed parts to a SET.
    pub working_on_set: bool,
    /// A release of parts back to the belt is in progress.
    pub returning_parts: bool,
    /// Arm-0 cycles since the kit last made progress.
    pub no_progress_cycles: u32,
}

/// A packaging cell.
#[derive(Debug)]
pub struct Cell {
    id: usize,
    position: usize,
    flags: Mutex<CellFlags>,
    kit: Mutex<Kit>,
    /// Single-placer permit: acquired before the kit lock by anything that
    /// mutates the kit.
    placer: Semaphore,
    overflow: Mutex<Vec<Part>>,
    overflow_capacity: usize,
    /// Bounds how many arms of this cell withdraw from the belt at once.
    withdraw_permits: Semaphore,
    arms: Vec<Arm>,
    enabled: AtomicBool,
    tally_ok: AtomicU64,
    tally_fail: AtomicU64,
}

impl Cell {
    pub(crate) fn new(id: usize, position: usize, config: &SimConfig) -> Self {
        Self {
            id,
            position,
            flags: Mutex::new(CellFlags {
                state: CellState::Active,
                working_on_set: false,
                returning_parts: false,
                no_progress_cycles: 0,
            }),
            kit: Mutex::new(Kit::new(config.per_set)),
            placer: Semaphore::new(1),
            overflow: Mutex::new(Vec::new()),
            overflow_capacity: config.overflow_capacity,
            withdraw_permits: Semaphore::new(config.max_withdrawers),
            arms: (0..config.arms_per_cell).map(Arm::new).collect(),
            enabled: AtomicBool::new(true),
            tally_ok: AtomicU64::new(0),
            tally_fail: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Belt position this cell's arms withdraw from.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn arms(&self) -> &[Arm] {
        &self.arms
    }

    /// Whether the dynamic manager currently has this cell enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Snapshot of the cell's bookkeeping flags.
    pub fn flags(&self) -> CellFlags {
        *self.flags.lock()
    }

    pub fn state(&self) -> CellState {
        self.flags.lock().state
    }

    pub(crate) fn set_state(&self, state: CellState) {
        self.flags.lock().state = state;
    }

    pub(crate) fn set_returning(&self, returning: bool) {
        self.flags.lock().returning_parts = returning;
    }

    /// Runs `f` with the flags lock held. Used by commitment, which must
    /// flip `working_on_set` while the ledger lock is already held.
    pub(crate) fn with_flags<R>(&self, f: impl FnOnce(&mut CellFlags) -> R) -> R {
        f(&mut self.flags.lock())
    }

    /// Resets the no-progress counter; called on every successful placement.
    pub(crate) fn note_progress(&self) {
        self.flags.lock().no_progress_cycles = 0;
    }

    /// Bumps and returns the no-progress counter.
    pub(crate) fn bump_no_progress(&self) -> u32 {
        let mut flags = self.flags.lock();
        flags.no_progress_cycles += 1;
        flags.no_progress_cycles
    }

    pub(crate) fn kit(&self) -> &Mutex<Kit> {
        &self.kit
    }

    pub(crate) fn placer(&self) -> &Semaphore {
        &self.placer
    }

    pub(crate) fn withdraw_permits(&self) -> &Semaphore {
        &self.withdraw_permits
    }

    /// Per-kind "total need": the kit's deficit minus what the overflow
    /// buffer already holds. Arms withdraw only kinds with positive total
    /// need, so the buffer never hoards parts the kit is already covered for.
    pub(crate) fn needed_kinds(&self) -> KindMap<bool> {
        let kit = self.kit.lock();
        let complete = kit.is_complete();
        let missing = kit.missing();
        let overflow = self.overflow_census_locked(&self.overflow.lock());
        drop(kit);
        KindMap::from_fn(|kind| !complete && missing[kind] > overflow[kind])
    }

    fn overflow_census_locked(&self, overflow: &[Part]) -> KindMap<u32> {
        let mut counts = KindMap::default();
        for part in overflow {
            counts[part.kind] += 1;
        }
        counts
    }

    /// Per-kind counts of parts waiting in the overflow buffer.
    pub(crate) fn overflow_census(&self) -> KindMap<u32> {
        self.overflow_census_locked(&self.overflow.lock())
    }

    pub(crate) fn overflow_len(&self) -> usize {
        self.overflow.lock().len()
    }

    /// Buffers a part for later placement. Returns `false` (the part is
    /// dropped by the caller) when the buffer is full.
    pub(crate) fn push_overflow(&self, part: Part) -> bool {
        let mut overflow = self.overflow.lock();
        if overflow.len() >= self.overflow_capacity {
            return false;
        }
        overflow.push(part);
        true
    }

    /// Takes one buffered part of `kind`, if any. Safe to call while holding
    /// the kit lock (kit precedes overflow in the lock order).
    pub(crate) fn take_overflow(&self, kind: PartKind) -> Option<Part> {
        let mut overflow = self.overflow.lock();
        let index = overflow.iter().position(|part| part.kind == kind)?;
        Some(overflow.remove(index))
    }

    /// Takes any one buffered part, used when draining during release.
    pub(crate) fn pop_overflow(&self) -> Option<Part> {
        self.overflow.lock().pop()
    }

    /// `true` if the overflow buffer holds a part the kit still needs.
    pub(crate) fn has_useful_overflow(&self) -> bool {
        let kit = self.kit.lock();
        let overflow = self.overflow.lock();
        overflow.iter().any(|part| kit.needs(part.kind))
    }

    /// Whether the dynamic manager may take this cell out of service: no
    /// commitment, no pending acknowledgement, no release in progress,
    /// nothing buffered, and no arm mid-move.
    pub fn safe_to_disable(&self) -> bool {
        let flags = self.flags.lock();
        if flags.state == CellState::AwaitingOperator
            || flags.working_on_set
            || flags.returning_parts
        {
            return false;
        }
        drop(flags);

        if !self.kit.lock().is_empty() {
            return false;
        }
        if !self.overflow.lock().is_empty() {
            return false;
        }
        self.arms.iter().all(|arm| {
            !matches!(arm.state(), ArmState::Withdrawing | ArmState::Placing)
        })
    }

    /// Puts a re-enabled cell back into a clean Active state.
    pub(crate) fn reset_for_activation(&self) {
        let mut flags = self.flags.lock();
        flags.state = CellState::Active;
        flags.working_on_set = false;
        flags.returning_parts = false;
        flags.no_progress_cycles = 0;
        drop(flags);

        self.kit.lock().reset();
        self.overflow.lock().clear();
        self.set_enabled(true);
    }

    pub(crate) fn tally(&self, ok: bool) {
        if ok {
            self.tally_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.tally_fail.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// (OK, FAIL) acknowledgement counts for this cell.
    pub fn tallies(&self) -> (u64, u64) {
        (
            self.tally_ok.load(Ordering::Relaxed),
            self.tally_fail.load(Ordering::Relaxed),
        )
    }
}
