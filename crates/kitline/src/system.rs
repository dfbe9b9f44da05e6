//! The root record every worker shares, and the operations that span more
//! than one component.
//!
//! Lock order across the whole system: ledger → cell flags → kit (through
//! its placer permit) → overflow → belt slot. Anything that needs locks from
//! more than one of these levels goes through a method here (or on the owned
//! component), never through raw lock access, so the order is a property of
//! the API.

use crate::belt::Belt;
use crate::cell::{Arm, Cell, CellState};
use crate::config::SimConfig;
use crate::ledger::SetLedger;
use crate::operator::OperatorQueue;
use crate::part::{KindMap, Part, PartKind};
use crate::stats::{Snapshot, Stats};
use crate::sync::ShutdownFlag;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long a releasing cell backs off when its target slot is full.
const RELEASE_RETRY: Duration = Duration::from_millis(50);

/// The shared simulation state.
#[derive(Debug)]
pub(crate) struct System {
    pub(crate) config: SimConfig,
    pub(crate) belt: Belt,
    pub(crate) cells: Vec<Cell>,
    pub(crate) ledger: SetLedger,
    pub(crate) stats: Stats,
    pub(crate) operator_queue: OperatorQueue,
    pub(crate) shutdown: ShutdownFlag,
    /// Set by the dispenser when every budget has drained.
    pub(crate) dispensing_done: AtomicBool,
    /// Injections since the last load-balance event.
    pub(crate) balance_pulse: AtomicU32,
}

impl System {
    pub(crate) fn new(config: SimConfig) -> Arc<Self> {
        let positions = config.cell_positions();
        let cells = positions
            .iter()
            .enumerate()
            .map(|(id, &position)| Cell::new(id, position, &config))
            .collect();

        Arc::new(Self {
            belt: Belt::new(config.length as usize, config.slot_capacity),
            cells,
            ledger: SetLedger::new(config.sets),
            stats: Stats::new(),
            operator_queue: OperatorQueue::new(),
            shutdown: ShutdownFlag::new(),
            dispensing_done: AtomicBool::new(false),
            balance_pulse: AtomicU32::new(0),
            config,
        })
    }

    /// A generator for one worker, derived from the master seed so a fixed
    /// seed reproduces every worker's stream independently.
    pub(crate) fn worker_rng(&self, tag: u64) -> StdRng {
        StdRng::seed_from_u64(
            self.config
                .seed
                .wrapping_add(tag.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
        )
    }

    /// `true` if `cell` is the furthest-downstream cell.
    pub(crate) fn is_last_cell(&self, cell: &Cell) -> bool {
        cell.id() + 1 == self.cells.len()
    }

    /// The slot a releasing cell pushes into: one past its own position, or
    /// the tail slot for the last cell (from where the next advance drains
    /// into the discard bin, so nothing loops forever).
    pub(crate) fn release_target(&self, cell: &Cell) -> usize {
        if self.is_last_cell(cell) {
            self.belt.length() - 1
        } else {
            cell.position() + 1
        }
    }

    /// Commits `cell` to a SET if admission allows.
    ///
    /// Linearised by the ledger lock (taken before the cell lock). Returns
    /// `true` if the cell is committed afterwards — whether by this call or
    /// by an arm that raced us to it.
    pub(crate) fn try_commit(&self, cell: &Cell) -> bool {
        let mut already = false;
        let committed = self.ledger.try_commit(|| {
            cell.with_flags(|flags| {
                if flags.working_on_set {
                    already = true;
                    false
                } else {
                    flags.working_on_set = true;
                    true
                }
            })
        });
        if committed && !already {
            info!(
                target: "cell",
                cell = cell.id(),
                in_progress = self.ledger.in_progress(),
                completed = self.ledger.completed(),
                "cell committed to a SET"
            );
        }
        committed
    }

    /// Parts of each kind reachable by `cell`: its overflow buffer plus
    /// every belt slot from the head through its own position.
    pub(crate) fn availability(&self, cell: &Cell) -> KindMap<u32> {
        let overflow = cell.overflow_census();
        let upstream = self.belt.census_through(cell.position());
        KindMap::from_fn(|kind| overflow[kind] + upstream[kind])
    }

    /// Gives a cell's accumulated parts back to the belt.
    ///
    /// Kit contents first, then the overflow buffer, one part at a time into
    /// the target slot; a full slot means a short back-off and retry, so no
    /// part is lost while the belt keeps advancing. Returned parts carry the
    /// sentinel serial. Ends the cell's commitment.
    pub(crate) fn release_parts(&self, cell: &Cell) {
        cell.set_returning(true);
        let target = self.release_target(cell);
        info!(
            target: "cell",
            cell = cell.id(),
            slot = target,
            "releasing parts back to the belt"
        );

        let placer = cell.placer().acquire();
        loop {
            let kind = {
                let kit = cell.kit().lock();
                PartKind::ALL
                    .iter()
                    .copied()
                    .find(|&kind| kit.current()[kind] > 0)
            };
            let Some(kind) = kind else { break };
            if !self.push_with_retry(target, Part::returned(kind)) {
                // Shutdown mid-release; whatever is left stays unaccounted.
                warn!(target: "cell", cell = cell.id(), "release interrupted by shutdown");
                break;
            }
            cell.kit().lock().take(kind);
        }
        cell.kit().lock().reset();
        drop(placer);

        while let Some(part) = cell.pop_overflow() {
            if !self.push_with_retry(target, Part::returned(part.kind)) {
                warn!(target: "cell", cell = cell.id(), "release interrupted by shutdown");
                break;
            }
        }

        cell.with_flags(|flags| {
            flags.working_on_set = false;
            flags.returning_parts = false;
            flags.no_progress_cycles = 0;
        });
        self.ledger.release();
        debug!(target: "cell", cell = cell.id(), "release finished");
    }

    /// Pushes one part into `slot`, backing off while it is at capacity.
    /// Returns `false` only if shutdown interrupts the retry loop.
    fn push_with_retry(&self, slot: usize, part: Part) -> bool {
        let mut part = part;
        loop {
            match self.belt.push_at(slot, part) {
                Ok(()) => return true,
                Err(rejected) => {
                    part = rejected;
                    if !self.shutdown.sleep(RELEASE_RETRY) {
                        return false;
                    }
                }
            }
        }
    }

    /// Every part currently inside the system: belt slots, overflow buffers,
    /// and kit contents. Drives the supervisor's insufficient-parts check
    /// and the conservation accounting in the final snapshot.
    pub(crate) fn parts_in_system(&self) -> u64 {
        let on_belt = self.belt.total_parts();
        let in_cells: u64 = self
            .cells
            .iter()
            .map(|cell| {
                cell.overflow_len() as u64 + u64::from(cell.kit().lock().current_total())
            })
            .sum();
        on_belt + in_cells
    }

    /// `true` while any cell has a completed kit waiting for review.
    pub(crate) fn any_awaiting_operator(&self) -> bool {
        self.cells
            .iter()
            .any(|cell| cell.state() == CellState::AwaitingOperator)
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot {
            dispensed: self.stats.dispensed(),
            discarded: self.stats.discarded(),
            discarded_total: self.stats.discarded_total(),
            kits_ok: self.stats.kits_ok(),
            kits_fail: self.stats.kits_fail(),
            overflow_dropped: self.stats.overflow_dropped(),
            arm_moves: self
                .cells
                .iter()
                .map(|cell| cell.arms().iter().map(Arm::moved).collect())
                .collect(),
            cell_tallies: self.cells.iter().map(Cell::tallies).collect(),
            parts_in_system: self.parts_in_system(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system_with(cells: u32, length: u32) -> Arc<System> {
        let config = SimConfig {
            cells,
            length,
            sets: 2,
            per_set: KindMap::from([2, 1, 0, 0]),
            ..SimConfig::default()
        };
        System::new(config)
    }

    #[test]
    fn release_target_rules() {
        let system = system_with(2, 25);
        // Positions: 8 and 16.
        assert_eq!(system.release_target(&system.cells[0]), 9);
        assert_eq!(
            system.release_target(&system.cells[1]),
            24,
            "last cell targets the tail slot"
        );
    }

    #[test]
    fn commitment_is_exclusive_per_target() {
        let system = system_with(2, 25);
        assert!(system.try_commit(&system.cells[0]));
        assert!(
            system.try_commit(&system.cells[0]),
            "same cell stays committed"
        );
        assert_eq!(system.ledger.in_progress(), 1);

        assert!(system.try_commit(&system.cells[1]));
        assert_eq!(system.ledger.in_progress(), 2);

        // Target exhausted: a third commitment (no free cell) is refused.
        let extra = Cell::new(9, 1, &system.config);
        assert!(!system.try_commit(&extra));
    }

    #[test]
    fn release_moves_kit_and_overflow_to_belt() {
        let system = system_with(2, 25);
        let cell = &system.cells[0];
        assert!(system.try_commit(cell));

        cell.kit().lock().place(PartKind::A);
        cell.kit().lock().place(PartKind::B);
        cell.push_overflow(Part::new(PartKind::A, 7));

        system.release_parts(cell);

        assert!(cell.kit().lock().is_empty());
        assert_eq!(cell.overflow_len(), 0);
        assert_eq!(system.ledger.in_progress(), 0);
        assert!(!cell.flags().working_on_set);

        let target = system.release_target(cell);
        assert_eq!(system.belt.slot_len(target), 3);
        let returned = system.belt.withdraw_at(target, |p| p.is_returned());
        assert!(returned.is_some(), "released parts carry the sentinel serial");
    }

    #[test]
    fn availability_spans_overflow_and_upstream_belt() {
        let system = system_with(2, 25);
        let cell = &system.cells[0]; // position 8
        cell.push_overflow(Part::new(PartKind::B, 1));
        system.belt.push_at(3, Part::new(PartKind::A, 2)).unwrap();
        system.belt.push_at(8, Part::new(PartKind::A, 3)).unwrap();
        system.belt.push_at(12, Part::new(PartKind::A, 4)).unwrap(); // downstream

        let avail = system.availability(cell);
        assert_eq!(avail[PartKind::A], 2);
        assert_eq!(avail[PartKind::B], 1);
        assert_eq!(system.parts_in_system(), 4);
    }
}
