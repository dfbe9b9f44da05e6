//! The arm worker: withdraw, place, drain overflow, detect lack of progress.
//!
//! Arms are cooperatively scheduled polling loops. Each iteration runs up to
//! four phases; every sleep observes the shutdown flag, and the pick
//! simulation between withdraw and place is deliberately uninterruptible so
//! a part taken off the belt always lands in the kit or the overflow buffer.

use crate::cell::{Arm, ArmState, Cell, CellState};
use crate::part::{Part, PartKind};
use crate::sync::ShutdownFlag;
use crate::system::System;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info};

/// What became of a part handed to [`place_part`].
enum Placement {
    /// Entered the kit; `true` if that completed the SET.
    Placed { completed: bool },
    /// No longer needed by the kit; buffered for later.
    Buffered,
    /// No longer needed and the buffer was full.
    Dropped,
}

pub(crate) fn run(
    system: Arc<System>,
    cell_id: usize,
    arm_index: usize,
    shutdown: ShutdownFlag,
) {
    let config = &system.config;
    let cell = &system.cells[cell_id];
    let arm = &cell.arms()[arm_index];

    // 10 ms duty cycle by default; parked and busy states back off longer.
    let poll = config.arm_poll;
    let parked = poll * 10;
    let busy = poll * 5;

    debug!(target: "arm", cell = cell_id, arm = arm_index, "arm started");

    while !shutdown.is_triggered() {
        // Parked by load balancing until the suspension interval elapses.
        if !arm.wake_if_due(config.suspension) {
            if !shutdown.sleep(parked) {
                break;
            }
            continue;
        }

        if !cell.is_enabled() {
            if !shutdown.sleep(parked) {
                break;
            }
            continue;
        }

        let flags = cell.flags();
        if flags.state == CellState::Inactive {
            if !shutdown.sleep(parked) {
                break;
            }
            continue;
        }
        if flags.returning_parts || flags.state == CellState::AwaitingOperator {
            if !shutdown.sleep(busy) {
                break;
            }
            continue;
        }
        if system.ledger.reached_target() {
            if !shutdown.sleep(busy) {
                break;
            }
            continue;
        }

        let mut working = flags.working_on_set;

        // Phase 1: withdraw a needed part from the belt, bounded by the
        // cell's withdraw permit. Leave headroom in the overflow buffer so a
        // racing placement cannot force a drop.
        let needed = cell.needed_kinds();
        let wants_any = PartKind::ALL.iter().any(|&kind| needed[kind]);
        if wants_any && cell.overflow_len() + 2 <= system.config.overflow_capacity {
            if let Some(permit) = cell.withdraw_permits().try_acquire() {
                let position = cell.position();
                if !working && system.belt.contains_at(position, |p| needed[p.kind]) {
                    working = system.try_commit(cell);
                }
                if working {
                    if let Some(part) =
                        system.belt.withdraw_at(position, |p| needed[p.kind])
                    {
                        drop(permit);
                        arm.set_state(ArmState::Withdrawing);
                        thread::sleep(config.pick_time);

                        // Phase 2: place into the kit under the single-placer
                        // permit, or buffer if the need evaporated meanwhile.
                        if phase_place(&system, cell, arm_index, part) {
                            continue;
                        }
                    } else {
                        drop(permit);
                    }
                } else {
                    drop(permit);
                }
            }
        }

        // Phase 3: move one buffered part into the kit.
        if working && cell.state() == CellState::Active && cell.has_useful_overflow() {
            if phase_drain_overflow(&system, cell, arm_index) {
                continue;
            }
        }

        // Phase 4: progress detection, run by arm 0 only.
        if arm_index == 0 && working && cell.state() == CellState::Active {
            phase_detect_stall(&system, cell);
        }

        if !shutdown.sleep(poll) {
            break;
        }
    }

    debug!(target: "arm", cell = cell_id, arm = arm_index, "arm stopped");
}

/// Places a withdrawn part. Returns `true` if the kit completed.
fn phase_place(system: &System, cell: &Cell, arm_index: usize, part: Part) -> bool {
    let arm = &cell.arms()[arm_index];
    let placer = cell.placer().acquire();
    arm.set_state(ArmState::Placing);

    let outcome = {
        let mut kit = cell.kit().lock();
        if kit.place(part.kind) {
            arm.record_move();
            let completed = kit.is_full();
            if completed {
                kit.mark_complete();
            }
            Placement::Placed { completed }
        } else if cell.push_overflow(part) {
            Placement::Buffered
        } else {
            Placement::Dropped
        }
    };
    drop(placer);
    arm.set_state(ArmState::Idle);

    match outcome {
        Placement::Placed { completed } => {
            cell.note_progress();
            debug!(
                target: "arm",
                cell = cell.id(),
                arm = arm_index,
                kind = %part.kind,
                serial = part.serial,
                "placed part into kit"
            );
            if completed {
                finish_kit(system, cell);
            }
            completed
        }
        Placement::Buffered => {
            debug!(
                target: "arm",
                cell = cell.id(),
                arm = arm_index,
                kind = %part.kind,
                "part no longer needed, buffered"
            );
            false
        }
        Placement::Dropped => {
            system.stats.record_overflow_drop();
            debug!(
                target: "arm",
                cell = cell.id(),
                arm = arm_index,
                kind = %part.kind,
                "overflow buffer full, part dropped"
            );
            false
        }
    }
}

/// Moves one still-needed part from the overflow buffer into the kit.
/// Returns `true` if the kit completed.
fn phase_drain_overflow(system: &System, cell: &Cell, arm_index: usize) -> bool {
    let arm = &cell.arms()[arm_index];
    let placer = cell.placer().acquire();

    let (placed, completed) = {
        let mut kit = cell.kit().lock();
        let mut placed = None;
        for kind in PartKind::ALL {
            if kit.needs(kind) {
                if let Some(part) = cell.take_overflow(kind) {
                    kit.place(part.kind);
                    arm.record_move();
                    placed = Some(kind);
                    break;
                }
            }
        }
        let completed = placed.is_some() && kit.is_full();
        if completed {
            kit.mark_complete();
        }
        (placed, completed)
    };
    drop(placer);

    if let Some(kind) = placed {
        cell.note_progress();
        debug!(
            target: "arm",
            cell = cell.id(),
            arm = arm_index,
            kind = %kind,
            "placed part from overflow buffer"
        );
    }
    if completed {
        finish_kit(system, cell);
    }
    completed
}

/// Arm 0's release detector: after enough cycles without progress, compare
/// what the kit is missing against what the cell can still reach (its
/// overflow buffer plus the belt up to its position) and give the parts back
/// if the SET cannot be finished here.
fn phase_detect_stall(system: &System, cell: &Cell) {
    let cycles = cell.bump_no_progress();
    if cycles <= system.config.stall_threshold {
        return;
    }

    let missing = cell.kit().lock().missing();
    if missing.total() == 0 {
        cell.note_progress();
        return;
    }

    let available = system.availability(cell);
    let cannot_complete = PartKind::ALL
        .iter()
        .any(|&kind| missing[kind] > available[kind]);
    let nothing_reachable = available.total() == 0;
    let last_cell = system.is_last_cell(cell);

    if cannot_complete && (!last_cell || nothing_reachable) {
        info!(
            target: "arm",
            cell = cell.id(),
            missing = ?missing,
            available = ?available,
            "cannot complete SET here, releasing parts"
        );
        system.release_parts(cell);
    } else {
        cell.note_progress();
    }
}

/// Marks the cell's kit as delivered: state change plus operator handoff.
fn finish_kit(system: &System, cell: &Cell) {
    cell.set_state(CellState::AwaitingOperator);
    info!(
        target: "arm",
        cell = cell.id(),
        "SET complete, awaiting operator review"
    );
    system.operator_queue.push(cell.id());
}

/// The load-balance selection rule: the busiest non-suspended arm of a cell.
/// Lives here next to the arm state machine; the dispenser invokes it.
pub(crate) fn busiest_arm(cell: &Cell) -> Option<usize> {
    cell.arms()
        .iter()
        .filter(|arm| arm.state() != ArmState::Suspended)
        .max_by_key(|arm| arm.moved())
        .map(Arm::index)
}
