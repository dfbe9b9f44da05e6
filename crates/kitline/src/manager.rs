//! The dynamic cell manager: scales active packaging capacity up and down
//! from two observations — discard-bin growth (parts are slipping past the
//! cells) and per-cell idleness (capacity is going unused).

use crate::cell::CellState;
use crate::sync::ShutdownFlag;
use crate::system::System;
use std::sync::Arc;
use tracing::{debug, info};

pub(crate) fn run(system: Arc<System>, shutdown: ShutdownFlag) {
    let config = &system.config;
    let mut last_discard = 0u64;
    let mut idle_cycles = vec![0u32; system.cells.len()];

    if !shutdown.sleep(config.manager_warmup) {
        return;
    }
    info!(target: "manager", "dynamic cell manager started");

    while shutdown.sleep(config.manager_period) {
        let discard_now = system.stats.discarded_total();
        let discard_delta = discard_now - last_discard;
        last_discard = discard_now;

        let pending = system.ledger.pending();

        let mut active = 0u32;
        let mut busy = 0u32;
        let mut idle = 0u32;
        for cell in &system.cells {
            if !cell.is_enabled() {
                continue;
            }
            active += 1;
            let flags = cell.flags();
            if flags.working_on_set || flags.state == CellState::AwaitingOperator {
                busy += 1;
                idle_cycles[cell.id()] = 0;
            } else {
                idle_cycles[cell.id()] += 1;
                if idle_cycles[cell.id()] > config.idle_busy_cycles {
                    idle += 1;
                }
            }
        }

        // Remove: little pending work and somebody has been idle for a
        // while. Only the furthest-downstream long-idle cell goes, never the
        // last active one, and only if taking it out is provably safe.
        if idle > 0 && pending <= active / 2 && active > 1 {
            let candidate = system
                .cells
                .iter()
                .rev()
                .find(|cell| {
                    cell.is_enabled()
                        && idle_cycles[cell.id()] > config.idle_disable_cycles
                })
                .map(|cell| cell.id());

            if let Some(id) = candidate {
                let cell = &system.cells[id];
                if cell.safe_to_disable() {
                    cell.set_state(CellState::Inactive);
                    cell.set_enabled(false);
                    idle_cycles[id] = 0;
                    info!(
                        target: "manager",
                        cell = id,
                        active = active - 1,
                        "cell disabled"
                    );
                } else {
                    debug!(target: "manager", cell = id, "disable skipped, cell not quiescent");
                }
            }
        }

        // Add: parts are reaching the discard bin while SETs remain, or
        // every active cell is occupied and more SETs are pending than
        // cells to work on them.
        let backlogged = discard_delta > 2 && pending > 0;
        let saturated = busy == active && pending > active;
        if backlogged || saturated {
            if let Some(cell) = system.cells.iter().find(|cell| !cell.is_enabled()) {
                cell.reset_for_activation();
                idle_cycles[cell.id()] = 0;
                info!(
                    target: "manager",
                    cell = cell.id(),
                    position = cell.position(),
                    "cell enabled"
                );
            }
        }
    }

    info!(target: "manager", "dynamic cell manager stopped");
}
