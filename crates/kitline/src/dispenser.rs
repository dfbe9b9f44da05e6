//! The dispenser pool: a single producer thread injecting parts at the belt
//! head, plus the periodic load-balance trigger.

use crate::arm::busiest_arm;
use crate::part::{KindMap, Part, PartKind};
use crate::sync::ShutdownFlag;
use crate::system::System;
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub(crate) fn run(system: Arc<System>, shutdown: ShutdownFlag, mut rng: StdRng) {
    let config = &system.config;

    // Per-kind budget: exactly required-per-set × sets of each kind over the
    // whole run, no matter how the random choices fall.
    let mut remaining: KindMap<u64> =
        KindMap::from_fn(|kind| u64::from(config.per_set[kind]) * u64::from(config.sets));
    let mut total = remaining.total();
    let mut next_serial: u64 = 1;

    let sub_tick = config.sub_tick();
    let head_capacity = config.dispensers as usize;

    info!(
        target: "dispenser",
        dispensers = config.dispensers,
        total_parts = total,
        "dispenser pool started"
    );

    while total > 0 && shutdown.sleep(sub_tick) {
        for _ in 0..config.dispensers {
            if total == 0 {
                break;
            }
            // Each dispenser drops a part this sub-tick with 80% probability.
            if rng.gen_range(0..5u8) >= 4 {
                continue;
            }

            let mut kind = PartKind::ALL[rng.gen_range(0..PartKind::COUNT)];
            let mut probes = 0;
            while remaining[kind] == 0 && probes < PartKind::COUNT {
                kind = kind.next_round_robin();
                probes += 1;
            }
            if remaining[kind] == 0 {
                continue;
            }

            let part = Part::new(kind, next_serial);
            match system.belt.inject_head(part, head_capacity) {
                Ok(()) => {
                    next_serial += 1;
                    remaining[kind] -= 1;
                    total -= 1;
                    system.stats.record_dispensed();
                    debug!(
                        target: "dispenser",
                        kind = %kind,
                        serial = part.serial,
                        remaining = total,
                        "part dispensed"
                    );

                    let pulse = system.balance_pulse.fetch_add(1, Ordering::Relaxed) + 1;
                    if pulse >= config.balance_every {
                        system.balance_pulse.store(0, Ordering::Relaxed);
                        balance_arms(&system);
                    }
                }
                Err(_) => {
                    // Head at capacity this tick; the budget is kept and the
                    // part re-rolled on a later sub-tick.
                    break;
                }
            }
        }
    }

    if total == 0 {
        info!(
            target: "dispenser",
            dispensed = system.stats.dispensed(),
            "all parts dispensed"
        );
        system.dispensing_done.store(true, Ordering::Release);
    }

    info!(target: "dispenser", "dispenser pool stopped");
}

/// Load balancing: in every enabled cell, park the arm that has moved the
/// most parts — but only if it is idle right now.
fn balance_arms(system: &System) {
    let now = Instant::now();
    for cell in &system.cells {
        if !cell.is_enabled() {
            continue;
        }
        if let Some(index) = busiest_arm(cell) {
            if cell.arms()[index].suspend_if_idle(now) {
                debug!(
                    target: "dispenser",
                    cell = cell.id(),
                    arm = index,
                    "arm suspended for load balancing"
                );
            }
        }
    }
}
