//! Top-level lifecycle: spawn every worker, watch the run to its end state,
//! and shut the system down in bounded time.

use crate::cell::CellState;
use crate::config::SimConfig;
use crate::error::SimError;
use crate::part::PartKind;
use crate::stats::Snapshot;
use crate::sync::ShutdownFlag;
use crate::system::System;
use crate::{arm, belt, dispenser, manager, operator};
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Acknowledgement-drain cycles without progress before stuck cells are
/// forced to release their parts (~5 s at the standard 500 ms poll).
const FORCE_RELEASE_CYCLES: u32 = 10;

/// Cycles without progress, with nobody awaiting review, before the run is
/// declared stalled (~10 s at the standard poll).
const STALL_CYCLES: u32 = 20;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every requested SET was assembled and acknowledged.
    Completed,
    /// No cell was committed and the parts left in the system cannot cover
    /// the remaining SETs.
    InsufficientParts,
    /// No progress for too long with nothing awaiting review.
    Stalled,
    /// The wall-clock acknowledgement timeout elapsed.
    TimedOut,
    /// Termination was requested from outside (signal).
    Interrupted,
}

impl Outcome {
    /// `true` if the run produced everything it was asked for.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Completed => "completed",
            Self::InsufficientParts => "insufficient parts",
            Self::Stalled => "stalled",
            Self::TimedOut => "timed out",
            Self::Interrupted => "interrupted",
        };
        f.write_str(text)
    }
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: Outcome,
    pub snapshot: Snapshot,
}

/// A configured simulation, ready to run.
pub struct Simulation {
    system: Arc<System>,
}

impl Simulation {
    /// Validates the configuration and builds the shared system state.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        Ok(Self {
            system: System::new(config),
        })
    }

    /// A handle for requesting termination from outside (signal handlers).
    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.system.shutdown.clone()
    }

    /// Runs the simulation to completion and reports how it ended.
    ///
    /// Blocks the calling thread, which acts as the supervisor.
    pub fn run(self) -> Result<RunReport, SimError> {
        let system = self.system;
        let shutdown = system.shutdown.clone();
        let config = system.config.clone();

        if config.sets == 0 {
            info!(target: "supervisor", "nothing to assemble, finishing immediately");
            return Ok(RunReport {
                outcome: Outcome::Completed,
                snapshot: system.snapshot(),
            });
        }

        info!(
            target: "supervisor",
            cells = config.cells,
            sets = config.sets,
            seed = config.seed,
            "simulation starting"
        );

        let handles = spawn_workers(&system, &shutdown)?;

        // Phase one: wait for the dispensers to exhaust their budgets.
        while !system.dispensing_done.load(Ordering::Acquire) && !shutdown.is_triggered() {
            std::thread::sleep(Duration::from_millis(100).min(config.ack_poll));
        }

        let outcome = if shutdown.is_triggered() {
            Outcome::Interrupted
        } else {
            // Phase two: give the belt time to carry the last parts past the
            // cells, then watch acknowledgements until an end state.
            let drain = config.tick() * config.length + config.drain_grace;
            info!(target: "supervisor", ?drain, "belt drain grace");
            if shutdown.sleep(drain) {
                watch_acknowledgements(&system, &shutdown)
            } else {
                Outcome::Interrupted
            }
        };

        info!(target: "supervisor", %outcome, "simulation finished, shutting down workers");
        shutdown.trigger();
        join_workers(handles);

        Ok(RunReport {
            outcome,
            snapshot: system.snapshot(),
        })
    }
}

fn spawn_one(
    name: String,
    handles: &mut Vec<(String, JoinHandle<()>)>,
    body: impl FnOnce() + Send + 'static,
) -> Result<(), SimError> {
    match std::thread::Builder::new().name(name.clone()).spawn(body) {
        Ok(handle) => {
            handles.push((name, handle));
            Ok(())
        }
        Err(source) => Err(SimError::Spawn { worker: name, source }),
    }
}

fn spawn_workers(
    system: &Arc<System>,
    shutdown: &ShutdownFlag,
) -> Result<Vec<(String, JoinHandle<()>)>, SimError> {
    let mut handles = Vec::new();

    let result = (|| {
        {
            let system = Arc::clone(system);
            let shutdown = shutdown.clone();
            spawn_one("belt".into(), &mut handles, move || {
                belt::run(system, shutdown);
            })?;
        }
        {
            let system = Arc::clone(system);
            let shutdown = shutdown.clone();
            let rng = system.worker_rng(1);
            spawn_one("dispenser".into(), &mut handles, move || {
                dispenser::run(system, shutdown, rng);
            })?;
        }
        {
            let system = Arc::clone(system);
            let shutdown = shutdown.clone();
            let rng = system.worker_rng(2);
            spawn_one("operator".into(), &mut handles, move || {
                operator::run(system, shutdown, rng);
            })?;
        }
        for cell_id in 0..system.cells.len() {
            for arm_index in 0..system.config.arms_per_cell {
                let system = Arc::clone(system);
                let shutdown = shutdown.clone();
                spawn_one(format!("arm-{cell_id}-{arm_index}"), &mut handles, move || {
                    arm::run(system, cell_id, arm_index, shutdown);
                })?;
            }
        }
        if system.config.manager_enabled {
            let system = Arc::clone(system);
            let shutdown = shutdown.clone();
            spawn_one("manager".into(), &mut handles, move || {
                manager::run(system, shutdown);
            })?;
        }
        Ok(())
    })();

    if let Err(error) = result {
        // Partial start-up: tear down whatever already runs before failing.
        shutdown.trigger();
        join_workers(handles);
        return Err(error);
    }

    Ok(handles)
}

fn join_workers(handles: Vec<(String, JoinHandle<()>)>) {
    for (name, handle) in handles {
        if handle.join().is_err() {
            warn!(target: "supervisor", worker = %name, "worker panicked");
        }
    }
}

/// The acknowledgement-drain loop: poll until the run reaches an end state.
fn watch_acknowledgements(system: &System, shutdown: &ShutdownFlag) -> Outcome {
    let config = &system.config;
    let timeout = Duration::from_secs_f64(
        f64::from(config.sets) * (config.review_max.as_secs_f64() + 2.0) + 15.0,
    );
    let started = Instant::now();
    let parts_per_set = u64::from(config.parts_per_set());

    let mut last_completed = system.ledger.completed();
    let mut stagnant = 0u32;

    loop {
        if shutdown.is_triggered() {
            return Outcome::Interrupted;
        }

        let completed = system.ledger.completed();
        if completed >= config.sets {
            info!(
                target: "supervisor",
                completed,
                target_sets = config.sets,
                "all SETs completed"
            );
            return Outcome::Completed;
        }

        if completed > last_completed {
            last_completed = completed;
            stagnant = 0;
        } else {
            stagnant += 1;
        }

        let in_progress = system.ledger.in_progress();
        let still_needed = u64::from(config.sets - completed) * parts_per_set;
        if in_progress == 0 && system.parts_in_system() < still_needed {
            warn!(
                target: "supervisor",
                completed,
                target_sets = config.sets,
                "insufficient parts to finish the remaining SETs"
            );
            return Outcome::InsufficientParts;
        }

        if in_progress > 0 && stagnant > FORCE_RELEASE_CYCLES {
            force_release_stuck(system);
            stagnant = 0;
        }

        let awaiting = system.any_awaiting_operator();
        if stagnant > STALL_CYCLES && !awaiting {
            warn!(
                target: "supervisor",
                completed,
                target_sets = config.sets,
                "no progress and nothing awaiting review"
            );
            return Outcome::Stalled;
        }
        // A slow review is not a stall; hold the counter at the release
        // threshold while somebody waits for the operator.
        if awaiting && stagnant > FORCE_RELEASE_CYCLES {
            stagnant = FORCE_RELEASE_CYCLES;
        }

        if started.elapsed() >= timeout {
            warn!(target: "supervisor", "acknowledgement timeout elapsed");
            return Outcome::TimedOut;
        }

        if !shutdown.sleep(config.ack_poll) {
            return Outcome::Interrupted;
        }
    }
}

/// Forces a release on every committed, active, non-returning cell that
/// holds parts but provably cannot finish its SET where it sits.
fn force_release_stuck(system: &System) {
    for cell in &system.cells {
        let flags = cell.flags();
        if !flags.working_on_set
            || flags.state != CellState::Active
            || flags.returning_parts
        {
            continue;
        }

        let (missing, held) = {
            let kit = cell.kit().lock();
            (kit.missing(), kit.current_total())
        };
        if missing.total() == 0 || held == 0 {
            continue;
        }

        let available = system.availability(cell);
        let cannot_complete = PartKind::ALL
            .iter()
            .any(|&kind| missing[kind] > available[kind]);

        if cannot_complete && !system.is_last_cell(cell) {
            warn!(
                target: "supervisor",
                cell = cell.id(),
                "forcing stuck cell to release its parts"
            );
            system.release_parts(cell);
        }
    }
}
