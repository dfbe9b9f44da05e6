//! Kitline - Discrete-Event Kit-Packing Line Simulation
//!
//! Simulates an assembly line that packs heterogeneous parts into kits:
//! dispensers inject parts of four kinds at the head of a conveyor belt, the
//! belt advances at a fixed rate, packaging cells withdraw parts with
//! robotic arms under contention bounds, a simulated operator reviews
//! finished kits, and a dynamic manager scales the number of active cells
//! with observed backpressure.
//!
//! # Key Properties
//!
//! - At most one kit in flight per cell, linearised by a global admission
//!   ledger
//! - Bounded per-cell withdrawer concurrency and an explicit single-placer
//!   permit on every kit
//! - A fixed system-wide lock order (ledger → cell → kit → overflow → slot)
//!   encoded in the API rather than left to caller discipline
//! - Progress detection that returns stranded parts to the belt so other
//!   cells benefit
//! - Bounded-time shutdown: every worker polls one terminate flag
//!
//! # Example
//!
//! ```no_run
//! use kitline::{KindMap, SimConfig, Simulation};
//!
//! let config = SimConfig::new(4, 2, 3, KindMap::from([3, 2, 2, 1]), 3, 25)
//!     .with_seed(42);
//! let simulation = Simulation::new(config).unwrap();
//! let report = simulation.run().unwrap();
//! println!("{} ({} kits OK)", report.outcome, report.snapshot.kits_ok);
//! ```

mod arm;
mod belt;
mod cell;
mod config;
mod dispenser;
mod error;
mod invariants;
mod kit;
mod ledger;
mod manager;
mod operator;
mod part;
mod stats;
mod supervisor;
mod sync;
mod system;

pub use belt::Belt;
pub use cell::{Arm, ArmState, Cell, CellFlags, CellState};
pub use config::{SimConfig, MAX_CELLS, MAX_POSITIONS};
pub use error::{ConfigError, SimError};
pub use kit::Kit;
pub use ledger::SetLedger;
pub use operator::OperatorQueue;
pub use part::{KindMap, Part, PartKind, RETURNED_SERIAL};
pub use stats::Snapshot;
pub use supervisor::{Outcome, RunReport, Simulation};
pub use sync::{Permit, Semaphore, ShutdownFlag};
