//! Simulation configuration: primary parameters, tunables, derived timing.

use crate::error::ConfigError;
use crate::part::KindMap;
use std::time::Duration;

/// Maximum number of packaging cells along the belt.
pub const MAX_CELLS: usize = 4;

/// Maximum belt length in slots.
pub const MAX_POSITIONS: usize = 100;

/// Configuration for a simulation run.
///
/// The first six fields are the primary parameters (what the CLI takes
/// positionally); the rest are tunables with the standard defaults, all
/// overridable through the `with_*` setters so tests can compress wall-clock
/// time.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Number of dispensers feeding the belt head.
    pub dispensers: u32,
    /// Number of packaging cells.
    pub cells: u32,
    /// Number of SETs to assemble across the whole run.
    pub sets: u32,
    /// Parts of each kind required per SET.
    pub per_set: KindMap<u32>,
    /// Belt velocity in steps per second.
    pub velocity: u32,
    /// Belt length in slots.
    pub length: u32,

    /// Upper bound on the operator's review latency.
    pub review_max: Duration,
    /// How long a load-balanced arm stays suspended.
    pub suspension: Duration,
    /// Injections between load-balance events.
    pub balance_every: u32,
    /// Maximum parts a belt slot can hold.
    pub slot_capacity: usize,
    /// Capacity of each cell's overflow buffer.
    pub overflow_capacity: usize,
    /// Maximum arms of one cell simultaneously withdrawing.
    pub max_withdrawers: usize,
    /// Robotic arms per cell.
    pub arms_per_cell: usize,
    /// Arm cycles without kit progress before the detector evaluates release.
    pub stall_threshold: u32,
    /// Manager cycles before an uncommitted cell counts as idle.
    pub idle_busy_cycles: u32,
    /// Idle-cycle count beyond which the manager may disable a cell.
    pub idle_disable_cycles: u32,
    /// Delay before the dynamic manager starts observing.
    pub manager_warmup: Duration,
    /// Interval between manager observations.
    pub manager_period: Duration,
    /// Whether the dynamic manager runs at all.
    pub manager_enabled: bool,
    /// Arm main-loop polling interval.
    pub arm_poll: Duration,
    /// Simulated duration of a single pick off the belt.
    pub pick_time: Duration,
    /// Extra settling time granted after the last part is dispensed.
    pub drain_grace: Duration,
    /// Supervisor acknowledgement-drain polling interval.
    pub ack_poll: Duration,
    /// Master seed; every worker derives its own generator from it.
    pub seed: u64,
}

impl SimConfig {
    /// Creates a configuration from the six primary parameters, with all
    /// tunables at their defaults.
    pub fn new(
        dispensers: u32,
        cells: u32,
        sets: u32,
        per_set: KindMap<u32>,
        velocity: u32,
        length: u32,
    ) -> Self {
        Self {
            dispensers,
            cells,
            sets,
            per_set,
            velocity,
            length,
            ..Self::default()
        }
    }

    /// Sets the master seed for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the operator review latency upper bound.
    pub fn with_review_max(mut self, review_max: Duration) -> Self {
        self.review_max = review_max;
        self
    }

    /// Sets the arm suspension duration.
    pub fn with_suspension(mut self, suspension: Duration) -> Self {
        self.suspension = suspension;
        self
    }

    /// Sets the no-progress threshold of the release detector.
    pub fn with_stall_threshold(mut self, cycles: u32) -> Self {
        self.stall_threshold = cycles;
        self
    }

    /// Enables or disables the dynamic cell manager.
    pub fn with_manager(mut self, enabled: bool) -> Self {
        self.manager_enabled = enabled;
        self
    }

    /// Compresses every timing knob for fast test runs.
    pub fn with_compressed_timing(mut self) -> Self {
        self.review_max = Duration::ZERO;
        self.arm_poll = Duration::from_millis(2);
        self.pick_time = Duration::ZERO;
        self.drain_grace = Duration::from_millis(100);
        self.ack_poll = Duration::from_millis(20);
        self.manager_warmup = Duration::from_millis(100);
        self.manager_period = Duration::from_millis(100);
        self.suspension = Duration::from_millis(50);
        self
    }

    /// Validates the primary parameters against the system limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispensers == 0 {
            return Err(ConfigError::NoDispensers);
        }
        if self.cells == 0 || self.cells as usize > MAX_CELLS {
            return Err(ConfigError::CellCount);
        }
        let min_length = self.cells as usize + 1;
        if (self.length as usize) < min_length || self.length as usize > MAX_POSITIONS {
            return Err(ConfigError::BeltLength { min: min_length });
        }
        if self.velocity == 0 {
            return Err(ConfigError::NoVelocity);
        }
        if self.sets > 0 && self.per_set.total() == 0 {
            return Err(ConfigError::EmptySet);
        }
        if self.dispensers as usize > self.slot_capacity {
            return Err(ConfigError::HeadOverCapacity {
                dispensers: self.dispensers as usize,
                capacity: self.slot_capacity,
            });
        }
        Ok(())
    }

    /// Belt tick period (`1/velocity`).
    #[inline]
    pub fn tick(&self) -> Duration {
        Duration::from_secs(1) / self.velocity.max(1)
    }

    /// Dispenser cadence: half a belt tick.
    #[inline]
    pub fn sub_tick(&self) -> Duration {
        self.tick() / 2
    }

    /// Cell positions distributed uniformly along the belt:
    /// `x_i = (i + 1) * (length / (cells + 1))`.
    pub fn cell_positions(&self) -> Vec<usize> {
        let step = self.length as usize / (self.cells as usize + 1);
        (0..self.cells as usize).map(|i| (i + 1) * step).collect()
    }

    /// Parts of all kinds required by a single SET.
    #[inline]
    pub fn parts_per_set(&self) -> u32 {
        self.per_set.total()
    }

    /// Total parts the dispensers will inject over the whole run.
    #[inline]
    pub fn total_parts(&self) -> u64 {
        u64::from(self.parts_per_set()) * u64::from(self.sets)
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dispensers: 4,
            cells: 2,
            sets: 3,
            per_set: KindMap::from([3, 2, 2, 1]),
            velocity: 3,
            length: 25,
            review_max: Duration::from_millis(2000),
            suspension: Duration::from_millis(1000),
            balance_every: 10,
            slot_capacity: 10,
            overflow_capacity: 20,
            max_withdrawers: 2,
            arms_per_cell: 4,
            stall_threshold: 100,
            idle_busy_cycles: 5,
            idle_disable_cycles: 8,
            manager_warmup: Duration::from_secs(3),
            manager_period: Duration::from_secs(2),
            manager_enabled: true,
            arm_poll: Duration::from_millis(10),
            pick_time: Duration::from_millis(30),
            drain_grace: Duration::from_secs(3),
            ack_poll: Duration::from_millis(500),
            seed: 0,
        }
    }
}
