//! Debug assertion macros for the system's state invariants.
//!
//! Checked at the mutation sites, active only in debug builds, so release
//! runs pay nothing.

/// Assert the global admission bound: `completed + in_progress <= target`.
macro_rules! debug_assert_ledger_bounds {
    ($completed:expr, $in_progress:expr, $target:expr) => {
        debug_assert!(
            $completed + $in_progress <= $target,
            "admission bound violated: completed {} + in progress {} exceeds target {}",
            $completed,
            $in_progress,
            $target
        )
    };
}

/// Assert that a slot never holds more parts than its capacity.
macro_rules! debug_assert_slot_bounded {
    ($len:expr, $capacity:expr, $position:expr) => {
        debug_assert!(
            $len <= $capacity,
            "slot {} over capacity: {} parts > {}",
            $position,
            $len,
            $capacity
        )
    };
}

/// Assert that a kit count never exceeds its requirement.
macro_rules! debug_assert_kit_not_overfilled {
    ($current:expr, $required:expr, $kind:expr) => {
        debug_assert!(
            $current <= $required,
            "kit overfilled for kind {}: {} > {}",
            $kind,
            $current,
            $required
        )
    };
}

/// Assert that a semaphore never holds more permits than it was created with.
macro_rules! debug_assert_permits_bounded {
    ($available:expr, $max:expr) => {
        debug_assert!(
            $available <= $max,
            "semaphore over-released: {} permits > capacity {}",
            $available,
            $max
        )
    };
}

pub(crate) use debug_assert_kit_not_overfilled;
pub(crate) use debug_assert_ledger_bounds;
pub(crate) use debug_assert_permits_bounded;
pub(crate) use debug_assert_slot_bounded;
