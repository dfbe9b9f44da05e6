//! Run statistics: hot atomic counters plus the plain snapshot handed to
//! whoever renders the final report.

use crate::part::{KindMap, PartKind};
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated concurrently by the workers.
///
/// Hot counters are cache-padded so the dispenser and the belt do not false-
/// share a line. Reads use `Relaxed`: every counter is monotonic and the
/// report only runs after the workers have joined.
#[derive(Debug)]
pub struct Stats {
    dispensed: CachePadded<AtomicU64>,
    discarded: KindMap<AtomicU64>,
    discarded_total: CachePadded<AtomicU64>,
    kits_ok: AtomicU64,
    kits_fail: AtomicU64,
    overflow_dropped: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            dispensed: CachePadded::new(AtomicU64::new(0)),
            discarded: KindMap::from_fn(|_| AtomicU64::new(0)),
            discarded_total: CachePadded::new(AtomicU64::new(0)),
            kits_ok: AtomicU64::new(0),
            kits_fail: AtomicU64::new(0),
            overflow_dropped: AtomicU64::new(0),
        }
    }

    pub fn record_dispensed(&self) {
        self.dispensed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discard(&self, kind: PartKind) {
        self.discarded[kind].fetch_add(1, Ordering::Relaxed);
        self.discarded_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_kit(&self, ok: bool) {
        if ok {
            self.kits_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.kits_fail.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_overflow_drop(&self) {
        self.overflow_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dispensed(&self) -> u64 {
        self.dispensed.load(Ordering::Relaxed)
    }

    pub fn discarded_total(&self) -> u64 {
        self.discarded_total.load(Ordering::Relaxed)
    }

    pub fn kits_ok(&self) -> u64 {
        self.kits_ok.load(Ordering::Relaxed)
    }

    pub fn kits_fail(&self) -> u64 {
        self.kits_fail.load(Ordering::Relaxed)
    }

    pub fn overflow_dropped(&self) -> u64 {
        self.overflow_dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn discarded(&self) -> KindMap<u64> {
        KindMap::from_fn(|kind| self.discarded[kind].load(Ordering::Relaxed))
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain-value view of a run's statistics, taken after the workers joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Parts injected onto the belt over the whole run.
    pub dispensed: u64,
    /// Discard-bin contents per kind.
    pub discarded: KindMap<u64>,
    /// Total parts in the discard bin.
    pub discarded_total: u64,
    /// Operator-acknowledged kits.
    pub kits_ok: u64,
    /// Kits the operator rejected.
    pub kits_fail: u64,
    /// Parts silently dropped on a full overflow buffer.
    pub overflow_dropped: u64,
    /// Parts moved by each arm, indexed `[cell][arm]`.
    pub arm_moves: Vec<Vec<u64>>,
    /// Per-cell (OK, FAIL) acknowledgement tallies.
    pub cell_tallies: Vec<(u64, u64)>,
    /// Parts still sitting in belt slots, overflow buffers, and kits when
    /// the run ended.
    pub parts_in_system: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = Stats::new();
        stats.record_dispensed();
        stats.record_dispensed();
        stats.record_discard(PartKind::B);
        stats.record_discard(PartKind::B);
        stats.record_discard(PartKind::D);
        stats.record_kit(true);
        stats.record_kit(false);

        assert_eq!(stats.dispensed(), 2);
        assert_eq!(stats.discarded_total(), 3);
        assert_eq!(stats.discarded()[PartKind::B], 2);
        assert_eq!(stats.discarded()[PartKind::A], 0);
        assert_eq!(stats.kits_ok(), 1);
        assert_eq!(stats.kits_fail(), 1);
    }
}
