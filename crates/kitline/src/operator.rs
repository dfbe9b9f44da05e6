//! The operator: a single consumer that reviews completed kits.
//!
//! Cells enqueue themselves when their kit completes; the operator dequeues
//! in FIFO order, simulates a review with a random latency, classifies the
//! kit OK or FAIL, resets it, and returns the cell to service. The timed
//! wait keeps shutdown observation bounded to ~100 ms.

use crate::cell::CellState;
use crate::part::PartKind;
use crate::sync::ShutdownFlag;
use crate::system::System;
use parking_lot::{Condvar, Mutex};
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Queue capacity. At most `MAX_CELLS` cells can be awaiting review at once,
/// so the queue can never actually fill; pushes are still guarded.
const QUEUE_CAPACITY: usize = 10;

/// How long the operator waits on the queue before re-checking shutdown.
const WAIT_TIMEOUT: Duration = Duration::from_millis(100);

/// Bounded FIFO of cell ids awaiting acknowledgement.
#[derive(Debug, Default)]
pub struct OperatorQueue {
    queue: Mutex<VecDeque<usize>>,
    ready: Condvar,
}

impl OperatorQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a cell for review. A full queue discards the notification;
    /// with the capacity above the concurrent-completion bound this does not
    /// happen in practice.
    pub fn push(&self, cell_id: usize) -> bool {
        let mut queue = self.queue.lock();
        if queue.len() >= QUEUE_CAPACITY {
            warn!(target: "operator", cell = cell_id, "acknowledgement queue full");
            return false;
        }
        queue.push_back(cell_id);
        drop(queue);
        self.ready.notify_one();
        true
    }

    /// Dequeues the next cell, waiting up to `timeout` for one to arrive.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<usize> {
        let mut queue = self.queue.lock();
        if queue.is_empty() {
            self.ready.wait_for(&mut queue, timeout);
        }
        queue.pop_front()
    }

    /// Empties the queue. Used by the shutdown drain.
    pub fn drain(&self) -> Vec<usize> {
        self.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

/// The operator worker.
pub(crate) fn run(system: Arc<System>, shutdown: ShutdownFlag, mut rng: StdRng) {
    info!(target: "operator", "operator started");

    while !shutdown.is_triggered() {
        let Some(cell_id) = system.operator_queue.pop_timeout(WAIT_TIMEOUT) else {
            continue;
        };
        acknowledge(&system, cell_id, Some((&mut rng, &shutdown)));
    }

    // Whatever is still queued represents genuinely completed kits; process
    // them as OK so the counters close out.
    for cell_id in system.operator_queue.drain() {
        info!(target: "operator", cell = cell_id, "processing pending kit during shutdown");
        acknowledge(&system, cell_id, None);
    }

    info!(target: "operator", "operator stopped");
}

/// Reviews one completed kit: classify, credit, reset, reactivate.
///
/// `review` carries the generator and shutdown flag for the simulated
/// latency; `None` (the shutdown drain) skips the sleep.
fn acknowledge(system: &System, cell_id: usize, review: Option<(&mut StdRng, &ShutdownFlag)>) {
    let cell = &system.cells[cell_id];

    let ok = {
        let kit = cell.kit().lock();
        let current = kit.current();
        let required = kit.required();
        PartKind::ALL
            .iter()
            .all(|&kind| current[kind] == required[kind])
    };

    if let Some((rng, shutdown)) = review {
        let max = system.config.review_max.as_millis() as u64;
        let latency = Duration::from_millis(rng.gen_range(0..=max));
        shutdown.sleep(latency);
    }

    if ok {
        info!(
            target: "operator",
            cell = cell_id,
            completed = system.ledger.completed() + 1,
            target_sets = system.ledger.target(),
            "kit acknowledged OK"
        );
    } else {
        // A cell reported completion but the kit does not match its
        // requirements; the counts say which kind broke the invariant.
        let kit = cell.kit().lock();
        warn!(
            target: "operator",
            cell = cell_id,
            current = ?kit.current(),
            required = ?kit.required(),
            "kit rejected as FAIL"
        );
    }

    system.stats.record_kit(ok);
    cell.tally(ok);

    cell.kit().lock().reset();
    cell.with_flags(|flags| {
        flags.working_on_set = false;
        flags.state = CellState::Active;
    });
    system.ledger.acknowledge(ok);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn capacity_covers_every_cell() {
        // Every cell can be awaiting review at once; the queue must never
        // have to discard a completion notification.
        assert!(QUEUE_CAPACITY >= crate::config::MAX_CELLS);
    }

    #[test]
    fn fifo_order() {
        let queue = OperatorQueue::new();
        assert!(queue.push(2));
        assert!(queue.push(0));
        assert!(queue.push(1));
        assert_eq!(queue.pop_timeout(Duration::ZERO), Some(2));
        assert_eq!(queue.pop_timeout(Duration::ZERO), Some(0));
        assert_eq!(queue.pop_timeout(Duration::ZERO), Some(1));
        assert!(queue.is_empty());
    }

    #[test]
    fn push_refused_at_capacity() {
        let queue = OperatorQueue::new();
        for i in 0..QUEUE_CAPACITY {
            assert!(queue.push(i));
        }
        assert!(!queue.push(99));
        assert_eq!(queue.len(), QUEUE_CAPACITY);
    }

    #[test]
    fn pop_times_out_on_empty_queue() {
        let queue = OperatorQueue::new();
        let start = Instant::now();
        assert_eq!(queue.pop_timeout(Duration::from_millis(30)), None);
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn pop_wakes_on_push() {
        let queue = Arc::new(OperatorQueue::new());
        let queue2 = Arc::clone(&queue);
        let consumer =
            thread::spawn(move || queue2.pop_timeout(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        queue.push(3);
        assert_eq!(consumer.join().unwrap(), Some(3));
    }
}
