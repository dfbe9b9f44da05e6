//! The conveyor belt: a fixed sequence of bounded slots advancing on a tick.
//!
//! Locking discipline: any operation touching multiple slots (the advance)
//! takes the coarse belt lock before any slot lock; operations on a single
//! slot (inject, return, withdraw, census) take only that slot's lock. Slot
//! locks are the innermost locks in the whole system.

use crate::invariants::debug_assert_slot_bounded;
use crate::part::{KindMap, Part};
use crate::sync::ShutdownFlag;
use crate::system::System;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// One belt position holding a small multiset of parts.
#[derive(Debug, Default)]
pub struct Slot {
    parts: Vec<Part>,
}

impl Slot {
    fn push(&mut self, part: Part, capacity: usize) -> Result<(), Part> {
        if self.parts.len() >= capacity {
            return Err(part);
        }
        self.parts.push(part);
        Ok(())
    }

    /// Removes and returns the leftmost part satisfying `pred`.
    fn take_first(&mut self, mut pred: impl FnMut(&Part) -> bool) -> Option<Part> {
        let index = self.parts.iter().position(|part| pred(part))?;
        Some(self.parts.remove(index))
    }

    fn kind_counts(&self) -> KindMap<u32> {
        let mut counts = KindMap::default();
        for part in &self.parts {
            counts[part.kind] += 1;
        }
        counts
    }
}

/// The conveyor belt.
#[derive(Debug)]
pub struct Belt {
    slots: Vec<Mutex<Slot>>,
    /// Orders advances against each other and keeps multi-slot shifts atomic
    /// with respect to other multi-slot operations.
    advance_lock: Mutex<()>,
    slot_capacity: usize,
}

impl Belt {
    pub fn new(length: usize, slot_capacity: usize) -> Self {
        Self {
            slots: (0..length).map(|_| Mutex::new(Slot::default())).collect(),
            advance_lock: Mutex::new(()),
            slot_capacity,
        }
    }

    /// Number of slots.
    #[inline]
    pub fn length(&self) -> usize {
        self.slots.len()
    }

    /// Advances every part one position towards the tail.
    ///
    /// The tail slot is drained first and its parts returned to the caller
    /// (they fall into the discard bin); then each slot's contents shift one
    /// position down, leaving the head empty.
    pub fn advance(&self) -> Vec<Part> {
        let _coarse = self.advance_lock.lock();

        let discarded = {
            let mut tail = self.slots[self.length() - 1].lock();
            std::mem::take(&mut tail.parts)
        };

        for i in (1..self.length()).rev() {
            let mut dst = self.slots[i].lock();
            let mut src = self.slots[i - 1].lock();
            debug_assert!(dst.parts.is_empty(), "advance into a non-empty slot");
            std::mem::swap(&mut dst.parts, &mut src.parts);
        }

        discarded
    }

    /// Appends a part to the head slot, bounded by `head_capacity` (one part
    /// per dispenser per tick, which is tighter than the slot capacity).
    pub fn inject_head(&self, part: Part, head_capacity: usize) -> Result<(), Part> {
        let mut head = self.slots[0].lock();
        let capacity = head_capacity.min(self.slot_capacity);
        let result = head.push(part, capacity);
        debug_assert_slot_bounded!(head.parts.len(), self.slot_capacity, 0);
        result
    }

    /// Inserts a part into the slot at `position`, bounded by the slot
    /// capacity. Used by cells returning parts.
    pub fn push_at(&self, position: usize, part: Part) -> Result<(), Part> {
        let mut slot = self.slots[position].lock();
        let result = slot.push(part, self.slot_capacity);
        debug_assert_slot_bounded!(slot.parts.len(), self.slot_capacity, position);
        result
    }

    /// `true` if the slot at `position` holds a part satisfying `pred`.
    pub fn contains_at(&self, position: usize, mut pred: impl FnMut(&Part) -> bool) -> bool {
        self.slots[position].lock().parts.iter().any(|p| pred(p))
    }

    /// Withdraws the leftmost part at `position` satisfying `pred`.
    pub fn withdraw_at(
        &self,
        position: usize,
        pred: impl FnMut(&Part) -> bool,
    ) -> Option<Part> {
        self.slots[position].lock().take_first(pred)
    }

    /// Per-kind part counts over slots `0..=position`.
    ///
    /// Slots are sampled one at a time, so the census is a momentary view,
    /// which is all the release detector needs.
    pub fn census_through(&self, position: usize) -> KindMap<u32> {
        let mut counts = KindMap::default();
        for slot in &self.slots[..=position] {
            let slot = slot.lock();
            for (kind, n) in slot.kind_counts().iter() {
                counts[kind] += n;
            }
        }
        counts
    }

    /// Total parts currently anywhere on the belt.
    pub fn total_parts(&self) -> u64 {
        self.slots
            .iter()
            .map(|slot| slot.lock().parts.len() as u64)
            .sum()
    }

    /// Parts currently in the slot at `position`.
    pub fn slot_len(&self, position: usize) -> usize {
        self.slots[position].lock().parts.len()
    }
}

/// The belt worker: sleeps one tick period, then advances, crediting the
/// discard bin for whatever fell off the tail.
pub(crate) fn run(system: Arc<System>, shutdown: ShutdownFlag) {
    let tick = system.config.tick();
    info!(
        target: "belt",
        velocity = system.config.velocity,
        length = system.config.length,
        "belt started"
    );

    while shutdown.sleep(tick) {
        let discarded = system.belt.advance();
        for part in discarded {
            system.stats.record_discard(part.kind);
            debug!(
                target: "belt",
                kind = %part.kind,
                serial = part.serial,
                total = system.stats.discarded_total(),
                "part fell into the discard bin"
            );
        }
    }

    info!(target: "belt", "belt stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::part::PartKind;

    fn part(kind: PartKind, serial: u64) -> Part {
        Part::new(kind, serial)
    }

    #[test]
    fn advance_shifts_and_discards_tail() {
        let belt = Belt::new(3, 10);
        belt.inject_head(part(PartKind::A, 1), 4).unwrap();
        belt.inject_head(part(PartKind::B, 2), 4).unwrap();

        assert!(belt.advance().is_empty());
        assert_eq!(belt.slot_len(0), 0);
        assert_eq!(belt.slot_len(1), 2);

        belt.inject_head(part(PartKind::C, 3), 4).unwrap();
        assert!(belt.advance().is_empty());

        // A and B are now on the tail; the next advance discards them.
        let discarded = belt.advance();
        assert_eq!(discarded.len(), 2);
        assert!(discarded.iter().any(|p| p.kind == PartKind::A));
        assert_eq!(belt.total_parts(), 1);
    }

    #[test]
    fn head_injection_respects_dispenser_capacity() {
        let belt = Belt::new(2, 10);
        assert!(belt.inject_head(part(PartKind::A, 1), 2).is_ok());
        assert!(belt.inject_head(part(PartKind::A, 2), 2).is_ok());
        let refused = belt.inject_head(part(PartKind::A, 3), 2);
        assert_eq!(refused.unwrap_err().serial, 3);
    }

    #[test]
    fn push_at_respects_slot_capacity() {
        let belt = Belt::new(2, 2);
        assert!(belt.push_at(1, part(PartKind::D, 1)).is_ok());
        assert!(belt.push_at(1, part(PartKind::D, 2)).is_ok());
        assert!(belt.push_at(1, part(PartKind::D, 3)).is_err());
    }

    #[test]
    fn withdraw_takes_leftmost_match() {
        let belt = Belt::new(1, 10);
        belt.push_at(0, part(PartKind::A, 1)).unwrap();
        belt.push_at(0, part(PartKind::B, 2)).unwrap();
        belt.push_at(0, part(PartKind::B, 3)).unwrap();

        let got = belt.withdraw_at(0, |p| p.kind == PartKind::B).unwrap();
        assert_eq!(got.serial, 2, "leftmost B first");
        assert!(belt.contains_at(0, |p| p.serial == 3));
        assert!(belt.withdraw_at(0, |p| p.kind == PartKind::C).is_none());
    }

    #[test]
    fn census_covers_prefix_only() {
        let belt = Belt::new(4, 10);
        belt.push_at(0, part(PartKind::A, 1)).unwrap();
        belt.push_at(2, part(PartKind::B, 2)).unwrap();
        belt.push_at(3, part(PartKind::B, 3)).unwrap();

        let counts = belt.census_through(2);
        assert_eq!(counts[PartKind::A], 1);
        assert_eq!(counts[PartKind::B], 1, "slot 3 is beyond the census");
    }
}
