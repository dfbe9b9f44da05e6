//! The kit assembled by a cell: per-kind counts against requirements.

use crate::invariants::debug_assert_kit_not_overfilled;
use crate::part::{KindMap, PartKind};

/// A kit-in-progress.
///
/// The completion flag is set exactly once per assembly by the placing arm;
/// the operator clears it together with the counts. Callers are expected to
/// hold the owning cell's kit lock (and, for writes, its placer permit).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kit {
    current: KindMap<u32>,
    required: KindMap<u32>,
    complete: bool,
}

impl Kit {
    /// An empty kit with the given per-kind requirements.
    pub fn new(required: KindMap<u32>) -> Self {
        Self {
            current: KindMap::default(),
            required,
            complete: false,
        }
    }

    /// `true` while the kit still needs a part of `kind`.
    #[inline]
    pub fn needs(&self, kind: PartKind) -> bool {
        !self.complete && self.current[kind] < self.required[kind]
    }

    /// Adds one part of `kind` if still needed. Returns whether it was placed.
    pub fn place(&mut self, kind: PartKind) -> bool {
        if !self.needs(kind) {
            return false;
        }
        self.current[kind] += 1;
        debug_assert_kit_not_overfilled!(self.current[kind], self.required[kind], kind);
        true
    }

    /// `true` when every kind has reached its requirement.
    pub fn is_full(&self) -> bool {
        PartKind::ALL
            .iter()
            .all(|&kind| self.current[kind] == self.required[kind])
    }

    /// Marks the kit complete; arms stop considering it from here on.
    #[inline]
    pub fn mark_complete(&mut self) {
        self.complete = true;
    }

    /// The completion flag.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Parts still missing per kind.
    pub fn missing(&self) -> KindMap<u32> {
        KindMap::from_fn(|kind| self.required[kind].saturating_sub(self.current[kind]))
    }

    /// Parts currently placed, per kind.
    #[inline]
    pub fn current(&self) -> KindMap<u32> {
        self.current
    }

    /// The per-kind requirements.
    #[inline]
    pub fn required(&self) -> KindMap<u32> {
        self.required
    }

    /// Total parts currently in the kit.
    #[inline]
    pub fn current_total(&self) -> u32 {
        self.current.total()
    }

    /// `true` if the kit holds no parts.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.current_total() == 0
    }

    /// Removes one part of `kind`, if present. Used when releasing parts
    /// back onto the belt.
    pub fn take(&mut self, kind: PartKind) -> bool {
        if self.current[kind] == 0 {
            return false;
        }
        self.current[kind] -= 1;
        true
    }

    /// Clears counts and the completion flag. Idempotent on an empty kit.
    pub fn reset(&mut self) {
        self.current = KindMap::default();
        self.complete = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kit() -> Kit {
        Kit::new(KindMap::from([2, 1, 0, 0]))
    }

    #[test]
    fn fills_and_completes() {
        let mut kit = kit();
        assert!(kit.needs(PartKind::A));
        assert!(!kit.needs(PartKind::C));

        assert!(kit.place(PartKind::A));
        assert!(kit.place(PartKind::A));
        assert!(!kit.place(PartKind::A), "third A must be refused");
        assert!(!kit.is_full());

        assert!(kit.place(PartKind::B));
        assert!(kit.is_full());

        kit.mark_complete();
        assert!(kit.is_complete());
        assert!(!kit.needs(PartKind::B));
    }

    #[test]
    fn missing_tracks_deficit() {
        let mut kit = kit();
        assert_eq!(kit.missing()[PartKind::A], 2);
        kit.place(PartKind::A);
        assert_eq!(kit.missing()[PartKind::A], 1);
        assert_eq!(kit.missing().total(), 2);
    }

    #[test]
    fn reset_is_idempotent_on_empty() {
        let mut kit = kit();
        kit.place(PartKind::A);
        kit.mark_complete();
        kit.reset();
        assert!(kit.is_empty());
        assert!(!kit.is_complete());

        let snapshot = kit.clone();
        kit.reset();
        assert_eq!(kit, snapshot);
    }

    #[test]
    fn take_removes_placed_parts() {
        let mut kit = kit();
        kit.place(PartKind::A);
        assert!(kit.take(PartKind::A));
        assert!(!kit.take(PartKind::A));
        assert!(kit.is_empty());
    }
}
