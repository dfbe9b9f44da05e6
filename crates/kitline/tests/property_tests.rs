//! Property-based tests for the state invariants of the core data types.
//!
//! These exercise the same invariants the workers assert at mutation sites:
//! admission bounds on the ledger, capacity bounds on belt slots, and the
//! kit's never-overfilled accounting.

use kitline::{Belt, KindMap, Kit, Part, PartKind, SetLedger};
use proptest::prelude::*;

fn arb_kind() -> impl Strategy<Value = PartKind> {
    prop_oneof![
        Just(PartKind::A),
        Just(PartKind::B),
        Just(PartKind::C),
        Just(PartKind::D),
    ]
}

// =============================================================================
// Kit: counts never exceed requirements, completion algebra is consistent
// =============================================================================

proptest! {
    #[test]
    fn kit_never_overfills(
        required in prop::array::uniform4(0u32..4),
        places in prop::collection::vec(arb_kind(), 0..64),
    ) {
        let required = KindMap::from(required);
        let mut kit = Kit::new(required);

        for kind in places {
            kit.place(kind);
            prop_assert!(kit.current()[kind] <= required[kind],
                "kit overfilled for {kind}: {} > {}", kit.current()[kind], required[kind]);
        }

        // Completion is exactly "no deficit anywhere".
        prop_assert_eq!(kit.is_full(), kit.missing().total() == 0);
        prop_assert!(kit.current_total() <= required.total());
    }

    #[test]
    fn kit_reset_restores_the_empty_state(
        required in prop::array::uniform4(0u32..4),
        places in prop::collection::vec(arb_kind(), 0..32),
    ) {
        let mut kit = Kit::new(KindMap::from(required));
        for kind in places {
            kit.place(kind);
        }
        kit.reset();
        prop_assert!(kit.is_empty());
        prop_assert!(!kit.is_complete());
        prop_assert_eq!(kit.missing(), kit.required());
    }
}

// =============================================================================
// Ledger: 0 ≤ completed ≤ completed + in_progress ≤ target, at every step
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum LedgerOp {
    Commit,
    AckOk,
    AckFail,
    Release,
}

fn arb_ledger_op() -> impl Strategy<Value = LedgerOp> {
    prop_oneof![
        Just(LedgerOp::Commit),
        Just(LedgerOp::AckOk),
        Just(LedgerOp::AckFail),
        Just(LedgerOp::Release),
    ]
}

proptest! {
    #[test]
    fn ledger_admission_bound_holds(
        target in 0u32..6,
        ops in prop::collection::vec(arb_ledger_op(), 0..64),
    ) {
        let ledger = SetLedger::new(target);
        // Acknowledgements and releases only make sense against live
        // commitments; track them so the op sequence stays well-formed.
        let mut live = 0u32;

        for op in ops {
            match op {
                LedgerOp::Commit => {
                    if ledger.try_commit(|| true) {
                        live += 1;
                    }
                }
                LedgerOp::AckOk if live > 0 => {
                    ledger.acknowledge(true);
                    live -= 1;
                }
                LedgerOp::AckFail if live > 0 => {
                    ledger.acknowledge(false);
                    live -= 1;
                }
                LedgerOp::Release if live > 0 => {
                    ledger.release();
                    live -= 1;
                }
                _ => {}
            }

            let completed = ledger.completed();
            let in_progress = ledger.in_progress();
            prop_assert!(completed + in_progress <= target,
                "admission bound violated: {completed} + {in_progress} > {target}");
            prop_assert_eq!(in_progress, live);
        }
    }
}

// =============================================================================
// Belt: slot capacity bound and part conservation across advances
// =============================================================================

proptest! {
    #[test]
    fn belt_conserves_parts_and_respects_capacity(
        length in 2usize..8,
        ops in prop::collection::vec((0u8..3, arb_kind()), 0..64),
    ) {
        let slot_capacity = 3;
        let belt = Belt::new(length, slot_capacity);

        let mut injected = 0u64;
        let mut discarded = 0u64;
        let mut withdrawn = 0u64;
        let mut serial = 1u64;

        for (op, kind) in ops {
            match op {
                0 => {
                    if belt.inject_head(Part::new(kind, serial), slot_capacity).is_ok() {
                        injected += 1;
                        serial += 1;
                    }
                }
                1 => {
                    discarded += belt.advance().len() as u64;
                }
                _ => {
                    for position in 0..length {
                        prop_assert!(belt.slot_len(position) <= slot_capacity);
                    }
                    if belt.withdraw_at(0, |p| p.kind == kind).is_some() {
                        withdrawn += 1;
                    }
                }
            }
            prop_assert_eq!(belt.total_parts() + discarded + withdrawn, injected,
                "belt lost or invented parts");
        }
    }
}

// =============================================================================
// Budget arithmetic used by the dispenser
// =============================================================================

proptest! {
    #[test]
    fn kind_map_total_matches_manual_sum(values in prop::array::uniform4(0u32..1000)) {
        let map = KindMap::from(values);
        let manual: u32 = values.iter().sum();
        prop_assert_eq!(map.total(), manual);
        prop_assert_eq!(map.any(), manual > 0);
    }
}
