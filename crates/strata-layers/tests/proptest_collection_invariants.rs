#![forbid(unsafe_code)]

//! Property tests for layer collection invariants.
//!
//! Validates:
//! - Names stay non-empty and pairwise unique under any sequence of
//!   add / remove / rename / copy.
//! - `reorder` preserves the order of the remainder and of the moved subset,
//!   keeps the moved layers contiguous, and places them next to the target
//!   per the single-shift tie-break.
//! - Reordering onto a member of the moved subset changes nothing and emits
//!   no notification.
//! - `generation` advances exactly once per notification.

use proptest::prelude::*;
use std::collections::HashSet;

use strata_harness::ChangeRecorder;
use strata_layers::{LayerCollection, LayerEntity, LayerId, LayerSpec};

const POOL: &[&str] = &["image", "image (2)", "seg", "mesh", "", "image (3)"];

#[derive(Debug, Clone)]
enum Op {
    Add(usize),
    Remove(usize),
    Rename(usize, usize),
    Copy(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..POOL.len()).prop_map(Op::Add),
        (0usize..16).prop_map(Op::Remove),
        ((0usize..16), (0..POOL.len())).prop_map(|(i, n)| Op::Rename(i, n)),
        (0usize..16).prop_map(Op::Copy),
    ]
}

fn assert_unique(collection: &LayerCollection) -> Result<(), TestCaseError> {
    let names = collection.names();
    let distinct: HashSet<&String> = names.iter().collect();
    prop_assert_eq!(distinct.len(), names.len(), "duplicate in {:?}", names);
    prop_assert!(names.iter().all(|n| !n.is_empty()), "empty name in {:?}", names);
    Ok(())
}

fn build(n: usize) -> (LayerCollection, Vec<LayerId>) {
    let collection = LayerCollection::new();
    let ids = (0..n)
        .map(|i| {
            collection
                .add(LayerEntity::new(format!("l{i}")), None)
                .unwrap()
        })
        .collect();
    (collection, ids)
}

// ============================================================================
// Invariant 1: names unique at every observable point
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn names_stay_unique(ops in prop::collection::vec(op(), 1..40)) {
        let collection = LayerCollection::new();
        for op in ops {
            let len = collection.len();
            match op {
                Op::Add(n) => {
                    let _ = collection.add(LayerEntity::new(POOL[n]), None);
                }
                Op::Remove(i) if len > 0 => {
                    let id = collection.at(i % len).unwrap().id();
                    collection.remove(id);
                }
                Op::Rename(i, n) if len > 0 => {
                    let id = collection.at(i % len).unwrap().id();
                    let before = collection.names();
                    if collection.rename(id, POOL[n]).is_err() {
                        prop_assert_eq!(collection.names(), before);
                    }
                }
                Op::Copy(i) if len > 0 => {
                    let spec = collection.at(i % len).unwrap().to_spec();
                    let copies = collection.prepare_copies(&[spec.clone(), spec]);
                    collection.insert_many(copies, Some(0)).unwrap();
                }
                _ => {}
            }
            assert_unique(&collection)?;
        }
    }

    #[test]
    fn restore_makes_names_unique(
        names in prop::collection::vec(prop::sample::select(POOL), 0..12)
    ) {
        let specs: Vec<LayerSpec> = names.iter().map(|n| LayerSpec::new(*n, None)).collect();
        let collection = LayerCollection::from_specs(&specs);
        prop_assert_eq!(collection.len(), specs.len());
        assert_unique(&collection)?;
    }
}

// ============================================================================
// Invariant 2: reorder preserves order and honours the tie-break
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn reorder_preserves_relative_order(
        n in 1usize..12,
        mask in prop::collection::vec(any::<bool>(), 12),
        target in prop::option::of(0usize..14),
    ) {
        let (collection, ids) = build(n);
        let moved: Vec<LayerId> = ids.iter().zip(&mask).filter(|(_, m)| **m).map(|(id, _)| *id).collect();
        let target_id = target.and_then(|t| ids.get(t).copied());
        let before = collection.ids();
        let recorder = ChangeRecorder::attach(&collection);

        let changed = collection.reorder(&moved, target_id);
        let after = collection.ids();

        prop_assert_eq!(after.len(), before.len());
        prop_assert_eq!(changed, after != before);
        prop_assert_eq!(recorder.count(), usize::from(changed));

        let remainder_before: Vec<_> = before.iter().filter(|id| !moved.contains(id)).collect();
        let remainder_after: Vec<_> = after.iter().filter(|id| !moved.contains(id)).collect();
        prop_assert_eq!(remainder_before, remainder_after);

        let moved_after: Vec<LayerId> = after.iter().copied().filter(|id| moved.contains(id)).collect();
        prop_assert_eq!(&moved_after, &moved);

        if target_id.is_some_and(|t| moved.contains(&t)) {
            prop_assert_eq!(&after, &before);
            return Ok(());
        }
        if moved.is_empty() {
            return Ok(());
        }

        // Moved layers form one block.
        let start = after.iter().position(|id| moved.contains(id)).unwrap();
        prop_assert_eq!(&after[start..start + moved.len()], &moved[..]);

        match target_id {
            None => prop_assert_eq!(start + moved.len(), after.len()),
            Some(t) => {
                let first_removal = before.iter().position(|id| moved.contains(id)).unwrap();
                let remaining_index = before
                    .iter()
                    .filter(|id| !moved.contains(id))
                    .position(|id| *id == t)
                    .unwrap();
                let target_after = after.iter().position(|id| *id == t).unwrap();
                if first_removal <= remaining_index {
                    prop_assert_eq!(start, target_after + 1);
                } else {
                    prop_assert_eq!(start + moved.len(), target_after);
                }
            }
        }
    }

    #[test]
    fn self_drop_is_noop(n in 1usize..10, pick in any::<prop::sample::Index>(), extra in any::<bool>()) {
        let (collection, ids) = build(n);
        let target = ids[pick.index(n)];
        let mut moved = vec![target];
        if extra && n > 1 {
            moved.push(ids[(pick.index(n) + 1) % n]);
        }
        let before = collection.names();
        let generation = collection.generation();
        let recorder = ChangeRecorder::attach(&collection);

        prop_assert!(!collection.reorder(&moved, Some(target)));
        prop_assert_eq!(collection.names(), before);
        prop_assert_eq!(collection.generation(), generation);
        prop_assert_eq!(recorder.count(), 0);
    }

    #[test]
    fn generation_counts_notifications(ops in prop::collection::vec(op(), 1..30)) {
        let collection = LayerCollection::new();
        let recorder = ChangeRecorder::attach(&collection);
        for op in ops {
            let len = collection.len();
            match op {
                Op::Add(n) => {
                    let _ = collection.add(LayerEntity::new(POOL[n]), Some(0));
                }
                Op::Remove(i) | Op::Copy(i) if len > 0 => {
                    let id = collection.at(i % len).unwrap().id();
                    collection.reorder(&[id], None);
                }
                Op::Rename(i, n) if len > 0 => {
                    let id = collection.at(i % len).unwrap().id();
                    let _ = collection.rename(id, POOL[n]);
                }
                _ => {}
            }
        }
        prop_assert_eq!(collection.generation(), recorder.count() as u64);
    }
}

#[test]
fn unique_name_example() {
    let collection = LayerCollection::new();
    collection.add(LayerEntity::new("sample"), None).unwrap();
    collection.add(LayerEntity::new("sample (2)"), None).unwrap();
    assert_eq!(collection.unique_name("sample"), "sample (3)");
    assert_eq!(collection.unique_name("other"), "other");
}
