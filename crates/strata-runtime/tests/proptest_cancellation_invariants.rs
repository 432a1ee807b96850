#![forbid(unsafe_code)]

//! Property tests for cancellation and validation ordering.
//!
//! Validates:
//! - Any number of `cancel()` calls fires each callback exactly once.
//! - Callbacks registered before and after the transition all fire once.
//! - For any interleaving of `validate()` calls and out-of-order probe
//!   resolutions, only the latest request's outcome is ever applied.

use proptest::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use strata_core::{DataType, VolumeInfo, VolumeKind};
use strata_runtime::validation::{ProbeCallback, ProbeError, SourceValidator, VolumeProber};
use strata_runtime::{CancellationSource, CancellationToken};

// ============================================================================
// Invariant 1: callbacks fire exactly once
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn callbacks_fire_once_for_any_cancel_count(
        before in 0usize..8,
        after in 0usize..8,
        cancels in 1usize..6,
    ) {
        let source = CancellationSource::new();
        let fired = Arc::new(AtomicUsize::new(0));
        for _ in 0..before {
            let counter = Arc::clone(&fired);
            source.token().add_callback(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        let transitions = (0..cancels).filter(|_| source.cancel()).count();
        prop_assert_eq!(transitions, 1);

        for _ in 0..after {
            let counter = Arc::clone(&fired);
            source.token().add_callback(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        source.cancel();
        prop_assert_eq!(fired.load(Ordering::SeqCst), before + after);
    }
}

// ============================================================================
// Invariant 2: only the latest validation applies
// ============================================================================

type Held = Rc<RefCell<Vec<Option<(CancellationToken, ProbeCallback)>>>>;

#[derive(Default)]
struct HeldProber {
    held: Held,
}

impl VolumeProber for HeldProber {
    fn probe(&self, _locator: &str, token: CancellationToken, done: ProbeCallback) {
        self.held.borrow_mut().push(Some((token, done)));
    }
}

fn outcome(ok: bool) -> Result<VolumeInfo, ProbeError> {
    if ok {
        Ok(VolumeInfo::new(VolumeKind::Image, 1, DataType::Uint8))
    } else {
        Err(ProbeError::new("probe failed"))
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn stale_resolutions_never_apply(
        outcomes in prop::collection::vec(any::<bool>(), 1..8),
        order in prop::collection::vec(any::<prop::sample::Index>(), 8),
    ) {
        let prober = HeldProber::default();
        let held = Rc::clone(&prober.held);
        let validator = SourceValidator::new(Rc::new(prober));

        for i in 0..outcomes.len() {
            validator.validate(&format!("precomputed://gs://bucket/v{i}"));
        }
        let latest = outcomes.len() - 1;

        // Resolve in a shuffled order.
        let mut remaining: Vec<usize> = (0..outcomes.len()).collect();
        let mut applied_latest = false;
        for pick in order.iter().take(outcomes.len()) {
            let idx = remaining.remove(pick.index(remaining.len()));
            let (token, done) = held.borrow_mut()[idx].take().unwrap();
            prop_assert_eq!(token.is_cancelled(), idx != latest);

            let before = validator.state();
            done(outcome(outcomes[idx]));
            let after = validator.state();
            if idx == latest {
                applied_latest = true;
                prop_assert_eq!(after.source_valid, outcomes[idx]);
                prop_assert!(!after.probing);
            } else {
                prop_assert_eq!(after, before);
            }
        }
        prop_assert!(applied_latest);
        prop_assert_eq!(validator.state().source_valid, outcomes[latest]);
    }
}
