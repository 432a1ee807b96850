#![forbid(unsafe_code)]

//! Scripted volume probers.
//!
//! [`DeferredProber`] holds every probe until the test resolves it, in any
//! order. [`ImmediateProber`] answers synchronously from a function.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use strata_core::VolumeInfo;
use strata_runtime::CancellationToken;
use strata_runtime::validation::{ProbeCallback, ProbeError, ProbeResult, VolumeProber};
use tracing::trace;

struct PendingProbe {
    locator: String,
    token: CancellationToken,
    done: ProbeCallback,
}

/// Prober whose requests stay in flight until resolved by hand.
///
/// Cloning yields another handle to the same queue, so a test can keep one
/// handle and give the other to the code under test.
#[derive(Clone, Default)]
pub struct DeferredProber {
    pending: Rc<RefCell<Vec<PendingProbe>>>,
}

impl fmt::Debug for DeferredProber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredProber")
            .field("pending", &self.pending())
            .finish()
    }
}

impl DeferredProber {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locators of in-flight probes, oldest first.
    #[must_use]
    pub fn pending(&self) -> Vec<String> {
        self.pending
            .borrow()
            .iter()
            .map(|p| p.locator.clone())
            .collect()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Token handed to the oldest in-flight probe of `locator`.
    #[must_use]
    pub fn token(&self, locator: &str) -> Option<CancellationToken> {
        self.pending
            .borrow()
            .iter()
            .find(|p| p.locator == locator)
            .map(|p| p.token.clone())
    }

    /// Tokens of every in-flight probe, oldest first.
    #[must_use]
    pub fn tokens(&self) -> Vec<CancellationToken> {
        self.pending
            .borrow()
            .iter()
            .map(|p| p.token.clone())
            .collect()
    }

    /// Complete the oldest in-flight probe of `locator`. Returns `false` if
    /// there is none.
    pub fn resolve(&self, locator: &str, result: ProbeResult) -> bool {
        let index = self
            .pending
            .borrow()
            .iter()
            .position(|p| p.locator == locator);
        match index {
            Some(index) => {
                self.complete(index, result);
                true
            }
            None => false,
        }
    }

    /// Complete the oldest in-flight probe of `locator` successfully.
    pub fn succeed(&self, locator: &str, info: VolumeInfo) -> bool {
        self.resolve(locator, Ok(info))
    }

    /// Fail the oldest in-flight probe of `locator` with `message`.
    pub fn fail(&self, locator: &str, message: &str) -> bool {
        self.resolve(locator, Err(ProbeError::new(message)))
    }

    /// Complete the most recent probe. Returns its locator.
    pub fn resolve_latest(&self, result: ProbeResult) -> Option<String> {
        let len = self.pending_count();
        let index = len.checked_sub(1)?;
        Some(self.complete(index, result))
    }

    /// Drop every in-flight probe without completing it.
    pub fn abandon_all(&self) -> usize {
        let abandoned = std::mem::take(&mut *self.pending.borrow_mut());
        abandoned.len()
    }

    fn complete(&self, index: usize, result: ProbeResult) -> String {
        // Released before `done` runs: the continuation may issue new probes.
        let probe = self.pending.borrow_mut().remove(index);
        trace!(
            target: "strata.harness",
            locator = %probe.locator,
            cancelled = probe.token.is_cancelled(),
            ok = result.is_ok(),
            "probe resolved"
        );
        (probe.done)(result);
        probe.locator
    }
}

impl VolumeProber for DeferredProber {
    fn probe(&self, locator: &str, token: CancellationToken, done: ProbeCallback) {
        self.pending.borrow_mut().push(PendingProbe {
            locator: locator.to_owned(),
            token,
            done,
        });
    }
}

/// Prober that answers synchronously.
pub struct ImmediateProber {
    answer: Box<dyn Fn(&str) -> ProbeResult>,
}

impl fmt::Debug for ImmediateProber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImmediateProber").finish_non_exhaustive()
    }
}

impl ImmediateProber {
    pub fn new(answer: impl Fn(&str) -> ProbeResult + 'static) -> Self {
        Self {
            answer: Box::new(answer),
        }
    }

    /// Every locator probes as `info`.
    #[must_use]
    pub fn valid(info: VolumeInfo) -> Self {
        Self::new(move |_| Ok(info.clone()))
    }

    /// Every probe fails with `message`.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(move |_| Err(ProbeError::new(message.clone())))
    }
}

impl VolumeProber for ImmediateProber {
    fn probe(&self, locator: &str, _token: CancellationToken, done: ProbeCallback) {
        done((self.answer)(locator));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use strata_runtime::SourceValidator;

    #[test]
    fn resolves_out_of_order() {
        let prober = DeferredProber::new();
        let validator = SourceValidator::new(Rc::new(prober.clone()));
        validator.validate("urlA");
        validator.validate("urlB");
        assert_eq!(prober.pending(), ["urlA", "urlB"]);
        assert!(prober.token("urlA").unwrap().is_cancelled());

        assert!(prober.fail("urlB", "B failed"));
        assert!(prober.succeed("urlA", fixtures::image_info()));
        assert!(!prober.resolve("urlA", Ok(fixtures::image_info())));
        assert_eq!(prober.pending_count(), 0);
        assert!(!validator.state().valid);
    }

    #[test]
    fn resolve_latest_and_abandon() {
        let prober = DeferredProber::new();
        assert_eq!(prober.resolve_latest(Ok(fixtures::image_info())), None);
        let validator = SourceValidator::new(Rc::new(prober.clone()));
        validator.validate("a");
        validator.validate("b");
        assert_eq!(
            prober.resolve_latest(Ok(fixtures::image_info())).as_deref(),
            Some("b")
        );
        assert!(validator.state().valid);
        assert_eq!(prober.abandon_all(), 1);
    }

    proptest::proptest! {
        #[test]
        fn only_the_latest_probe_decides(
            outcomes in proptest::collection::vec(proptest::bool::ANY, 1..6),
            order in proptest::collection::vec(0usize..6, 0..12),
        ) {
            let prober = DeferredProber::new();
            let validator = SourceValidator::new(Rc::new(prober.clone()));
            let locators: Vec<String> = (0..outcomes.len()).map(|i| format!("url{i}")).collect();
            for locator in &locators {
                validator.validate(locator);
            }
            let result = |i: usize| {
                if outcomes[i] {
                    Ok(fixtures::image_info())
                } else {
                    Err(ProbeError::new("failed"))
                }
            };
            for i in order {
                if i < locators.len() {
                    prober.resolve(&locators[i], result(i));
                }
            }
            for (i, locator) in locators.iter().enumerate() {
                prober.resolve(locator, result(i));
            }
            proptest::prop_assert_eq!(prober.pending_count(), 0);
            proptest::prop_assert_eq!(validator.state().valid, outcomes[outcomes.len() - 1]);
        }
    }

    #[test]
    fn immediate_prober_answers_synchronously() {
        let validator = SourceValidator::new(Rc::new(ImmediateProber::failing("nope")));
        validator.validate("x");
        assert_eq!(validator.state().status.message(), Some("nope"));
    }
}
