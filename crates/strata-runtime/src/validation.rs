#![forbid(unsafe_code)]

//! Cancellable source validation.
//!
//! A [`SourceValidator`] belongs to one consumer (a layer or an open dialog).
//! Each call to [`validate`](SourceValidator::validate) cancels the previous
//! request, starts a new probe and returns immediately. The probe's
//! continuation applies its result only if its request is still the current
//! one: the token must be pending *and* the request generation must match.
//! Checking the cancel flag alone is not enough, because the newer request
//! may itself be cancelled later while the older probe is still running.
//!
//! # Invariants
//!
//! 1. At most one live [`ValidationRequest`] per validator.
//! 2. Every issued probe ends in exactly one of: applied success, applied
//!    failure, discarded.
//! 3. A discarded completion leaves [`ValidationState`] untouched.
//! 4. `valid == source_valid && name_valid` after every update.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use strata_core::VolumeInfo;
use tracing::{debug, debug_span, trace};

use crate::cancellation::{CancellationSource, CancellationToken};
use crate::mailbox::CompletionQueue;
use crate::reactive::{Observable, Subscription};

/// Default status text shown while a probe is in flight.
pub const DEFAULT_PROBING_MESSAGE: &str = "Validating volume source...";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure reported by a volume probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeError {
    /// Human-readable reason, shown to the user as-is.
    pub message: String,
}

impl ProbeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProbeError {}

/// Why a source failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationErrorKind {
    /// The probe ran and failed, or reported an unusable volume.
    Probe,
    /// The locator could not be interpreted; no probe was issued.
    MalformedLocator,
    /// The request was cancelled before it completed.
    Canceled,
}

/// A validation failure carrying its display message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

impl From<ProbeError> for ValidationError {
    fn from(err: ProbeError) -> Self {
        Self::new(ValidationErrorKind::Probe, err.message)
    }
}

impl From<strata_core::LocatorError> for ValidationError {
    fn from(err: strata_core::LocatorError) -> Self {
        Self::new(ValidationErrorKind::MalformedLocator, err.message)
    }
}

// ---------------------------------------------------------------------------
// Probe contract
// ---------------------------------------------------------------------------

/// Outcome delivered to a probe continuation.
pub type ProbeResult = Result<VolumeInfo, ProbeError>;

/// Continuation a prober must call at most once.
pub type ProbeCallback = Box<dyn FnOnce(ProbeResult)>;

/// Volume probe service.
///
/// `probe` must not block. It may call `done` synchronously, or later from
/// the UI thread (for example through a [`CompletionQueue`]). Implementations
/// may watch `token` to stop early; the validator discards results for
/// cancelled tokens regardless.
pub trait VolumeProber {
    fn probe(&self, locator: &str, token: CancellationToken, done: ProbeCallback);
}

impl<P: VolumeProber + ?Sized> VolumeProber for Rc<P> {
    fn probe(&self, locator: &str, token: CancellationToken, done: ProbeCallback) {
        (**self).probe(locator, token, done);
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

static NEXT_CONSUMER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a validation consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(u64);

impl ConsumerId {
    /// Allocate a fresh, process-unique consumer id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONSUMER_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumer#{}", self.0)
    }
}

/// Status line shown next to the inputs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ValidationStatus {
    #[default]
    None,
    Info(String),
    Error(ValidationError),
}

impl ValidationStatus {
    /// Text to display, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Info(text) => Some(text),
            Self::Error(err) => Some(&err.message),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// Per-consumer validity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationState {
    pub source_valid: bool,
    pub name_valid: bool,
    /// `source_valid && name_valid`.
    pub valid: bool,
    /// A probe is in flight.
    pub probing: bool,
    pub status: ValidationStatus,
    /// Metadata from the last applied successful probe.
    pub info: Option<VolumeInfo>,
}

impl Default for ValidationState {
    fn default() -> Self {
        Self {
            source_valid: false,
            name_valid: true,
            valid: false,
            probing: false,
            status: ValidationStatus::None,
            info: None,
        }
    }
}

impl ValidationState {
    fn recompute(&mut self) {
        self.valid = self.source_valid && self.name_valid;
    }
}

/// The live request of a validator.
#[derive(Debug)]
pub struct ValidationRequest {
    pub consumer: ConsumerId,
    pub generation: u64,
    pub locator: String,
    source: CancellationSource,
}

impl ValidationRequest {
    /// Token observed by the probe.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.source.token()
    }
}

struct ValidatorInner {
    generation: u64,
    current: Option<ValidationRequest>,
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Source validation pipeline for one consumer.
pub struct SourceValidator {
    consumer: ConsumerId,
    prober: Rc<dyn VolumeProber>,
    probing_message: String,
    inner: Rc<RefCell<ValidatorInner>>,
    state: Observable<ValidationState>,
}

impl fmt::Debug for SourceValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("SourceValidator")
            .field("consumer", &self.consumer)
            .field("generation", &inner.generation)
            .field("in_flight", &inner.current.is_some())
            .field("state", &self.state.get())
            .finish()
    }
}

impl SourceValidator {
    /// Create a validator for a fresh consumer.
    pub fn new(prober: Rc<dyn VolumeProber>) -> Self {
        Self::with_consumer(ConsumerId::next(), prober)
    }

    pub fn with_consumer(consumer: ConsumerId, prober: Rc<dyn VolumeProber>) -> Self {
        Self {
            consumer,
            prober,
            probing_message: DEFAULT_PROBING_MESSAGE.to_owned(),
            inner: Rc::new(RefCell::new(ValidatorInner {
                generation: 0,
                current: None,
            })),
            state: Observable::new(ValidationState::default()),
        }
    }

    /// Override the in-flight status text.
    #[must_use]
    pub fn with_probing_message(mut self, message: impl Into<String>) -> Self {
        self.probing_message = message.into();
        self
    }

    #[must_use]
    pub fn consumer(&self) -> ConsumerId {
        self.consumer
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> ValidationState {
        self.state.get()
    }

    /// Observable handle to the state.
    #[must_use]
    pub fn observable(&self) -> Observable<ValidationState> {
        self.state.clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self, callback: impl Fn(&ValidationState) + 'static) -> Subscription {
        self.state.subscribe(callback)
    }

    /// Generation of the most recently issued request.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.borrow().generation
    }

    /// Whether a request is in flight.
    #[must_use]
    pub fn in_flight(&self) -> bool {
        self.inner.borrow().current.is_some()
    }

    /// Token of the in-flight request, if any.
    #[must_use]
    pub fn current_token(&self) -> Option<CancellationToken> {
        self.inner
            .borrow()
            .current
            .as_ref()
            .map(ValidationRequest::token)
    }

    /// Cancel the previous request and probe `locator`.
    ///
    /// Returns the generation of the new request. Never reports failures to
    /// the caller; they land in [`state`](Self::state).
    pub fn validate(&self, locator: &str) -> u64 {
        let previous = self.take_current();
        if let Some(previous) = previous {
            previous.source.cancel();
        }

        let source = CancellationSource::new();
        let token = source.token();
        let generation = {
            let mut inner = self.inner.borrow_mut();
            inner.generation += 1;
            let generation = inner.generation;
            inner.current = Some(ValidationRequest {
                consumer: self.consumer,
                generation,
                locator: locator.to_owned(),
                source,
            });
            generation
        };

        let probing_message = self.probing_message.clone();
        self.state.update(|s| {
            s.probing = true;
            s.status = ValidationStatus::Info(probing_message);
        });

        let consumer = self.consumer.get();
        let _span = debug_span!(
            target: "strata.validation",
            "validation.probe",
            consumer,
            generation,
            locator
        )
        .entered();
        debug!(target: "strata.validation", "probe issued");

        let gate = Rc::downgrade(&self.inner);
        let state = self.state.clone();
        let gate_token = token.clone();
        let owned_locator = locator.to_owned();
        let done: ProbeCallback = Box::new(move |result| {
            apply_completion(
                &gate,
                &state,
                consumer,
                generation,
                &gate_token,
                &owned_locator,
                result,
            );
        });
        self.prober.probe(locator, token, done);
        generation
    }

    /// Cancel the in-flight request, if any. Its completion becomes a no-op.
    ///
    /// Returns `true` if a request was cancelled.
    pub fn cancel(&self) -> bool {
        match self.take_current() {
            Some(request) => {
                trace!(
                    target: "strata.validation",
                    consumer = self.consumer.get(),
                    generation = request.generation,
                    "request cancelled"
                );
                request.source.cancel();
                self.state.update(|s| s.probing = false);
                true
            }
            None => false,
        }
    }

    /// The source text was edited: cancel any probe, optimistically treat the
    /// source as valid and clear the status line.
    pub fn mark_source_edited(&self) {
        self.cancel();
        self.state.update(|s| {
            s.source_valid = true;
            s.status = ValidationStatus::None;
            s.info = None;
            s.recompute();
        });
    }

    /// Record a name check result.
    pub fn set_name_valid(&self, valid: bool) {
        self.state.update(|s| {
            s.name_valid = valid;
            s.recompute();
        });
    }

    /// Mark the source valid without probing (e.g. a locked source).
    pub fn set_source_valid(&self, valid: bool) {
        self.state.update(|s| {
            s.source_valid = valid;
            s.recompute();
        });
    }

    /// Show an error and mark the source invalid.
    pub fn set_error(&self, error: ValidationError) {
        self.state.update(|s| {
            s.source_valid = false;
            s.probing = false;
            s.status = ValidationStatus::Error(error);
            s.recompute();
        });
    }

    /// Show an informational status line.
    pub fn set_info(&self, message: impl Into<String>) {
        let message = message.into();
        self.state.update(|s| s.status = ValidationStatus::Info(message));
    }

    fn take_current(&self) -> Option<ValidationRequest> {
        self.inner.borrow_mut().current.take()
    }
}

impl Drop for SourceValidator {
    fn drop(&mut self) {
        if let Some(request) = self.inner.borrow_mut().current.take() {
            request.source.cancel();
        }
    }
}

fn apply_completion(
    gate: &Weak<RefCell<ValidatorInner>>,
    state: &Observable<ValidationState>,
    consumer: u64,
    generation: u64,
    token: &CancellationToken,
    locator: &str,
    result: ProbeResult,
) {
    let Some(inner) = gate.upgrade() else {
        trace!(target: "strata.validation", consumer, generation, "discarded: consumer gone");
        return;
    };
    let current = {
        let mut inner = inner.borrow_mut();
        let is_current = inner.current.as_ref().is_some_and(|req| {
            req.generation == generation && req.source.token().same_source(token)
        });
        if token.is_cancelled() || !is_current {
            None
        } else {
            inner.current.take()
        }
    };
    if current.is_none() {
        trace!(target: "strata.validation", consumer, generation, "discarded");
        return;
    }

    match result {
        Ok(info) if info.valid => {
            debug!(target: "strata.validation", consumer, generation, "source valid");
            let message = info.describe();
            state.update(|s| {
                s.source_valid = true;
                s.probing = false;
                s.status = ValidationStatus::Info(message);
                s.info = Some(info);
                s.recompute();
            });
        }
        Ok(_) => {
            debug!(target: "strata.validation", consumer, generation, "source unusable");
            let error = ValidationError::new(
                ValidationErrorKind::Probe,
                format!("Volume source {locator:?} is not usable."),
            );
            apply_failure(state, error);
        }
        Err(err) => {
            debug!(
                target: "strata.validation",
                consumer,
                generation,
                error = %err,
                "probe failed"
            );
            apply_failure(state, err.into());
        }
    }
}

fn apply_failure(state: &Observable<ValidationState>, error: ValidationError) {
    state.update(|s| {
        s.source_valid = false;
        s.probing = false;
        s.status = ValidationStatus::Error(error);
        s.info = None;
        s.recompute();
    });
}

// ---------------------------------------------------------------------------
// Threaded prober
// ---------------------------------------------------------------------------

/// Blocking probe function run on a worker thread.
pub type BlockingProbe = dyn Fn(&str, &CancellationToken) -> ProbeResult + Send + Sync;

/// Runs a blocking probe on a worker thread per request and delivers the
/// result through a [`CompletionQueue`] drained on the UI thread.
pub struct ThreadedProber {
    queue: Rc<CompletionQueue<ProbeResult>>,
    probe: Arc<BlockingProbe>,
}

impl fmt::Debug for ThreadedProber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadedProber")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl ThreadedProber {
    pub fn new(
        queue: Rc<CompletionQueue<ProbeResult>>,
        probe: impl Fn(&str, &CancellationToken) -> ProbeResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            queue,
            probe: Arc::new(probe),
        }
    }

    /// Queue the UI thread must pump.
    #[must_use]
    pub fn queue(&self) -> &Rc<CompletionQueue<ProbeResult>> {
        &self.queue
    }
}

impl VolumeProber for ThreadedProber {
    fn probe(&self, locator: &str, token: CancellationToken, done: ProbeCallback) {
        let poster = self.queue.register(done);
        let fallback = poster.clone();
        let probe = Arc::clone(&self.probe);
        let locator = locator.to_owned();
        let spawned = std::thread::Builder::new()
            .name("strata-probe".into())
            .spawn(move || {
                let result = if token.is_cancelled() {
                    Err(ProbeError::new("Validation cancelled."))
                } else {
                    probe(&locator, &token)
                };
                poster.post(result);
            });
        if let Err(err) = spawned {
            tracing::warn!(
                target: "strata.validation",
                error = %err,
                "probe worker failed to start"
            );
            fallback.post(Err(ProbeError::new(format!(
                "Failed to start volume probe: {err}"
            ))));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use strata_core::{DataType, VolumeKind};

    type Pending = Rc<RefCell<Vec<(String, CancellationToken, ProbeCallback)>>>;

    /// Holds every probe until the test resolves it.
    #[derive(Default)]
    struct HeldProber {
        pending: Pending,
    }

    impl VolumeProber for HeldProber {
        fn probe(&self, locator: &str, token: CancellationToken, done: ProbeCallback) {
            self.pending
                .borrow_mut()
                .push((locator.to_owned(), token, done));
        }
    }

    fn resolve(pending: &Pending, locator: &str, result: ProbeResult) {
        let idx = pending
            .borrow()
            .iter()
            .position(|(l, _, _)| l == locator)
            .unwrap();
        let (_, _, done) = pending.borrow_mut().remove(idx);
        done(result);
    }

    fn image() -> VolumeInfo {
        VolumeInfo::new(VolumeKind::Image, 1, DataType::Uint8)
    }

    fn setup() -> (SourceValidator, Pending) {
        let prober = HeldProber::default();
        let pending = Rc::clone(&prober.pending);
        (SourceValidator::new(Rc::new(prober)), pending)
    }

    #[test]
    fn initial_state_is_not_submittable() {
        let (validator, _) = setup();
        let state = validator.state();
        assert!(!state.source_valid);
        assert!(state.name_valid);
        assert!(!state.valid);
        assert_eq!(state.status, ValidationStatus::None);
    }

    #[test]
    fn success_marks_valid_and_describes_volume() {
        let (validator, pending) = setup();
        validator.validate("precomputed://gs://a/img");
        let state = validator.state();
        assert!(state.probing);
        assert_eq!(state.status.message(), Some(DEFAULT_PROBING_MESSAGE));

        resolve(&pending, "precomputed://gs://a/img", Ok(image()));
        let state = validator.state();
        assert!(state.source_valid);
        assert!(state.valid);
        assert!(!state.probing);
        assert_eq!(state.status.message(), Some("image: 1-channel uint8"));
        assert!(!validator.in_flight());
    }

    #[test]
    fn failure_stores_message() {
        let (validator, pending) = setup();
        validator.validate("bad://x");
        resolve(&pending, "bad://x", Err(ProbeError::new("not found")));
        let state = validator.state();
        assert!(!state.valid);
        assert!(state.status.is_error());
        assert_eq!(state.status.message(), Some("not found"));
    }

    #[test]
    fn unusable_volume_is_failure() {
        let (validator, pending) = setup();
        validator.validate("precomputed://gs://a/img");
        let mut info = image();
        info.valid = false;
        resolve(&pending, "precomputed://gs://a/img", Ok(info));
        assert!(!validator.state().source_valid);
        assert!(validator.state().status.is_error());
    }

    #[test]
    fn superseded_completion_is_discarded() {
        let (validator, pending) = setup();
        validator.validate("urlA");
        validator.validate("urlB");
        assert!(pending.borrow()[0].1.is_cancelled());
        assert!(!pending.borrow()[1].1.is_cancelled());

        resolve(&pending, "urlB", Err(ProbeError::new("B failed")));
        let after_b = validator.state();
        resolve(&pending, "urlA", Ok(image()));
        assert_eq!(validator.state(), after_b);
        assert!(!validator.state().valid);
    }

    #[test]
    fn cancelled_request_never_applies() {
        let (validator, pending) = setup();
        validator.validate("urlA");
        assert!(validator.cancel());
        assert!(!validator.cancel());
        let before = validator.state();
        resolve(&pending, "urlA", Ok(image()));
        assert_eq!(validator.state(), before);
    }

    #[test]
    fn completion_after_drop_is_ignored() {
        let (validator, pending) = setup();
        validator.validate("urlA");
        drop(validator);
        assert!(pending.borrow()[0].1.is_cancelled());
        resolve(&pending, "urlA", Ok(image()));
    }

    #[test]
    fn synchronous_prober_applies_immediately() {
        struct Immediate;
        impl VolumeProber for Immediate {
            fn probe(&self, _: &str, _: CancellationToken, done: ProbeCallback) {
                done(Ok(VolumeInfo::new(VolumeKind::Segmentation, 1, DataType::Uint64)));
            }
        }
        let validator = SourceValidator::new(Rc::new(Immediate));
        validator.validate("precomputed://gs://a/seg");
        assert!(validator.state().valid);
        assert_eq!(
            validator.state().status.message(),
            Some("segmentation: 1-channel uint64")
        );
    }

    #[test]
    fn edit_cancels_and_is_optimistic() {
        let (validator, pending) = setup();
        validator.validate("urlA");
        validator.mark_source_edited();
        assert!(pending.borrow()[0].1.is_cancelled());
        let state = validator.state();
        assert!(state.source_valid);
        assert!(state.valid);
        assert_eq!(state.status, ValidationStatus::None);
    }

    #[test]
    fn name_validity_gates_combined_validity() {
        let (validator, pending) = setup();
        validator.validate("urlA");
        resolve(&pending, "urlA", Ok(image()));
        validator.set_name_valid(false);
        assert!(!validator.state().valid);
        validator.set_name_valid(true);
        assert!(validator.state().valid);
    }

    #[test]
    fn subscribers_see_each_applied_change() {
        let (validator, pending) = setup();
        let changes = Rc::new(Cell::new(0));
        let counter = Rc::clone(&changes);
        let _sub = validator.subscribe(move |_| counter.set(counter.get() + 1));
        validator.validate("urlA");
        resolve(&pending, "urlA", Ok(image()));
        assert_eq!(changes.get(), 2);
    }

    #[test]
    fn threaded_prober_delivers_on_pump() {
        let queue = Rc::new(CompletionQueue::new());
        let prober = ThreadedProber::new(Rc::clone(&queue), |locator, _| {
            if locator.ends_with("img") {
                Ok(VolumeInfo::new(VolumeKind::Image, 3, DataType::Float32))
            } else {
                Err(ProbeError::new("missing"))
            }
        });
        let validator = SourceValidator::new(Rc::new(prober));
        validator.validate("precomputed://gs://a/img");
        assert!(validator.state().probing);

        let ran = queue.pump_timeout(web_time::Duration::from_secs(5));
        assert_eq!(ran, 1);
        assert!(validator.state().valid);
        assert_eq!(
            validator.state().status.message(),
            Some("image: 3-channel float32")
        );
    }
}
