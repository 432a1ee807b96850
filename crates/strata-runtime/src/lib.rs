#![forbid(unsafe_code)]

//! Strata runtime
//!
//! Runtime services shared by the layer widgets:
//!
//! - [`CancellationSource`] / [`CancellationToken`]: one-shot cancellation
//!   for out-of-line work.
//! - [`reactive`]: [`Observable`], [`Signal`] and [`BatchScope`] for change
//!   notification on the UI thread.
//! - [`CompletionQueue`]: hands results from worker threads back to the UI
//!   thread.
//! - [`SourceValidator`]: the cancellable source validation pipeline.
//! - [`SessionConfig`] and [`logging::init`].
//!
//! # Threading
//!
//! Everything except cancellation tokens and completion posters is `!Send`
//! and lives on one thread. Handlers run to completion before the next one
//! is dispatched, so layer state needs no locks.

pub mod cancellation;
pub mod config;
pub mod logging;
pub mod mailbox;
pub mod reactive;
pub mod validation;

pub use cancellation::{CancellationSource, CancellationToken};
pub use config::{
    ConfigError, DragConfig, LoggingConfig, ModifierKey, NamingConfig, SessionConfig,
    ShortcutConfig, ValidationConfig,
};
pub use mailbox::{CompletionPoster, CompletionQueue, Ticket};
pub use reactive::{BatchScope, Observable, Signal, Subscription};
pub use validation::{
    ConsumerId, ProbeCallback, ProbeError, ProbeResult, SourceValidator, ThreadedProber,
    ValidationError, ValidationErrorKind, ValidationRequest, ValidationState, ValidationStatus,
    VolumeProber,
};
