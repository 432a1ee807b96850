#![forbid(unsafe_code)]

//! Batch coalescing for change notifications.
//!
//! A multi-layer move touches several entities but must reach dependent UI
//! as a single "changed" notification. While a [`BatchScope`] is alive,
//! notifications from [`Observable`](super::Observable) and
//! [`Signal`](super::Signal) are deferred; when the outermost scope drops,
//! each unique callback fires at most once (for coalesced dispatches) with
//! the latest state.
//!
//! # Invariants
//!
//! 1. Nested batches are supported: only the outermost scope flushes.
//! 2. Values are updated immediately inside a batch; only notifications
//!    are deferred.
//! 3. Flush runs deferred callbacks in the order they were first enqueued.
//!    Notifications raised while flushing run in a later round of the same
//!    flush.
//!
//! # Failure Modes
//!
//! - **Callback panics during flush**: remaining callbacks still run and the
//!   first panic is re-raised afterwards.

use std::cell::RefCell;
use tracing::{debug, debug_span};
use web_time::Instant;

type DeferredNotify = Box<dyn FnOnce()>;

struct DeferredEntry {
    key: Option<usize>,
    notify: DeferredNotify,
}

struct BatchContext {
    depth: u32,
    deferred: Vec<DeferredEntry>,
}

thread_local! {
    static BATCH_CTX: RefCell<Option<BatchContext>> = const { RefCell::new(None) };
}

/// Returns true if a batch is currently active on this thread.
pub fn is_batching() -> bool {
    BATCH_CTX.with(|ctx| ctx.borrow().is_some())
}

/// Run `f` now, or defer it to the end of the current batch.
///
/// Returns `true` if the notification was deferred.
pub fn defer_or_run(f: impl FnOnce() + 'static) -> bool {
    BATCH_CTX.with(|ctx| {
        let mut guard = ctx.borrow_mut();
        if let Some(ref mut batch) = *guard {
            batch.deferred.push(DeferredEntry {
                key: None,
                notify: Box::new(f),
            });
            true
        } else {
            drop(guard);
            f();
            false
        }
    })
}

/// Like [`defer_or_run`], but a later entry with the same `key` replaces the
/// earlier one while keeping its queue position.
pub fn defer_or_run_keyed(key: usize, f: impl FnOnce() + 'static) -> bool {
    BATCH_CTX.with(|ctx| {
        let mut guard = ctx.borrow_mut();
        if let Some(ref mut batch) = *guard {
            if let Some(entry) = batch
                .deferred
                .iter_mut()
                .find(|entry| entry.key == Some(key))
            {
                entry.notify = Box::new(f);
            } else {
                batch.deferred.push(DeferredEntry {
                    key: Some(key),
                    notify: Box::new(f),
                });
            }
            true
        } else {
            drop(guard);
            f();
            false
        }
    })
}

fn take_deferred() -> Vec<DeferredNotify> {
    BATCH_CTX.with(|ctx| {
        let mut guard = ctx.borrow_mut();
        guard.as_mut().map_or_else(Vec::new, |batch| {
            std::mem::take(&mut batch.deferred)
                .into_iter()
                .map(|entry| entry.notify)
                .collect()
        })
    })
}

/// Run deferred callbacks until none are left. Callbacks may notify again;
/// those notifications are queued and run in a later round.
fn flush() {
    let mut deferred = take_deferred();
    if deferred.is_empty() {
        return;
    }

    let start = Instant::now();
    let _span = debug_span!(
        "strata.batch_flush",
        callbacks = tracing::field::Empty,
        rounds = tracing::field::Empty,
        duration_us = tracing::field::Empty
    )
    .entered();

    let mut callbacks = 0u64;
    let mut rounds = 0u64;
    let mut first_panic: Option<Box<dyn std::any::Any + Send>> = None;
    while !deferred.is_empty() {
        rounds += 1;
        callbacks += deferred.len() as u64;
        for notify in deferred {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(notify));
            if let Err(payload) = result
                && first_panic.is_none()
            {
                first_panic = Some(payload);
            }
        }
        deferred = take_deferred();
    }

    let duration_us = start.elapsed().as_micros() as u64;
    let span = tracing::Span::current();
    span.record("callbacks", callbacks);
    span.record("rounds", rounds);
    span.record("duration_us", duration_us);
    debug!(callbacks, rounds, duration_us, "batch flushed");

    if let Some(payload) = first_panic {
        std::panic::resume_unwind(payload);
    }
}

/// RAII guard that begins a batch scope.
///
/// Nested `BatchScope`s are supported; only the outermost one flushes.
pub struct BatchScope {
    is_root: bool,
}

impl BatchScope {
    /// Begin a new batch scope.
    #[must_use]
    pub fn new() -> Self {
        let is_root = BATCH_CTX.with(|ctx| {
            let mut guard = ctx.borrow_mut();
            match *guard {
                Some(ref mut batch) => {
                    batch.depth += 1;
                    false
                }
                None => {
                    *guard = Some(BatchContext {
                        depth: 1,
                        deferred: Vec::new(),
                    });
                    true
                }
            }
        });
        Self { is_root }
    }

    /// Number of deferred notifications queued in the current batch.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        BATCH_CTX.with(|ctx| ctx.borrow().as_ref().map_or(0, |b| b.deferred.len()))
    }
}

impl Default for BatchScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        let should_flush = BATCH_CTX.with(|ctx| {
            let mut guard = ctx.borrow_mut();
            if let Some(ref mut batch) = *guard {
                batch.depth -= 1;
                batch.depth == 0
            } else {
                false
            }
        });

        if should_flush {
            // Clear the context even if a callback panics during flush.
            struct Reset;
            impl Drop for Reset {
                fn drop(&mut self) {
                    BATCH_CTX.with(|ctx| *ctx.borrow_mut() = None);
                }
            }
            let _reset = Reset;
            flush();
        }
    }
}

impl std::fmt::Debug for BatchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScope")
            .field("is_root", &self.is_root)
            .field("pending", &self.pending_count())
            .finish()
    }
}
