// SPDX-License-Identifier: MIT
//! Cooperative cancellation tokens for out-of-line work.
//!
//! [`CancellationToken`] is a cloneable, thread-safe signal that a probe can
//! poll or subscribe to in order to detect that its result is no longer
//! wanted. [`CancellationSource`] is the control side that flips it.
//!
//! # Contract
//!
//! - A token starts *pending* and becomes *cancelled* at most once.
//! - [`CancellationSource::cancel`] is idempotent: the second and later
//!   calls do nothing.
//! - Callbacks registered with `add_callback` run exactly once, in
//!   registration order, on the thread that performs the transition.
//! - A callback registered after the transition runs immediately, on the
//!   registering thread.
//!
//! Cancellation only flips a flag and runs callbacks; it never aborts I/O on
//! its own. Probe implementations may register a callback that signals their
//! transport to stop.
//!
//! # Example
//!
//! ```
//! use strata_runtime::cancellation::CancellationSource;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let source = CancellationSource::new();
//! let token = source.token();
//! let fired = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&fired);
//! token.add_callback(move || {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! source.cancel();
//! source.cancel();
//! assert!(token.is_cancelled());
//! assert_eq!(fired.load(Ordering::SeqCst), 1);
//! ```

#![forbid(unsafe_code)]

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use web_time::Duration;

type Callback = Box<dyn FnOnce() + Send>;

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

/// A thread-safe, cloneable cancellation token.
///
/// Tasks and probes receive a token and poll [`is_cancelled`](Self::is_cancelled)
/// or register callbacks to learn about cancellation. Clones observe the same
/// state and share the same [`id`](Self::id).
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<CancellationInner>,
}

/// The control handle that triggers cancellation.
///
/// Dropping the source does **not** cancel the token; call
/// [`cancel`](Self::cancel) explicitly.
pub struct CancellationSource {
    inner: Arc<CancellationInner>,
}

struct CancellationInner {
    id: u64,
    cancelled: AtomicBool,
    /// Pending callbacks. The transition happens while this lock is held so
    /// that registration and cancellation cannot interleave.
    callbacks: Mutex<Vec<Callback>>,
    notify: (Mutex<()>, Condvar),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl CancellationInner {
    fn add_callback(&self, callback: Callback) {
        {
            let mut callbacks = lock(&self.callbacks);
            if !self.cancelled.load(Ordering::Acquire) {
                callbacks.push(callback);
                return;
            }
        }
        callback();
    }
}

impl CancellationSource {
    /// Create a new cancellation source with a pending token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancellationInner {
                id: NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed),
                cancelled: AtomicBool::new(false),
                callbacks: Mutex::new(Vec::new()),
                notify: (Mutex::new(()), Condvar::new()),
            }),
        }
    }

    /// Obtain a cloneable token that observes this source's state.
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Signal cancellation.
    ///
    /// Returns `true` if this call performed the transition, `false` if the
    /// token was already cancelled. Registered callbacks run once, in
    /// registration order, before this returns.
    pub fn cancel(&self) -> bool {
        let callbacks = {
            let mut callbacks = lock(&self.inner.callbacks);
            if self.inner.cancelled.swap(true, Ordering::AcqRel) {
                return false;
            }
            std::mem::take(&mut *callbacks)
        };
        {
            let (mutex, cvar) = &self.inner.notify;
            let _guard = lock(mutex);
            cvar.notify_all();
        }
        tracing::trace!(
            target: "strata.cancel",
            token = self.inner.id,
            callbacks = callbacks.len(),
            "token cancelled"
        );
        for callback in callbacks {
            callback();
        }
        true
    }

    /// Check whether cancellation has already been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Register a callback; runs immediately if already cancelled.
    pub fn add_callback(&self, callback: impl FnOnce() + Send + 'static) {
        self.inner.add_callback(Box::new(callback));
    }

    /// Identity shared by this source and every token derived from it.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationSource")
            .field("id", &self.inner.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancellationToken {
    /// Returns `true` if cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Register a callback; runs immediately if already cancelled.
    pub fn add_callback(&self, callback: impl FnOnce() + Send + 'static) {
        self.inner.add_callback(Box::new(callback));
    }

    /// Identity of the source this token observes.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Whether both tokens observe the same source.
    #[must_use]
    pub fn same_source(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Block until either cancellation is requested or the timeout elapses.
    ///
    /// Returns `true` if cancelled, `false` if timed out.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        let (mutex, cvar) = &self.inner.notify;
        let mut guard = lock(mutex);
        let start = web_time::Instant::now();
        let mut remaining = duration;
        loop {
            if self.is_cancelled() {
                return true;
            }
            let (new_guard, result) = cvar
                .wait_timeout(guard, remaining)
                .unwrap_or_else(|e| e.into_inner());
            guard = new_guard;
            if self.is_cancelled() {
                return true;
            }
            if result.timed_out() {
                return false;
            }
            let elapsed = start.elapsed();
            if elapsed >= duration {
                return false;
            }
            remaining = duration - elapsed;
        }
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("id", &self.inner.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
