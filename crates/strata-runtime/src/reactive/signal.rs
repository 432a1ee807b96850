#![forbid(unsafe_code)]

//! Event signal without stored state.
//!
//! [`Signal<A>`] is the stateless sibling of [`Observable`](super::Observable):
//! it carries an event argument to subscribers but keeps no value. The layer
//! collection uses `Signal<()>` for its "changed" notification and
//! `Signal<LayerEntity>` for per-entity removal hooks.
//!
//! Two dispatch flavours exist because they batch differently:
//!
//! - [`dispatch_coalesced`](Signal::dispatch_coalesced): inside a
//!   [`BatchScope`](super::BatchScope) each subscriber runs once, with the
//!   argument of the last dispatch.
//! - [`dispatch`](Signal::dispatch): every event is delivered, deferred in
//!   order while batching.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::observable::Subscription;

type CallbackRc<A> = Rc<dyn Fn(&A)>;
type CallbackWeak<A> = Weak<dyn Fn(&A)>;

struct SignalInner<A> {
    subscribers: RefCell<Vec<CallbackWeak<A>>>,
    dispatched: Cell<u64>,
}

/// A shared event signal.
///
/// Cloning a `Signal` creates another handle to the same subscriber list.
pub struct Signal<A = ()> {
    inner: Rc<SignalInner<A>>,
}

impl<A> Clone for Signal<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A> std::fmt::Debug for Signal<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("subscribers", &self.inner.subscribers.borrow().len())
            .field("dispatched", &self.inner.dispatched.get())
            .finish()
    }
}

impl<A: Clone + 'static> Default for Signal<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Clone + 'static> Signal<A> {
    /// Create a signal with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(SignalInner {
                subscribers: RefCell::new(Vec::new()),
                dispatched: Cell::new(0),
            }),
        }
    }

    /// Subscribe to events. Dropping the guard unsubscribes.
    pub fn subscribe(&self, callback: impl Fn(&A) + 'static) -> Subscription {
        let strong: CallbackRc<A> = Rc::new(callback);
        self.inner
            .subscribers
            .borrow_mut()
            .push(Rc::downgrade(&strong));
        Subscription::new(Box::new(strong))
    }

    /// Number of dispatch calls so far.
    #[must_use]
    pub fn dispatched(&self) -> u64 {
        self.inner.dispatched.get()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .borrow()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    fn live_callbacks(&self) -> Vec<CallbackRc<A>> {
        self.inner.dispatched.set(self.inner.dispatched.get() + 1);
        let mut subscribers = self.inner.subscribers.borrow_mut();
        subscribers.retain(|w| w.strong_count() > 0);
        subscribers.iter().filter_map(Weak::upgrade).collect()
    }

    /// Deliver `arg` to every subscriber; deferred in order while batching.
    pub fn dispatch(&self, arg: &A) {
        for cb in self.live_callbacks() {
            let arg = arg.clone();
            super::batch::defer_or_run(move || cb(&arg));
        }
    }

    /// Deliver `arg`, collapsing repeated dispatches inside a batch.
    pub fn dispatch_coalesced(&self, arg: &A) {
        for cb in self.live_callbacks() {
            let key = Rc::as_ptr(&cb) as *const () as usize;
            let arg = arg.clone();
            super::batch::defer_or_run_keyed(key, move || cb(&arg));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_reaches_subscribers() {
        let signal: Signal<u8> = Signal::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let _sub = signal.subscribe(move |v| seen_clone.borrow_mut().push(*v));

        signal.dispatch(&3);
        signal.dispatch_coalesced(&4);
        assert_eq!(*seen.borrow(), vec![3, 4]);
        assert_eq!(signal.dispatched(), 2);
    }

    #[test]
    fn dropped_subscription_is_pruned() {
        let signal: Signal = Signal::new();
        let count = Rc::new(Cell::new(0));
        let count_clone = Rc::clone(&count);
        let sub = signal.subscribe(move |_| count_clone.set(count_clone.get() + 1));
        assert_eq!(signal.subscriber_count(), 1);

        drop(sub);
        signal.dispatch(&());
        assert_eq!(count.get(), 0);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn subscriber_may_subscribe_during_dispatch() {
        let signal: Signal = Signal::new();
        let extra = Rc::new(RefCell::new(None));
        let extra_clone = Rc::clone(&extra);
        let handle = signal.clone();
        let _sub = signal.subscribe(move |_| {
            if extra_clone.borrow().is_none() {
                *extra_clone.borrow_mut() = Some(handle.subscribe(|_| {}));
            }
        });
        signal.dispatch(&());
        assert_eq!(signal.subscriber_count(), 2);
    }
}
