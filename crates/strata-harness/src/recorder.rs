#![forbid(unsafe_code)]

//! Records the layer order at every change notification.

use std::cell::RefCell;
use std::rc::Rc;

use strata_layers::LayerCollection;
use strata_runtime::Subscription;

/// Snapshot of layer names taken at each change of a collection.
#[derive(Debug)]
pub struct ChangeRecorder {
    changes: Rc<RefCell<Vec<Vec<String>>>>,
    _subscription: Subscription,
}

impl ChangeRecorder {
    /// Start recording changes of `collection`.
    #[must_use]
    pub fn attach(collection: &LayerCollection) -> Self {
        let changes = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&changes);
        let observed = collection.clone();
        let subscription = collection.subscribe(move || {
            sink.borrow_mut().push(observed.names());
        });
        Self {
            changes,
            _subscription: subscription,
        }
    }

    /// Number of notifications seen.
    #[must_use]
    pub fn count(&self) -> usize {
        self.changes.borrow().len()
    }

    /// Layer names at each notification, oldest first.
    #[must_use]
    pub fn snapshots(&self) -> Vec<Vec<String>> {
        self.changes.borrow().clone()
    }

    /// Layer names at the latest notification.
    #[must_use]
    pub fn last(&self) -> Option<Vec<String>> {
        self.changes.borrow().last().cloned()
    }

    /// Forget everything recorded so far.
    pub fn reset(&self) {
        self.changes.borrow_mut().clear();
    }
}
