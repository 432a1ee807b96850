#![forbid(unsafe_code)]

//! Completion mailbox for work that runs off the UI thread.
//!
//! Mutation of layer state happens on one thread only. Work that must run
//! elsewhere (a blocking probe on a worker thread) hands its result to a
//! [`CompletionPoster`]; the continuation registered for it runs later on the
//! thread that owns the [`CompletionQueue`], when that thread calls
//! [`pump`](CompletionQueue::pump).
//!
//! ```
//! use strata_runtime::mailbox::CompletionQueue;
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let queue = CompletionQueue::new();
//! let seen = Rc::new(Cell::new(0));
//! let sink = Rc::clone(&seen);
//! let poster = queue.register(move |v: u32| sink.set(v));
//!
//! std::thread::spawn(move || poster.post(7)).join().unwrap();
//! assert_eq!(seen.get(), 0);
//! assert_eq!(queue.pump(), 1);
//! assert_eq!(seen.get(), 7);
//! ```

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::mpsc;
use web_time::{Duration, Instant};

type Continuation<T> = Box<dyn FnOnce(T)>;

/// Identifies one registered continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    /// Raw ticket number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Sending half of a registered continuation.
///
/// Posters are `Send` and may be cloned; the first value posted for a ticket
/// wins and later posts are ignored by the queue.
pub struct CompletionPoster<T> {
    ticket: Ticket,
    sender: mpsc::Sender<(Ticket, T)>,
}

impl<T> Clone for CompletionPoster<T> {
    fn clone(&self) -> Self {
        Self {
            ticket: self.ticket,
            sender: self.sender.clone(),
        }
    }
}

impl<T> std::fmt::Debug for CompletionPoster<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionPoster")
            .field("ticket", &self.ticket)
            .finish()
    }
}

impl<T> CompletionPoster<T> {
    /// Ticket this poster completes.
    #[must_use]
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// Hand `value` to the owning queue.
    ///
    /// Returns `false` if the queue has been dropped.
    pub fn post(&self, value: T) -> bool {
        self.sender.send((self.ticket, value)).is_ok()
    }
}

/// Single-threaded owner of pending continuations.
pub struct CompletionQueue<T> {
    sender: mpsc::Sender<(Ticket, T)>,
    receiver: mpsc::Receiver<(Ticket, T)>,
    pending: RefCell<HashMap<Ticket, Continuation<T>>>,
    next_ticket: Cell<u64>,
}

impl<T> std::fmt::Debug for CompletionQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionQueue")
            .field("pending", &self.pending.borrow().len())
            .field("next_ticket", &self.next_ticket.get())
            .finish()
    }
}

impl<T: Send + 'static> Default for CompletionQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> CompletionQueue<T> {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            pending: RefCell::new(HashMap::new()),
            next_ticket: Cell::new(1),
        }
    }

    /// Register a continuation and return the poster that completes it.
    pub fn register(&self, continuation: impl FnOnce(T) + 'static) -> CompletionPoster<T> {
        let ticket = Ticket(self.next_ticket.get());
        self.next_ticket.set(ticket.0 + 1);
        self.pending
            .borrow_mut()
            .insert(ticket, Box::new(continuation));
        CompletionPoster {
            ticket,
            sender: self.sender.clone(),
        }
    }

    /// Drop the continuation for `ticket` without running it.
    ///
    /// Returns `true` if it was still pending.
    pub fn forget(&self, ticket: Ticket) -> bool {
        self.pending.borrow_mut().remove(&ticket).is_some()
    }

    /// Number of continuations still waiting for a value.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Run every continuation whose value has already arrived.
    ///
    /// Returns the number of continuations run.
    pub fn pump(&self) -> usize {
        let mut ran = 0;
        while let Ok((ticket, value)) = self.receiver.try_recv() {
            if self.complete(ticket, value) {
                ran += 1;
            }
        }
        ran
    }

    /// Wait up to `timeout` for at least one continuation to run, then drain
    /// whatever else has arrived.
    pub fn pump_timeout(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        loop {
            let ran = self.pump();
            if ran > 0 {
                return ran;
            }
            let now = Instant::now();
            if now >= deadline {
                return 0;
            }
            match self.receiver.recv_timeout(deadline - now) {
                Ok((ticket, value)) => {
                    if self.complete(ticket, value) {
                        return 1 + self.pump();
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => return 0,
                // The queue holds a sender, so the channel cannot disconnect.
                Err(mpsc::RecvTimeoutError::Disconnected) => return 0,
            }
        }
    }

    fn complete(&self, ticket: Ticket, value: T) -> bool {
        let continuation = self.pending.borrow_mut().remove(&ticket);
        match continuation {
            Some(continuation) => {
                continuation(value);
                true
            }
            None => {
                tracing::trace!(ticket = ticket.0, "completion for unknown ticket ignored");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn continuation_runs_only_when_pumped() {
        let queue = CompletionQueue::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let poster = queue.register(move |v: &'static str| sink.borrow_mut().push(v));

        assert!(poster.post("done"));
        assert!(seen.borrow().is_empty());
        assert_eq!(queue.pending(), 1);

        assert_eq!(queue.pump(), 1);
        assert_eq!(*seen.borrow(), vec!["done"]);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn first_post_wins() {
        let queue = CompletionQueue::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let poster = queue.register(move |v: u8| sink.borrow_mut().push(v));
        let twin = poster.clone();

        poster.post(1);
        twin.post(2);
        assert_eq!(queue.pump(), 1);
        assert_eq!(*seen.borrow(), vec![1]);
    }

    #[test]
    fn completions_arrive_out_of_order() {
        let queue = CompletionQueue::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let a = {
            let sink = Rc::clone(&seen);
            queue.register(move |v: u8| sink.borrow_mut().push(('a', v)))
        };
        let b = {
            let sink = Rc::clone(&seen);
            queue.register(move |v: u8| sink.borrow_mut().push(('b', v)))
        };
        assert!(a.ticket() < b.ticket());

        b.post(2);
        a.post(1);
        queue.pump();
        assert_eq!(*seen.borrow(), vec![('b', 2), ('a', 1)]);
    }

    #[test]
    fn forgotten_ticket_is_never_run() {
        let queue = CompletionQueue::new();
        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        let poster = queue.register(move |_: ()| flag.set(true));
        assert!(queue.forget(poster.ticket()));
        poster.post(());
        assert_eq!(queue.pump(), 0);
        assert!(!ran.get());
    }

    #[test]
    fn pump_timeout_waits_for_worker() {
        let queue = CompletionQueue::new();
        let seen = Rc::new(Cell::new(0));
        let sink = Rc::clone(&seen);
        let poster = queue.register(move |v: u32| sink.set(v));
        let worker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            poster.post(42);
        });
        assert_eq!(queue.pump_timeout(Duration::from_secs(5)), 1);
        assert_eq!(seen.get(), 42);
        worker.join().unwrap();
    }

    #[test]
    fn pump_timeout_gives_up() {
        let queue: CompletionQueue<u8> = CompletionQueue::new();
        let _poster = queue.register(|_| {});
        assert_eq!(queue.pump_timeout(Duration::from_millis(5)), 0);
        assert_eq!(queue.pending(), 1);
    }
}
