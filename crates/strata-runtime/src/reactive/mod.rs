#![forbid(unsafe_code)]

//! Reactive change notification.
//!
//! - [`Observable`]: a shared value that notifies subscribers when it changes.
//! - [`Signal`]: a stateless event with subscribers.
//! - [`BatchScope`]: defers and coalesces notifications until the outermost
//!   scope ends.
//!
//! Everything here is single-threaded (`Rc`-based) and is meant to be driven
//! from the UI thread only.

pub mod batch;
pub mod observable;
pub mod signal;

pub use batch::BatchScope;
pub use observable::{Observable, Subscription};
pub use signal::Signal;
