#![forbid(unsafe_code)]

//! Deterministic collaborators for exercising strata without a host.
//!
//! - [`DeferredProber`]: probes stay in flight until resolved, in any order.
//! - [`ImmediateProber`]: answers synchronously.
//! - [`DragScript`]: replays drag gestures against a
//!   [`LayerPanel`](strata_layers::LayerPanel).
//! - [`ChangeRecorder`]: captures the layer order at every change.
//! - [`fixtures`]: sample volumes, locators and collections.

pub mod drag_script;
pub mod fixtures;
pub mod prober;
pub mod recorder;

pub use drag_script::{DragScript, DragStep};
pub use prober::{DeferredProber, ImmediateProber};
pub use recorder::ChangeRecorder;
