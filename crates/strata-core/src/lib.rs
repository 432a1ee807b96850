#![forbid(unsafe_code)]

//! Core: input event vocabulary and volume source metadata.
//!
//! # Role in strata
//! `strata-core` is the input layer. It owns the normalized drag/pointer event
//! tuples (`{kind, modifiers, payload}`) that the layer panel consumes, and
//! the metadata types describing a probed volume source.
//!
//! # Primary responsibilities
//! - **Event**: drag lifecycle events, modifier keys, raw (foreign) payloads.
//! - **Source**: probe results (`VolumeInfo`), locator errors, and the
//!   name-suggestion contract with a default path-based implementation.
//!
//! # How it fits in the system
//! The runtime (`strata-runtime`) validates sources described here, and the
//! layer crate (`strata-layers`) turns events into collection mutations.

pub mod event;
pub mod source;

pub use event::{DragEvent, DragEventKind, Modifiers, RawPayload};
pub use source::{DataType, LocatorError, NameSuggester, PathNameSuggester, VolumeInfo, VolumeKind};
