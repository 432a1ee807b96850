#![forbid(unsafe_code)]

//! Strata public facade crate.
//!
//! Re-exports the types most applications need from the internal crates,
//! a [`Session`] bundling a layer collection with its panel and dialogs, and
//! a top-level [`Error`].
//!
//! ```
//! use std::rc::Rc;
//! use strata::prelude::*;
//! use strata_harness::{ImmediateProber, fixtures};
//!
//! let session = Session::new(Rc::new(ImmediateProber::valid(fixtures::image_info())));
//! let mut dialog = session.add_layer_dialog();
//! dialog.set_source("precomputed://gs://bucket/brain/image");
//! dialog.validate_source(true);
//! let id = dialog.submit()?;
//! assert_eq!(session.layers().get(id).unwrap().name(), "image");
//! # Ok::<(), strata::Error>(())
//! ```

mod error;
mod session;

pub use error::{Error, Result};
pub use session::Session;

// --- Core re-exports -------------------------------------------------------

pub use strata_core::{
    DataType, DragEvent, DragEventKind, LocatorError, Modifiers, NameSuggester,
    PathNameSuggester, RawPayload, VolumeInfo, VolumeKind,
};

// --- Runtime re-exports ----------------------------------------------------

pub use strata_runtime::{
    BatchScope, CancellationSource, CancellationToken, CompletionQueue, ConfigError, Observable,
    ProbeError, ProbeResult, SessionConfig, Signal, SourceValidator, Subscription,
    ThreadedProber, ValidationError, ValidationState, ValidationStatus, VolumeProber,
};

// --- Layer re-exports ------------------------------------------------------

pub use strata_layers::{
    DialogError, DragContext, DragOrigin, DragPayload, DragResponse, DropError, DropMethod,
    DropOutcome, DropTargetId, LayerAction, LayerCollection, LayerDialog, LayerEntity, LayerError,
    LayerId, LayerPanel, LayerRow, LayerSpec, SelectedLayer,
};

/// Install the global log subscriber described by `config.logging`.
///
/// Returns `false` if one was already installed.
pub fn init_logging(config: &SessionConfig) -> bool {
    strata_runtime::logging::init(&config.logging)
}

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        DragContext, DragEvent, DragEventKind, DropTargetId, Error, LayerCollection, LayerDialog,
        LayerEntity, LayerId, LayerPanel, Modifiers, Result, Session, SessionConfig,
        VolumeProber,
    };

    pub use crate::{core, layers, runtime};
}

pub use strata_core as core;
pub use strata_layers as layers;
pub use strata_runtime as runtime;
