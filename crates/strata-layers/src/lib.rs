#![forbid(unsafe_code)]

//! Layer management for strata sessions.
//!
//! - [`LayerCollection`]: ordered, name-unique layers with change
//!   notification, and subsets of them for layer-group panels.
//! - [`DropSession`]: the drag-and-drop move/copy protocol.
//! - [`LayerPanel`]: rows, drop targets and numeric shortcuts over a
//!   collection.
//! - [`LayerDialog`]: add/edit form backed by source validation.
//!
//! # Example
//!
//! ```
//! use strata_layers::{LayerCollection, LayerEntity};
//!
//! let layers = LayerCollection::new();
//! layers.add(LayerEntity::new("sample"), None).unwrap();
//! layers.add(LayerEntity::new("sample (2)"), None).unwrap();
//! assert_eq!(layers.unique_name("sample"), "sample (3)");
//! ```

pub mod collection;
pub mod dialog;
pub mod drag;
pub mod entity;
pub mod error;
pub mod panel;

pub use collection::{CollectionId, LayerCollection, unique_name};
pub use dialog::{DialogMode, LayerDialog};
pub use drag::{
    DragContext, DragOrigin, DragPayload, DragPolicy, DropDescriptor, DropMethod, DropOutcome,
    DropSession, DropState, LAYER_MEDIA_TYPE, decode_layers, encode_layers,
};
pub use entity::{LayerEntity, LayerId, LayerSpec, base_name};
pub use error::{DialogError, DropError, LayerError};
pub use panel::{
    DragResponse, DropTargetId, LayerAction, LayerPanel, LayerRow, ParseActionError,
    SelectedLayer,
};
