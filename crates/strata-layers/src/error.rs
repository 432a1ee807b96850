#![forbid(unsafe_code)]

//! Error types for layer operations.

use std::fmt;

use crate::entity::LayerId;

/// A collection mutation that would break an invariant.
///
/// The collection is left unchanged whenever one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerError {
    /// Another layer already has this name.
    DuplicateName { name: String },
    /// Layer names must not be empty.
    EmptyName,
    /// The layer is not in the collection.
    UnknownLayer(LayerId),
}

impl fmt::Display for LayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateName { name } => write!(f, "a layer named {name:?} already exists"),
            Self::EmptyName => f.write_str("layer name must not be empty"),
            Self::UnknownLayer(id) => write!(f, "no such layer: {id}"),
        }
    }
}

impl std::error::Error for LayerError {}

/// A drag payload that cannot produce any layers for this target.
///
/// Never shown to the user; the gesture simply has no effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropError {
    Incompatible { reason: String },
}

impl DropError {
    pub(crate) fn incompatible(reason: impl Into<String>) -> Self {
        Self::Incompatible {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for DropError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incompatible { reason } => write!(f, "incompatible drop: {reason}"),
        }
    }
}

impl std::error::Error for DropError {}

/// Why a layer dialog could not be submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogError {
    /// Source or name is not (yet) valid.
    Incomplete,
    /// The collection rejected the change.
    Layer(LayerError),
}

impl fmt::Display for DialogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incomplete => f.write_str("source and name must both be valid"),
            Self::Layer(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for DialogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Incomplete => None,
            Self::Layer(e) => Some(e),
        }
    }
}

impl From<LayerError> for DialogError {
    fn from(e: LayerError) -> Self {
        Self::Layer(e)
    }
}
