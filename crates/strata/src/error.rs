#![forbid(unsafe_code)]

//! Top-level error type.
//!
//! Each subsystem keeps its own typed error; this enum only gathers them so
//! applications can use `?` across crate boundaries.

use std::fmt;

use strata_core::LocatorError;
use strata_layers::{DialogError, DropError, LayerError};
use strata_runtime::{ConfigError, ProbeError, ValidationError};

/// Any error a strata API can return.
#[derive(Debug)]
pub enum Error {
    /// A collection mutation was rejected.
    Layer(LayerError),
    /// A drag payload could not be dropped.
    Drop(DropError),
    /// A dialog could not be submitted.
    Dialog(DialogError),
    /// A source failed validation.
    Validation(ValidationError),
    /// A probe failed.
    Probe(ProbeError),
    /// A locator could not be interpreted.
    Locator(LocatorError),
    /// Configuration could not be loaded.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Layer(e) => write!(f, "{e}"),
            Self::Drop(e) => write!(f, "{e}"),
            Self::Dialog(e) => write!(f, "{e}"),
            Self::Validation(e) => write!(f, "{e}"),
            Self::Probe(e) => write!(f, "{e}"),
            Self::Locator(e) => write!(f, "{e}"),
            Self::Config(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Layer(e) => Some(e),
            Self::Drop(e) => Some(e),
            Self::Dialog(e) => Some(e),
            Self::Validation(e) => Some(e),
            Self::Probe(e) => Some(e),
            Self::Locator(e) => Some(e),
            Self::Config(e) => Some(e),
        }
    }
}

impl From<LayerError> for Error {
    fn from(err: LayerError) -> Self {
        Self::Layer(err)
    }
}

impl From<DropError> for Error {
    fn from(err: DropError) -> Self {
        Self::Drop(err)
    }
}

impl From<DialogError> for Error {
    fn from(err: DialogError) -> Self {
        Self::Dialog(err)
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

impl From<ProbeError> for Error {
    fn from(err: ProbeError) -> Self {
        Self::Probe(err)
    }
}

impl From<LocatorError> for Error {
    fn from(err: LocatorError) -> Self {
        Self::Locator(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

/// Standard result type for strata APIs.
pub type Result<T> = std::result::Result<T, Error>;
