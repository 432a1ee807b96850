#![forbid(unsafe_code)]

//! Named layer entities and their serializable form.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_LAYER_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a layer, independent of its name and position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(u64);

impl LayerId {
    /// Allocate a fresh, process-unique id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

/// A named reference to a volume source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerEntity {
    id: LayerId,
    name: String,
    locator: Option<String>,
    visible: bool,
    archived: bool,
}

impl LayerEntity {
    /// A visible layer without a source.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: LayerId::next(),
            name: name.into(),
            locator: None,
            visible: true,
            archived: false,
        }
    }

    #[must_use]
    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = Some(locator.into());
        self
    }

    #[must_use]
    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    #[must_use]
    pub fn with_archived(mut self, archived: bool) -> Self {
        self.archived = archived;
        self
    }

    /// Build a new entity (fresh id) from a spec.
    #[must_use]
    pub fn from_spec(spec: &LayerSpec) -> Self {
        Self {
            id: LayerId::next(),
            name: spec.name.clone(),
            locator: spec.locator.clone(),
            visible: spec.visible,
            archived: false,
        }
    }

    /// A copy with a fresh id and a new name; source and visibility are kept.
    #[must_use]
    pub fn duplicate(&self, name: impl Into<String>) -> Self {
        Self {
            id: LayerId::next(),
            name: name.into(),
            locator: self.locator.clone(),
            visible: self.visible,
            archived: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> LayerId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn locator(&self) -> Option<&str> {
        self.locator.as_deref()
    }

    #[must_use]
    pub fn visible(&self) -> bool {
        self.visible
    }

    #[must_use]
    pub fn archived(&self) -> bool {
        self.archived
    }

    #[must_use]
    pub fn to_spec(&self) -> LayerSpec {
        LayerSpec {
            name: self.name.clone(),
            locator: self.locator.clone(),
            visible: self.visible,
        }
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub(crate) fn set_archived(&mut self, archived: bool) {
        self.archived = archived;
    }
}

/// Serializable record of one layer, in collection order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
    #[serde(default = "visible_by_default")]
    pub visible: bool,
}

fn visible_by_default() -> bool {
    true
}

impl LayerSpec {
    pub fn new(name: impl Into<String>, locator: Option<String>) -> Self {
        Self {
            name: name.into(),
            locator,
            visible: true,
        }
    }
}

/// Strip a trailing ` (N)` uniqueness suffix: `image (3)` -> `image`.
#[must_use]
pub fn base_name(name: &str) -> &str {
    let Some(open) = name.rfind(" (") else {
        return name;
    };
    let Some(digits) = name[open + 2..].strip_suffix(')') else {
        return name;
    };
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) && open > 0 {
        &name[..open]
    } else {
        name
    }
}
