#![forbid(unsafe_code)]

//! Add/edit layer dialog.
//!
//! The dialog owns a source input and a name input and drives a
//! [`SourceValidator`]. Submission is allowed only while both inputs are
//! valid. When editing an existing layer the source is locked and only the
//! name can change; a layer with a source has it probed again on opening.

use std::fmt;
use std::rc::Rc;

use strata_core::NameSuggester;
use strata_runtime::config::SessionConfig;
use strata_runtime::reactive::Subscription;
use strata_runtime::validation::{SourceValidator, ValidationState, VolumeProber};
use tracing::{debug, trace};

use crate::collection::LayerCollection;
use crate::entity::{LayerEntity, LayerId};
use crate::error::{DialogError, LayerError};

/// Whether the dialog creates a layer or edits one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogMode {
    Add,
    Edit(LayerId),
}

/// Form state for adding or editing a layer.
pub struct LayerDialog {
    collection: LayerCollection,
    suggester: Rc<dyn NameSuggester>,
    validator: SourceValidator,
    mode: DialogMode,
    source: String,
    name: String,
    focus_name: bool,
    fallback_name: String,
}

impl fmt::Debug for LayerDialog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerDialog")
            .field("mode", &self.mode)
            .field("source", &self.source)
            .field("name", &self.name)
            .field("validator", &self.validator)
            .finish_non_exhaustive()
    }
}

impl LayerDialog {
    /// Dialog for a new layer.
    ///
    /// The source input starts with the source group of the most recent
    /// layer that has a locator, so sibling volumes are quick to add.
    pub fn add(
        collection: &LayerCollection,
        prober: Rc<dyn VolumeProber>,
        suggester: Rc<dyn NameSuggester>,
    ) -> Self {
        let source = collection.with_layers(|layers| {
            layers
                .iter()
                .rev()
                .find_map(LayerEntity::locator)
                .and_then(|locator| {
                    let offset = suggester.find_source_group(locator).ok()?;
                    locator.get(..offset).map(str::to_owned)
                })
                .unwrap_or_default()
        });
        Self {
            fallback_name: collection.naming().fallback_name,
            collection: collection.clone(),
            suggester,
            validator: SourceValidator::new(prober),
            mode: DialogMode::Add,
            source,
            name: String::new(),
            focus_name: false,
        }
    }

    /// Dialog editing `id`, with the source locked.
    ///
    /// A layer with a source has it probed, and submission waits for the
    /// result. A layer without one counts as having a valid source. The name
    /// input asks for focus.
    pub fn edit(
        collection: &LayerCollection,
        id: LayerId,
        prober: Rc<dyn VolumeProber>,
        suggester: Rc<dyn NameSuggester>,
    ) -> Result<Self, LayerError> {
        let entity = collection.get(id).ok_or(LayerError::UnknownLayer(id))?;
        let mut dialog = Self {
            fallback_name: collection.naming().fallback_name,
            collection: collection.clone(),
            suggester,
            validator: SourceValidator::new(prober),
            mode: DialogMode::Edit(id),
            source: entity.locator().unwrap_or_default().to_owned(),
            name: entity.name().to_owned(),
            focus_name: true,
        };
        if entity.locator().is_some() {
            dialog.probe_source(false);
        } else {
            dialog.validator.set_source_valid(true);
        }
        Ok(dialog)
    }

    /// Apply the status text from `config`.
    #[must_use]
    pub fn with_config(mut self, config: &SessionConfig) -> Self {
        let message = config.validation.probing_message.clone();
        self.validator = self.validator.with_probing_message(message.clone());
        if self.validator.in_flight() {
            self.validator.set_info(message);
        }
        self
    }

    #[must_use]
    pub fn mode(&self) -> DialogMode {
        self.mode
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_source_locked(&self) -> bool {
        matches!(self.mode, DialogMode::Edit(_))
    }

    #[must_use]
    pub fn validator(&self) -> &SourceValidator {
        &self.validator
    }

    #[must_use]
    pub fn state(&self) -> ValidationState {
        self.validator.state()
    }

    pub fn subscribe(&self, f: impl Fn(&ValidationState) + 'static) -> Subscription {
        self.validator.subscribe(f)
    }

    /// Whether the last source check asked for the name input to get focus.
    /// Reading the request clears it.
    pub fn take_focus_request(&mut self) -> bool {
        std::mem::take(&mut self.focus_name)
    }

    // -- Inputs ---------------------------------------------------------------

    /// The user edited the source text. Ignored while the source is locked.
    pub fn set_source(&mut self, text: impl Into<String>) -> bool {
        if self.is_source_locked() {
            return false;
        }
        self.source = text.into();
        self.validator.mark_source_edited();
        true
    }

    /// The user edited the name text.
    pub fn set_name(&mut self, text: impl Into<String>) -> bool {
        self.name = text.into();
        self.validate_name()
    }

    /// A name is valid if it is non-empty and not used by another layer.
    pub fn validate_name(&self) -> bool {
        let except = match self.mode {
            DialogMode::Edit(id) => Some(id),
            DialogMode::Add => None,
        };
        let valid = !self.name.is_empty() && !self.collection.name_taken(&self.name, except);
        self.validator.set_name_valid(valid);
        valid
    }

    /// Check the source: suggest a name if none was entered, then probe.
    ///
    /// Returns the probe generation, or `None` if no probe was issued.
    pub fn validate_source(&mut self, focus_name: bool) -> Option<u64> {
        if self.is_source_locked() {
            return None;
        }
        self.probe_source(focus_name)
    }

    fn probe_source(&mut self, focus_name: bool) -> Option<u64> {
        let locator = self.source.trim().to_owned();
        if locator.is_empty() {
            return None;
        }
        let suggestion = match self.suggester.suggest_name(&locator) {
            Ok(suggestion) => suggestion,
            Err(err) => {
                trace!(target: "strata.validation", error = %err, "malformed locator");
                self.validator.cancel();
                self.validator.set_error(err.into());
                return None;
            }
        };
        if self.name.is_empty() {
            let base = if suggestion.is_empty() {
                self.fallback_name.as_str()
            } else {
                suggestion.as_str()
            };
            self.name = self.collection.unique_name(base);
            self.validate_name();
        }
        self.focus_name |= focus_name;
        Some(self.validator.validate(&locator))
    }

    // -- Submit ---------------------------------------------------------------

    #[must_use]
    pub fn can_submit(&self) -> bool {
        self.validator.state().valid
    }

    /// Commit the dialog: rename the edited layer or append a new one.
    pub fn submit(&self) -> Result<LayerId, DialogError> {
        if !self.validate_name() || !self.can_submit() {
            return Err(DialogError::Incomplete);
        }
        match self.mode {
            DialogMode::Edit(id) => {
                self.collection.rename(id, &self.name)?;
                debug!(target: "strata.layers", layer = %self.name, "layer edited");
                Ok(id)
            }
            DialogMode::Add => {
                let entity = LayerEntity::new(self.name.as_str()).with_locator(self.source.trim());
                let id = self.collection.add(entity, None)?;
                Ok(id)
            }
        }
    }
}
