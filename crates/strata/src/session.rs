#![forbid(unsafe_code)]

//! A layer session: one collection, its panel, and the collaborators the
//! dialogs need, all configured from one [`SessionConfig`].

use std::fmt;
use std::rc::Rc;

use strata_core::{NameSuggester, PathNameSuggester};
use strata_layers::{DragContext, LayerCollection, LayerDialog, LayerId, LayerPanel, LayerSpec};
use strata_runtime::{SessionConfig, VolumeProber};
use tracing::info;

use crate::Result;

/// Layers plus the panel and dialogs that edit them.
pub struct Session {
    config: SessionConfig,
    layers: LayerCollection,
    context: DragContext,
    panel: LayerPanel,
    prober: Rc<dyn VolumeProber>,
    suggester: Rc<dyn NameSuggester>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("layers", &self.layers)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// A session with default configuration and the path-based suggester.
    pub fn new(prober: Rc<dyn VolumeProber>) -> Self {
        Self::build(SessionConfig::default(), prober)
    }

    /// A session using `config`, rejected if the config is out of range.
    pub fn with_config(config: SessionConfig, prober: Rc<dyn VolumeProber>) -> Result<Self> {
        let config = config.validated()?;
        Ok(Self::build(config, prober))
    }

    /// Load the config from a TOML file.
    #[cfg(feature = "config")]
    pub fn from_toml_file(
        path: impl AsRef<std::path::Path>,
        prober: Rc<dyn VolumeProber>,
    ) -> Result<Self> {
        let config = SessionConfig::from_toml_file(path)?;
        Self::with_config(config, prober)
    }

    /// Replace the name suggestion service.
    #[must_use]
    pub fn with_suggester(mut self, suggester: Rc<dyn NameSuggester>) -> Self {
        self.suggester = suggester;
        self
    }

    fn build(config: SessionConfig, prober: Rc<dyn VolumeProber>) -> Self {
        let layers = LayerCollection::with_naming(config.naming.clone());
        let context = DragContext::new();
        let panel = LayerPanel::with_config(&layers, &context, &config);
        info!(
            target: "strata.config",
            shortcuts = config.shortcuts.count,
            copy_modifier = config.drag.copy_modifier.as_str(),
            move_modifier = config.drag.move_modifier.as_str(),
            "session created"
        );
        Self {
            config,
            layers,
            context,
            panel,
            prober,
            suggester: Rc::new(PathNameSuggester),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn layers(&self) -> &LayerCollection {
        &self.layers
    }

    /// Drag context shared by every panel of this session.
    #[must_use]
    pub fn context(&self) -> &DragContext {
        &self.context
    }

    #[must_use]
    pub fn panel(&self) -> &LayerPanel {
        &self.panel
    }

    pub fn panel_mut(&mut self) -> &mut LayerPanel {
        &mut self.panel
    }

    /// Another panel over the same layers, sharing the drag context.
    #[must_use]
    pub fn open_panel(&self) -> LayerPanel {
        LayerPanel::with_config(&self.layers, &self.context, &self.config)
    }

    /// A layer-group panel: a panel over a new, empty subset of the
    /// session's layers, sharing the drag context.
    #[must_use]
    pub fn open_group_panel(&self) -> LayerPanel {
        LayerPanel::with_config(&self.layers.subset(), &self.context, &self.config)
    }

    /// Dialog for adding a layer.
    #[must_use]
    pub fn add_layer_dialog(&self) -> LayerDialog {
        LayerDialog::add(
            &self.layers,
            Rc::clone(&self.prober),
            Rc::clone(&self.suggester),
        )
        .with_config(&self.config)
    }

    /// Dialog for editing `id`.
    pub fn edit_layer_dialog(&self, id: LayerId) -> Result<LayerDialog> {
        let dialog = LayerDialog::edit(
            &self.layers,
            id,
            Rc::clone(&self.prober),
            Rc::clone(&self.suggester),
        )?;
        Ok(dialog.with_config(&self.config))
    }

    /// Ordered `{name, locator, visible}` records.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LayerSpec> {
        self.layers.snapshot()
    }

    /// Replace every layer with ones built from `specs`.
    pub fn restore(&self, specs: &[LayerSpec]) -> Vec<LayerId> {
        self.layers.restore(specs)
    }
}
