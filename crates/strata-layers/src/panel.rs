#![forbid(unsafe_code)]

//! Layer list panel: rows, drop targets, and numeric shortcuts.
//!
//! The panel renders nothing itself. It exposes [`LayerRow`] view models,
//! rebuilt lazily after the collection or the selection changes, and turns
//! host events (clicks, drag events, shortcut actions) into collection
//! mutations.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use strata_core::{DragEvent, DragEventKind, Modifiers};
use strata_runtime::config::{MAX_SHORTCUTS, SessionConfig};
use strata_runtime::reactive::{Observable, Subscription};
use tracing::{debug, trace};

use crate::collection::LayerCollection;
use crate::drag::{DragContext, DragPayload, DragPolicy, DropOutcome, DropSession};
use crate::entity::{LayerEntity, LayerId};
use crate::error::LayerError;

/// Element of the panel that accepts drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropTargetId {
    /// A layer row; dropped layers land next to that layer.
    Row(LayerId),
    /// The empty area below the rows.
    DropZone,
    /// The "add layer" button.
    AddButton,
}

impl DropTargetId {
    /// The layer this target stands for; `None` means "end of list".
    #[must_use]
    pub fn layer(self) -> Option<LayerId> {
        match self {
            Self::Row(id) => Some(id),
            Self::DropZone | Self::AddButton => None,
        }
    }
}

/// View model of one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerRow {
    pub id: LayerId,
    /// 1-based position, as shown and as used by shortcuts.
    pub number: usize,
    pub name: String,
    pub visible: bool,
    pub selected: bool,
}

/// Which layer the side panel shows, and whether it is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectedLayer {
    pub layer: Option<LayerId>,
    pub visible: bool,
}

/// Numeric shortcut actions, `toggle-layer-N` and `select-layer-N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerAction {
    Toggle(usize),
    Select(usize),
}

impl LayerAction {
    #[must_use]
    pub fn number(self) -> usize {
        match self {
            Self::Toggle(n) | Self::Select(n) => n,
        }
    }
}

impl fmt::Display for LayerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Toggle(n) => write!(f, "toggle-layer-{n}"),
            Self::Select(n) => write!(f, "select-layer-{n}"),
        }
    }
}

/// Unrecognized action name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseActionError(pub String);

impl fmt::Display for ParseActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown layer action {:?}", self.0)
    }
}

impl std::error::Error for ParseActionError {}

impl FromStr for LayerAction {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |digits: &str| match digits.parse::<usize>() {
            Ok(n) if (1..=MAX_SHORTCUTS).contains(&n) => Ok(n),
            _ => Err(ParseActionError(s.to_owned())),
        };
        if let Some(digits) = s.strip_prefix("toggle-layer-") {
            parse(digits).map(Self::Toggle)
        } else if let Some(digits) = s.strip_prefix("select-layer-") {
            parse(digits).map(Self::Select)
        } else {
            Err(ParseActionError(s.to_owned()))
        }
    }
}

/// What the panel did with a drag event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragResponse {
    /// Not a drop candidate; the host should show "no drop".
    Ignored,
    /// The drop would be accepted.
    Accepted,
    /// A drop was finalized.
    Dropped(DropOutcome),
}

/// Layer list panel bound to one collection.
pub struct LayerPanel {
    collection: LayerCollection,
    context: DragContext,
    session: DropSession,
    selected: Observable<SelectedLayer>,
    shortcut_count: usize,
    rows: RefCell<Vec<LayerRow>>,
    update_needed: Rc<Cell<bool>>,
    _subscriptions: Vec<Subscription>,
}

impl fmt::Debug for LayerPanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerPanel")
            .field("collection", &self.collection)
            .field("selected", &self.selected.get())
            .field("session", &self.session)
            .finish()
    }
}

impl LayerPanel {
    /// A panel with default drag policy and shortcuts.
    pub fn new(collection: &LayerCollection, context: &DragContext) -> Self {
        Self::with_config(collection, context, &SessionConfig::default())
    }

    pub fn with_config(
        collection: &LayerCollection,
        context: &DragContext,
        config: &SessionConfig,
    ) -> Self {
        let selected = Observable::new(SelectedLayer::default());
        let update_needed = Rc::new(Cell::new(true));

        let mut subscriptions = Vec::with_capacity(3);
        let dirty = Rc::clone(&update_needed);
        subscriptions.push(collection.subscribe(move || dirty.set(true)));
        let dirty = Rc::clone(&update_needed);
        subscriptions.push(selected.subscribe(move |_| dirty.set(true)));
        let selection = selected.clone();
        subscriptions.push(collection.on_removed(move |entity| {
            if selection.with(|s| s.layer == Some(entity.id())) {
                trace!(target: "strata.layers", layer = entity.name(), "selection cleared");
                selection.set(SelectedLayer::default());
            }
        }));

        Self {
            collection: collection.clone(),
            context: context.clone(),
            session: DropSession::new(collection, context, DragPolicy::from_config(&config.drag)),
            selected,
            shortcut_count: config.shortcuts.count.min(MAX_SHORTCUTS),
            rows: RefCell::new(Vec::new()),
            update_needed,
            _subscriptions: subscriptions,
        }
    }

    #[must_use]
    pub fn collection(&self) -> &LayerCollection {
        &self.collection
    }

    #[must_use]
    pub fn session(&self) -> &DropSession {
        &self.session
    }

    /// Observable selection state.
    #[must_use]
    pub fn selected(&self) -> Observable<SelectedLayer> {
        self.selected.clone()
    }

    /// Row view models, in collection order.
    pub fn rows(&self) -> Vec<LayerRow> {
        if self.update_needed.replace(false) {
            let selected = self.selected.with(|s| s.layer);
            let rows = self.collection.with_layers(|layers| {
                layers
                    .iter()
                    .enumerate()
                    .map(|(index, layer)| LayerRow {
                        id: layer.id(),
                        number: index + 1,
                        name: layer.name().to_owned(),
                        visible: layer.visible(),
                        selected: selected == Some(layer.id()),
                    })
                    .collect()
            });
            *self.rows.borrow_mut() = rows;
        }
        self.rows.borrow().clone()
    }

    // -- Row interaction ------------------------------------------------------

    /// Plain click toggles visibility; ctrl+click selects.
    pub fn click_row(&self, id: LayerId, modifiers: Modifiers) -> Result<(), LayerError> {
        if modifiers.contains(Modifiers::CTRL) {
            self.select(id)
        } else {
            self.collection.toggle_visible(id).map(|_| ())
        }
    }

    /// Context menu on a row selects it.
    pub fn context_menu(&self, id: LayerId) -> Result<(), LayerError> {
        self.select(id)
    }

    /// Close button on a row removes the layer.
    pub fn close_row(&self, id: LayerId) -> Option<LayerEntity> {
        self.collection.remove(id)
    }

    /// Show `id` in the side panel.
    pub fn select(&self, id: LayerId) -> Result<(), LayerError> {
        if !self.collection.contains(id) {
            return Err(LayerError::UnknownLayer(id));
        }
        self.selected.set(SelectedLayer {
            layer: Some(id),
            visible: true,
        });
        Ok(())
    }

    /// Close the side panel, keeping the selection.
    pub fn hide_selection(&self) {
        self.selected.update(|s| s.visible = false);
    }

    // -- Shortcuts ------------------------------------------------------------

    /// Actions bound by this panel.
    #[must_use]
    pub fn bindings(&self) -> Vec<LayerAction> {
        (1..=self.shortcut_count)
            .flat_map(|n| [LayerAction::Toggle(n), LayerAction::Select(n)])
            .collect()
    }

    /// Run a shortcut action. Returns `false` if it does not apply.
    pub fn perform(&self, action: LayerAction) -> bool {
        let n = action.number();
        if n == 0 || n > self.shortcut_count {
            return false;
        }
        let Some(layer) = self.collection.at(n - 1) else {
            trace!(target: "strata.layers", %action, "no such layer");
            return false;
        };
        match action {
            LayerAction::Toggle(_) => self.collection.toggle_visible(layer.id()).is_ok(),
            LayerAction::Select(_) => self.select(layer.id()).is_ok(),
        }
    }

    // -- Drag and drop --------------------------------------------------------

    /// A drag started on the rows for `layers`. Records the gesture in the
    /// shared context and returns the payload for the host to carry.
    pub fn drag_start(&self, layers: &[LayerId]) -> Option<DragPayload> {
        let present: Vec<LayerId> = layers
            .iter()
            .copied()
            .filter(|id| self.collection.contains(*id))
            .collect();
        if present.is_empty() {
            return None;
        }
        debug!(target: "strata.drag", count = present.len(), "drag start");
        let payload = DragPayload::internal(&self.collection, present);
        self.context.start(payload.clone());
        Some(payload)
    }

    /// Route a drag event received by `target`.
    pub fn handle_drag(
        &mut self,
        target: DropTargetId,
        event: &DragEvent<DragPayload>,
    ) -> DragResponse {
        let layer = target.layer();
        let accepted = |ok: bool| {
            if ok {
                DragResponse::Accepted
            } else {
                DragResponse::Ignored
            }
        };
        match event.kind {
            DragEventKind::Start => DragResponse::Ignored,
            DragEventKind::Enter => accepted(self.session.drag_enter(layer, event)),
            DragEventKind::Over => accepted(self.session.drag_over(layer, event)),
            DragEventKind::Leave => {
                self.session.drag_leave(event);
                DragResponse::Ignored
            }
            DragEventKind::Drop => match self.session.drop(layer, event) {
                Some(outcome) => DragResponse::Dropped(outcome),
                None => DragResponse::Ignored,
            },
            DragEventKind::End => {
                self.session.drag_end();
                DragResponse::Ignored
            }
        }
    }
}
