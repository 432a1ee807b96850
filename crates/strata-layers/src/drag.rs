#![forbid(unsafe_code)]

//! Drag-and-drop move/copy protocol for layer lists.
//!
//! A [`DropSession`] belongs to one drop-target collection and walks the
//! state machine
//!
//! ```text
//! Idle --enter/over (payload ok)--> Active(descriptor)
//! Active --drop--> finalize --> Idle
//! Active --leave (real exit) / end--> rollback --> Idle
//! Active --modifier change--> rollback --> rebuild
//! ```
//!
//! A *copy* descriptor inserts its copies as soon as it becomes active, so
//! the user sees where they will land, and moves them as the pointer moves.
//! Leaving the panel or ending the gesture elsewhere removes them again. A
//! *move* descriptor touches nothing until the drop. A move between two
//! subsets of one root hands membership over; a move forced across roots
//! takes the layers out of their source collection.
//!
//! The layers a descriptor refers to are re-checked against the collection
//! when the drop is finalized; layers removed meanwhile are skipped.
//!
//! The layers being dragged are recorded in an explicit [`DragContext`]
//! shared by every panel that can take part in a gesture. Whoever sees the
//! gesture end clears it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use strata_core::{DragEvent, Modifiers, RawPayload};
use strata_runtime::config::DragConfig;
use strata_runtime::reactive::BatchScope;
use tracing::{debug, debug_span, trace, warn};

use crate::collection::LayerCollection;
use crate::entity::{LayerId, LayerSpec};
use crate::error::{DropError, LayerError};

/// Media type of a JSON array of [`LayerSpec`] records.
pub const LAYER_MEDIA_TYPE: &str = "application/x-strata-layers+json";

/// Whether a drop relocates layers or duplicates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropMethod {
    Move,
    Copy,
}

impl DropMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Copy => "copy",
        }
    }
}

impl fmt::Display for DropMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a drag payload comes from, relative to a drop target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DragOrigin {
    /// The target collection itself.
    SameCollection,
    /// Another collection drawing on the target's root.
    SameRoot,
    /// A collection under another root.
    OtherRoot,
    /// Not a strata collection.
    External,
}

impl DragOrigin {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SameCollection => "same-collection",
            Self::SameRoot => "same-root",
            Self::OtherRoot => "other-root",
            Self::External => "external",
        }
    }

    /// Whether source and target share a root.
    #[must_use]
    pub const fn shares_root(self) -> bool {
        matches!(self, Self::SameCollection | Self::SameRoot)
    }

    /// Whether the layers can be taken out of their source.
    #[must_use]
    pub const fn is_movable(self) -> bool {
        !matches!(self, Self::External)
    }
}

/// What a drag gesture carries, decided once when it is read.
#[derive(Debug, Clone)]
pub enum DragPayload {
    /// Layers of a strata collection in this process.
    Internal {
        collection: LayerCollection,
        layers: Vec<LayerId>,
    },
    /// Anything else, identified by media type.
    External(RawPayload),
}

impl DragPayload {
    pub fn internal(collection: &LayerCollection, layers: Vec<LayerId>) -> Self {
        Self::Internal {
            collection: collection.clone(),
            layers,
        }
    }

    /// Where the payload comes from, seen from `target`.
    #[must_use]
    pub fn origin(&self, target: &LayerCollection) -> DragOrigin {
        match self {
            Self::Internal { collection, .. } if collection.same_collection(target) => {
                DragOrigin::SameCollection
            }
            Self::Internal { collection, .. } if collection.same_root(target) => {
                DragOrigin::SameRoot
            }
            Self::Internal { .. } => DragOrigin::OtherRoot,
            Self::External(_) => DragOrigin::External,
        }
    }

    /// Serialized form for hosts that only move strings around.
    #[must_use]
    pub fn to_raw(&self) -> RawPayload {
        match self {
            Self::Internal { collection, layers } => {
                let specs: Vec<LayerSpec> = layers
                    .iter()
                    .filter_map(|id| collection.get(*id))
                    .map(|l| l.to_spec())
                    .collect();
                encode_layers(&specs)
            }
            Self::External(raw) => raw.clone(),
        }
    }
}

/// Encode layer specs as a [`LAYER_MEDIA_TYPE`] payload.
#[must_use]
pub fn encode_layers(specs: &[LayerSpec]) -> RawPayload {
    // Serializing plain strings and bools cannot fail.
    let data = serde_json::to_string(specs).unwrap_or_else(|_| "[]".to_owned());
    RawPayload::new(LAYER_MEDIA_TYPE, data)
}

/// Decode a [`LAYER_MEDIA_TYPE`] payload.
pub fn decode_layers(raw: &RawPayload) -> Result<Vec<LayerSpec>, DropError> {
    if raw.media_type != LAYER_MEDIA_TYPE {
        return Err(DropError::incompatible(format!(
            "unsupported media type {:?}",
            raw.media_type
        )));
    }
    serde_json::from_str(&raw.data)
        .map_err(|e| DropError::incompatible(format!("malformed layer payload: {e}")))
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// The gesture currently being dragged, shared by all participating panels.
#[derive(Debug, Clone, Default)]
pub struct DragContext {
    current: Rc<RefCell<Option<DragPayload>>>,
}

impl DragContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the payload of a starting gesture, replacing any stale one.
    pub fn start(&self, payload: DragPayload) {
        trace!(target: "strata.drag", "drag started");
        *self.current.borrow_mut() = Some(payload);
    }

    #[must_use]
    pub fn current(&self) -> Option<DragPayload> {
        self.current.borrow().clone()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// Clear the current gesture. Safe to call from any participant, any
    /// number of times.
    pub fn end(&self) -> Option<DragPayload> {
        let previous = self.current.borrow_mut().take();
        if previous.is_some() {
            trace!(target: "strata.drag", "drag context cleared");
        }
        previous
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Modifier-key policy for choosing the drop method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragPolicy {
    pub copy_modifier: Modifiers,
    pub move_modifier: Modifiers,
}

impl Default for DragPolicy {
    fn default() -> Self {
        Self::from_config(&DragConfig::default())
    }
}

impl DragPolicy {
    #[must_use]
    pub fn from_config(config: &DragConfig) -> Self {
        Self {
            copy_modifier: config.copy_modifier.modifiers(),
            move_modifier: config.move_modifier.modifiers(),
        }
    }

    /// Copy key forces copy and wins over the move key. The move key forces
    /// a move of any strata layers. Otherwise layers move within their root
    /// and are copied across roots. External payloads are always copied.
    #[must_use]
    pub fn method(&self, modifiers: Modifiers, origin: DragOrigin) -> DropMethod {
        if !origin.is_movable() || modifiers.intersects(self.copy_modifier) {
            DropMethod::Copy
        } else if self.forces_move(modifiers) || origin.shares_root() {
            DropMethod::Move
        } else {
            DropMethod::Copy
        }
    }

    /// Whether `modifiers` explicitly ask for a move.
    #[must_use]
    pub fn forces_move(&self, modifiers: Modifiers) -> bool {
        modifiers.intersects(self.move_modifier) && !modifiers.intersects(self.copy_modifier)
    }
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// A candidate move or copy of some layers into a target collection.
#[derive(Debug)]
pub struct DropDescriptor {
    method: DropMethod,
    origin: DragOrigin,
    source: Option<LayerCollection>,
    target: LayerCollection,
    /// The moved layers, or the inserted copies.
    layers: Vec<LayerId>,
    /// Copy templates not yet inserted.
    templates: Vec<LayerSpec>,
    materialized: bool,
    target_index: Option<usize>,
}

impl DropDescriptor {
    /// Build a descriptor for `payload` dropped on `target`.
    pub fn new(
        payload: &DragPayload,
        target: &LayerCollection,
        method: DropMethod,
    ) -> Result<Self, DropError> {
        let mut descriptor = Self {
            method,
            origin: payload.origin(target),
            source: None,
            target: target.clone(),
            layers: Vec::new(),
            templates: Vec::new(),
            materialized: false,
            target_index: None,
        };
        match payload {
            DragPayload::Internal { collection, layers } => {
                let present: Vec<LayerId> = layers
                    .iter()
                    .copied()
                    .filter(|id| collection.contains(*id))
                    .collect();
                if present.is_empty() {
                    return Err(DropError::incompatible("dragged layers no longer exist"));
                }
                descriptor.source = Some(collection.clone());
                match method {
                    DropMethod::Move => {
                        descriptor.layers = present;
                        descriptor.materialized = descriptor.origin == DragOrigin::SameCollection;
                    }
                    DropMethod::Copy => {
                        descriptor.templates = present
                            .iter()
                            .filter_map(|id| collection.get(*id))
                            .map(|l| l.to_spec())
                            .collect();
                    }
                }
            }
            DragPayload::External(raw) => {
                if method == DropMethod::Move {
                    return Err(DropError::incompatible("external layers can only be copied"));
                }
                let specs = decode_layers(raw)?;
                if specs.is_empty() {
                    return Err(DropError::incompatible("payload holds no layers"));
                }
                descriptor.templates = specs;
            }
        }
        Ok(descriptor)
    }

    #[must_use]
    pub fn method(&self) -> DropMethod {
        self.method
    }

    /// Collection the layers were dragged from, if any.
    #[must_use]
    pub fn source(&self) -> Option<&LayerCollection> {
        self.source.as_ref()
    }

    #[must_use]
    pub fn origin(&self) -> DragOrigin {
        self.origin
    }

    /// Ids the descriptor currently refers to.
    #[must_use]
    pub fn layers(&self) -> &[LayerId] {
        &self.layers
    }

    /// Whether the layers are already in the target collection.
    #[must_use]
    pub fn is_materialized(&self) -> bool {
        self.materialized
    }

    /// Index of the first layer after the last placement.
    #[must_use]
    pub fn target_index(&self) -> Option<usize> {
        self.target_index
    }

    #[must_use]
    pub fn compatible_with(&self, method: DropMethod) -> bool {
        self.method == method
    }

    #[must_use]
    pub fn contains(&self, id: LayerId) -> bool {
        self.layers.contains(&id)
    }

    /// Insert the copies before `before` (or at the end).
    pub fn materialize(&mut self, before: Option<LayerId>) -> Result<(), LayerError> {
        if self.materialized || self.method == DropMethod::Move {
            return Ok(());
        }
        let index = before.and_then(|id| self.target.index_of(id));
        let copies = self.target.prepare_copies(&self.templates);
        self.layers = self.target.insert_many(copies, index)?;
        self.materialized = true;
        self.record_position();
        debug!(
            target: "strata.drag",
            count = self.layers.len(),
            index = ?self.target_index,
            "copies inserted"
        );
        Ok(())
    }

    /// Bring moved layers into the target collection, appended.
    ///
    /// Between subsets of one root the target adopts the layers and the
    /// source releases them. Across roots they leave the source. Layers
    /// removed from the source meanwhile are skipped.
    pub fn transfer(&mut self) -> Result<(), LayerError> {
        if self.materialized || self.method != DropMethod::Move {
            return Ok(());
        }
        let Some(source) = self.source.clone() else {
            return Ok(());
        };
        let mut ids: Vec<LayerId> = self
            .layers
            .iter()
            .copied()
            .filter(|id| source.contains(*id))
            .collect();
        ids.sort_by_key(|id| source.index_of(*id));
        match self.origin {
            DragOrigin::SameRoot => {
                self.target.adopt(&ids);
                if !source.same_collection(&self.target) {
                    source.release(&ids);
                }
                ids.retain(|id| self.target.contains(*id));
                self.layers = ids;
            }
            DragOrigin::OtherRoot => {
                self.layers = self.target.transfer_from(&source, &ids)?;
            }
            DragOrigin::SameCollection | DragOrigin::External => {}
        }
        self.materialized = true;
        self.record_position();
        debug!(
            target: "strata.drag",
            origin = self.origin.as_str(),
            count = self.layers.len(),
            "layers transferred"
        );
        Ok(())
    }

    /// Move the layers next to `before`; see [`LayerCollection::reorder`].
    pub fn reposition(&mut self, before: Option<LayerId>) -> bool {
        let changed = self.target.reorder(&self.layers, before);
        self.record_position();
        changed
    }

    /// Undo speculative copies. Returns `true` if `drop_target` was one of
    /// the removed copies.
    pub fn rollback(&mut self, drop_target: Option<LayerId>) -> bool {
        if self.method == DropMethod::Move || !self.materialized {
            return false;
        }
        let destroyed = drop_target.is_some_and(|t| self.layers.contains(&t));
        let layers = std::mem::take(&mut self.layers);
        let removed = self.target.retain(|l| !layers.contains(&l.id()));
        self.materialized = false;
        self.target_index = None;
        debug!(target: "strata.drag", count = removed.len(), "copies rolled back");
        destroyed
    }

    /// Drop ids that vanished from the collection. Returns `false` if none
    /// remain.
    pub fn finalize(&mut self) -> bool {
        let target = &self.target;
        self.layers.retain(|id| target.contains(*id));
        self.record_position();
        !self.layers.is_empty()
    }

    fn record_position(&mut self) {
        self.target_index = self
            .layers
            .iter()
            .filter_map(|id| self.target.index_of(*id))
            .min();
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Drop-session state.
#[derive(Debug, Default)]
pub enum DropState {
    #[default]
    Idle,
    Active(DropDescriptor),
}

/// Result of a finalized drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropOutcome {
    pub method: DropMethod,
    /// Layers now at the drop position, in order.
    pub layers: Vec<LayerId>,
    /// Index of the first of them.
    pub target_index: Option<usize>,
}

/// Drop handling for one target collection.
#[derive(Debug)]
pub struct DropSession {
    target: LayerCollection,
    policy: DragPolicy,
    context: DragContext,
    state: DropState,
}

impl DropSession {
    pub fn new(target: &LayerCollection, context: &DragContext, policy: DragPolicy) -> Self {
        Self {
            target: target.clone(),
            policy,
            context: context.clone(),
            state: DropState::Idle,
        }
    }

    #[must_use]
    pub fn state(&self) -> &DropState {
        &self.state
    }

    #[must_use]
    pub fn active(&self) -> Option<&DropDescriptor> {
        match &self.state {
            DropState::Active(descriptor) => Some(descriptor),
            DropState::Idle => None,
        }
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self.state, DropState::Idle)
    }

    #[must_use]
    pub fn policy(&self) -> DragPolicy {
        self.policy
    }

    /// Pointer entered a drop target. `target` is the layer the target stands
    /// for, or `None` for "end of list". Returns whether the drop is accepted.
    pub fn drag_enter(&mut self, target: Option<LayerId>, event: &DragEvent<DragPayload>) -> bool {
        let _batch = BatchScope::new();
        self.update(target, event)
    }

    /// Pointer moved over a drop target.
    pub fn drag_over(&mut self, target: Option<LayerId>, event: &DragEvent<DragPayload>) -> bool {
        let _batch = BatchScope::new();
        self.update(target, event)
    }

    /// Pointer left the panel. Leaves into a child of the panel are ignored.
    pub fn drag_leave(&mut self, event: &DragEvent<DragPayload>) {
        if event.related_inside {
            return;
        }
        let _batch = BatchScope::new();
        self.discard("left target");
    }

    /// The gesture ended without a drop here.
    pub fn drag_end(&mut self) {
        let _batch = BatchScope::new();
        self.discard("gesture ended");
        self.context.end();
    }

    /// Finalize the drop onto `target`.
    pub fn drop(
        &mut self,
        target: Option<LayerId>,
        event: &DragEvent<DragPayload>,
    ) -> Option<DropOutcome> {
        let _batch = BatchScope::new();
        if !self.update(target, event) {
            self.state = DropState::Idle;
            return None;
        }
        let DropState::Active(mut descriptor) = std::mem::take(&mut self.state) else {
            return None;
        };

        let span = debug_span!(
            target: "strata.drag",
            "drag.drop",
            method = descriptor.method().as_str(),
            moved = tracing::field::Empty,
            target_index = tracing::field::Empty
        )
        .entered();

        let onto_self = target.is_some_and(|t| descriptor.contains(t));
        if descriptor.method() == DropMethod::Move {
            if let Err(err) = descriptor.transfer() {
                warn!(target: "strata.drag", error = %err, "move rejected");
                return None;
            }
            if !onto_self {
                descriptor.reposition(target);
            }
        }

        if !descriptor.finalize() {
            debug!(target: "strata.drag", "nothing left to drop");
            descriptor.rollback(None);
            return None;
        }

        let outcome = DropOutcome {
            method: descriptor.method(),
            layers: descriptor.layers().to_vec(),
            target_index: descriptor.target_index(),
        };
        span.record("moved", outcome.layers.len() as u64);
        if let Some(index) = outcome.target_index {
            span.record("target_index", index as u64);
        }
        debug!(target: "strata.drag", onto_self, "drop finalized");
        drop(span);
        self.context.end();
        Some(outcome)
    }

    fn discard(&mut self, reason: &'static str) {
        if let DropState::Active(mut descriptor) = std::mem::take(&mut self.state) {
            trace!(
                target: "strata.drag",
                reason,
                method = descriptor.method().as_str(),
                "descriptor discarded"
            );
            descriptor.rollback(None);
        }
    }

    fn update(&mut self, target: Option<LayerId>, event: &DragEvent<DragPayload>) -> bool {
        let payload = event.payload.clone().or_else(|| self.context.current());
        let origin = match (&payload, &self.state) {
            (Some(payload), _) => payload.origin(&self.target),
            (None, DropState::Active(descriptor)) => descriptor.origin(),
            (None, DropState::Idle) => {
                trace!(target: "strata.drag", "no drag payload");
                return false;
            }
        };
        let method = self.policy.method(event.modifiers, origin);

        if let DropState::Active(descriptor) = &mut self.state
            && !descriptor.compatible_with(method)
        {
            trace!(target: "strata.drag", method = method.as_str(), "method changed mid-drag");
            let destroyed_target = descriptor.rollback(target);
            self.state = DropState::Idle;
            if destroyed_target {
                // The layer under the pointer was one of our copies; wait for
                // the next event.
                return false;
            }
        }

        let mut fresh = false;
        if self.is_idle() {
            let Some(payload) = payload else {
                return false;
            };
            match DropDescriptor::new(&payload, &self.target, method) {
                Ok(descriptor) => {
                    fresh = descriptor.method() == DropMethod::Copy;
                    self.state = DropState::Active(descriptor);
                }
                Err(err) => {
                    trace!(target: "strata.drag", error = %err, "drop ignored");
                    return false;
                }
            }
        }

        let DropState::Active(descriptor) = &mut self.state else {
            return false;
        };
        if target.is_some_and(|t| descriptor.contains(t)) {
            return true;
        }
        if fresh {
            if let Err(err) = descriptor.materialize(target) {
                warn!(target: "strata.drag", error = %err, "copies rejected");
                self.state = DropState::Idle;
                return false;
            }
        } else if descriptor.method() == DropMethod::Copy {
            descriptor.reposition(target);
        }
        true
    }
}
