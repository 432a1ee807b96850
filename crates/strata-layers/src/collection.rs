#![forbid(unsafe_code)]

//! Ordered, name-unique layer collection.
//!
//! # Invariants
//!
//! 1. Layer names are non-empty and pairwise unique at every observable
//!    point. A mutation that would break this is rejected and leaves the
//!    collection unchanged.
//! 2. Every successful mutation emits exactly one `changed` notification and
//!    bumps [`generation`](LayerCollection::generation) by one. No-op
//!    mutations emit nothing.
//! 3. Notifications are dispatched after the internal borrow is released, so
//!    subscribers may read (and mutate) the collection.
//!
//! # Reorder tie-break
//!
//! [`reorder`](LayerCollection::reorder) removes the moved subset, then finds
//! the target among the remaining layers. If the first removed layer sat at or
//! before the target's position in the remaining list, the insertion point
//! shifts right by one, so the moved layers land *after* the target. The
//! adjustment is applied once, however many moved layers preceded the target.
//!
//! # Subsets
//!
//! [`subset`](LayerCollection::subset) creates an ordered selection of a root
//! collection's layers, as shown by a layer-group panel. A subset keeps its
//! own order and membership; the layers themselves live in the root:
//!
//! - adding through a subset adds to the root as well;
//! - renames and visibility changes go to the root and reach every subset
//!   holding the layer;
//! - removing through a subset removes the layer from the root;
//! - [`adopt`](LayerCollection::adopt) and [`release`](LayerCollection::release)
//!   change membership only.
//!
//! Names are unique across the whole root.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashSet;
use strata_runtime::config::NamingConfig;
use strata_runtime::reactive::{BatchScope, Signal, Subscription};
use tracing::{debug, trace, warn};

use crate::entity::{LayerEntity, LayerId, LayerSpec, base_name};
use crate::error::LayerError;

static NEXT_COLLECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a collection, used to tell same-origin drags from foreign ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollectionId(u64);

impl CollectionId {
    fn next() -> Self {
        Self(NEXT_COLLECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Deterministic unique name: `base`, `base (2)`, `base (3)`, ...
///
/// `suffix_start` is the first suffix tried. `taken` reports names in use.
pub fn unique_name(base: &str, suffix_start: u32, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_owned();
    }
    let mut suffix = suffix_start;
    loop {
        let candidate = format!("{base} ({suffix})");
        if !taken(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

/// Entities for `specs` with names unique against `taken` and each other.
fn restored_entities(
    specs: &[LayerSpec],
    naming: &NamingConfig,
    taken: impl Fn(&str) -> bool,
) -> Vec<LayerEntity> {
    let mut reserved: Vec<String> = Vec::with_capacity(specs.len());
    specs
        .iter()
        .map(|spec| {
            let base = if spec.name.is_empty() {
                naming.fallback_name.as_str()
            } else {
                spec.name.as_str()
            };
            let name = unique_name(base, naming.suffix_start, |n| {
                taken(n) || reserved.iter().any(|r| r == n)
            });
            reserved.push(name.clone());
            let mut entity = LayerEntity::from_spec(spec);
            entity.set_name(name);
            entity
        })
        .collect()
}

struct CollectionInner {
    id: CollectionId,
    layers: Vec<LayerEntity>,
    generation: u64,
    naming: NamingConfig,
    /// Set for subsets.
    root: Option<LayerCollection>,
    root_link: Option<Subscription>,
}

impl CollectionInner {
    fn position(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id() == id)
    }

    fn name_taken(&self, name: &str, except: Option<LayerId>) -> bool {
        self.layers
            .iter()
            .any(|l| l.name() == name && Some(l.id()) != except)
    }

    fn check_name(&self, name: &str, except: Option<LayerId>) -> Result<(), LayerError> {
        if name.is_empty() {
            return Err(LayerError::EmptyName);
        }
        if self.name_taken(name, except) {
            return Err(LayerError::DuplicateName {
                name: name.to_owned(),
            });
        }
        Ok(())
    }

    fn bump(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }
}

/// Shared handle to an ordered list of layers.
///
/// Cloning the handle does not copy the layers.
#[derive(Clone)]
pub struct LayerCollection {
    inner: Rc<RefCell<CollectionInner>>,
    changed: Signal<()>,
    removed: Signal<LayerEntity>,
}

impl fmt::Debug for LayerCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("LayerCollection")
            .field("id", &inner.id)
            .field("generation", &inner.generation)
            .field("subset", &inner.root.is_some())
            .field(
                "layers",
                &inner.layers.iter().map(LayerEntity::name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Default for LayerCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerCollection {
    /// An empty collection with default naming rules.
    #[must_use]
    pub fn new() -> Self {
        Self::with_naming(NamingConfig::default())
    }

    /// An empty collection using `naming` for generated names.
    #[must_use]
    pub fn with_naming(naming: NamingConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(CollectionInner {
                id: CollectionId::next(),
                layers: Vec::new(),
                generation: 0,
                naming,
                root: None,
                root_link: None,
            })),
            changed: Signal::new(),
            removed: Signal::new(),
        }
    }

    /// Build a collection from a snapshot.
    #[must_use]
    pub fn from_specs(specs: &[LayerSpec]) -> Self {
        let collection = Self::new();
        collection.restore(specs);
        collection
    }

    /// An empty subset of this collection's root.
    ///
    /// The subset follows changes made to the root directly: layers removed
    /// from the root leave the subset, and renames show up in it.
    #[must_use]
    pub fn subset(&self) -> Self {
        let root = self.root();
        let subset = Self {
            inner: Rc::new(RefCell::new(CollectionInner {
                id: CollectionId::next(),
                layers: Vec::new(),
                generation: 0,
                naming: root.naming(),
                root: Some(root.clone()),
                root_link: None,
            })),
            changed: Signal::new(),
            removed: Signal::new(),
        };
        let weak = Rc::downgrade(&subset.inner);
        let changed = subset.changed.clone();
        let removed = subset.removed.clone();
        let link = root.subscribe(move || {
            if let Some(inner) = weak.upgrade() {
                let handle = LayerCollection {
                    inner,
                    changed: changed.clone(),
                    removed: removed.clone(),
                };
                handle.sync_from_root();
            }
        });
        subset.inner.borrow_mut().root_link = Some(link);
        debug!(
            target: "strata.layers",
            root = root.id().get(),
            subset = subset.id().get(),
            "subset created"
        );
        subset
    }

    // -- Lookup ---------------------------------------------------------------

    #[must_use]
    pub fn id(&self) -> CollectionId {
        self.inner.borrow().id
    }

    /// Whether both handles refer to the same collection.
    #[must_use]
    pub fn same_collection(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The collection holding this one's layers: itself, unless it is a
    /// subset.
    #[must_use]
    pub fn root(&self) -> Self {
        self.parent_root().unwrap_or_else(|| self.clone())
    }

    #[must_use]
    pub fn is_subset(&self) -> bool {
        self.inner.borrow().root.is_some()
    }

    /// Whether both collections draw their layers from the same root.
    #[must_use]
    pub fn same_root(&self, other: &Self) -> bool {
        self.root().same_collection(&other.root())
    }

    fn parent_root(&self) -> Option<Self> {
        self.inner.borrow().root.clone()
    }

    /// For a subset, the root that entity updates of `id` go to.
    fn forward_target(&self, id: LayerId) -> Result<Option<Self>, LayerError> {
        let Some(root) = self.parent_root() else {
            return Ok(None);
        };
        if self.contains(id) {
            Ok(Some(root))
        } else {
            Err(LayerError::UnknownLayer(id))
        }
    }

    /// Refresh a subset's layers from its root. Returns whether anything
    /// changed; the change is notified like any other mutation.
    fn sync_from_root(&self) -> bool {
        let Some(root) = self.parent_root() else {
            return false;
        };
        let removed = {
            let mut inner = self.inner.borrow_mut();
            let mut changed = false;
            let mut removed = Vec::new();
            let layers = std::mem::take(&mut inner.layers);
            for layer in layers {
                match root.get(layer.id()) {
                    Some(current) => {
                        changed |= current != layer;
                        inner.layers.push(current);
                    }
                    None => {
                        changed = true;
                        removed.push(layer);
                    }
                }
            }
            if !changed {
                return false;
            }
            let generation = inner.bump();
            trace!(
                target: "strata.layers",
                removed = removed.len(),
                generation,
                "subset synced"
            );
            removed
        };
        self.notify(removed);
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().layers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().layers.is_empty()
    }

    /// Number of change notifications emitted so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.borrow().generation
    }

    #[must_use]
    pub fn naming(&self) -> NamingConfig {
        self.inner.borrow().naming.clone()
    }

    /// Borrow the layers in order.
    ///
    /// The closure must not mutate the collection.
    pub fn with_layers<R>(&self, f: impl FnOnce(&[LayerEntity]) -> R) -> R {
        f(&self.inner.borrow().layers)
    }

    /// Clone of every layer, in order.
    #[must_use]
    pub fn entities(&self) -> Vec<LayerEntity> {
        self.inner.borrow().layers.clone()
    }

    /// Iterate over a snapshot of the layers.
    pub fn iter(&self) -> std::vec::IntoIter<LayerEntity> {
        self.entities().into_iter()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<LayerId> {
        self.with_layers(|layers| layers.iter().map(LayerEntity::id).collect())
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.with_layers(|layers| layers.iter().map(|l| l.name().to_owned()).collect())
    }

    #[must_use]
    pub fn get(&self, id: LayerId) -> Option<LayerEntity> {
        let inner = self.inner.borrow();
        inner.position(id).map(|i| inner.layers[i].clone())
    }

    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<LayerEntity> {
        self.with_layers(|layers| layers.iter().find(|l| l.name() == name).cloned())
    }

    #[must_use]
    pub fn at(&self, index: usize) -> Option<LayerEntity> {
        self.inner.borrow().layers.get(index).cloned()
    }

    #[must_use]
    pub fn index_of(&self, id: LayerId) -> Option<usize> {
        self.inner.borrow().position(id)
    }

    #[must_use]
    pub fn contains(&self, id: LayerId) -> bool {
        self.index_of(id).is_some()
    }

    /// Whether `name` is held by a layer other than `except`.
    #[must_use]
    pub fn name_taken(&self, name: &str, except: Option<LayerId>) -> bool {
        match self.parent_root() {
            Some(root) => root.name_taken(name, except),
            None => self.inner.borrow().name_taken(name, except),
        }
    }

    // -- Notification ---------------------------------------------------------

    /// Call `f` after every change.
    pub fn subscribe(&self, f: impl Fn() + 'static) -> Subscription {
        self.changed.subscribe(move |_| f())
    }

    /// Call `f` with each layer removed from the collection.
    pub fn on_removed(&self, f: impl Fn(&LayerEntity) + 'static) -> Subscription {
        self.removed.subscribe(f)
    }

    fn notify(&self, removed: Vec<LayerEntity>) {
        for entity in &removed {
            self.removed.dispatch(entity);
        }
        self.changed.dispatch_coalesced(&());
    }

    // -- Naming ---------------------------------------------------------------

    /// `base` if unused, else `base (N)` for the first free N.
    #[must_use]
    pub fn unique_name(&self, base: &str) -> String {
        if let Some(root) = self.parent_root() {
            return root.unique_name(base);
        }
        let inner = self.inner.borrow();
        unique_name(base, inner.naming.suffix_start, |n| {
            inner.name_taken(n, None)
        })
    }

    /// Build fresh entities from `specs` with names unique against the
    /// collection and each other. Nothing is inserted.
    #[must_use]
    pub fn prepare_copies(&self, specs: &[LayerSpec]) -> Vec<LayerEntity> {
        if let Some(root) = self.parent_root() {
            return root.prepare_copies(specs);
        }
        let inner = self.inner.borrow();
        let mut reserved: Vec<String> = Vec::with_capacity(specs.len());
        specs
            .iter()
            .map(|spec| {
                let base = match base_name(&spec.name) {
                    "" => inner.naming.fallback_name.as_str(),
                    base => base,
                };
                let name = unique_name(base, inner.naming.suffix_start, |n| {
                    inner.name_taken(n, None) || reserved.iter().any(|r| r == n)
                });
                reserved.push(name.clone());
                let mut entity = LayerEntity::from_spec(spec);
                entity.set_name(name);
                entity
            })
            .collect()
    }

    // -- Mutation -------------------------------------------------------------

    /// Insert `entity` at `at` (clamped), or append.
    ///
    /// Re-adding a layer that is already present is a no-op returning its id.
    pub fn add(&self, entity: LayerEntity, at: Option<usize>) -> Result<LayerId, LayerError> {
        let id = entity.id();
        if let Some(root) = self.parent_root() {
            if self.contains(id) {
                return Ok(id);
            }
            root.add(entity, None)?;
            let entity = root.get(id).ok_or(LayerError::UnknownLayer(id))?;
            self.insert_members(vec![entity], at);
            return Ok(id);
        }
        {
            let mut inner = self.inner.borrow_mut();
            if inner.position(id).is_some() {
                return Ok(id);
            }
            if let Err(err) = inner.check_name(entity.name(), None) {
                warn!(target: "strata.layers", error = %err, "add rejected");
                return Err(err);
            }
            let index = at.map_or(inner.layers.len(), |i| i.min(inner.layers.len()));
            let name = entity.name().to_owned();
            inner.layers.insert(index, entity);
            let generation = inner.bump();
            debug!(target: "strata.layers", layer = %name, index, generation, "layer added");
        }
        self.notify(Vec::new());
        Ok(id)
    }

    /// Insert several layers at once, in order, with one notification.
    ///
    /// Either every layer is inserted or none is.
    pub fn insert_many(
        &self,
        entities: Vec<LayerEntity>,
        at: Option<usize>,
    ) -> Result<Vec<LayerId>, LayerError> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<LayerId> = entities.iter().map(LayerEntity::id).collect();
        if let Some(root) = self.parent_root() {
            let mut seen: AHashSet<LayerId> = AHashSet::with_capacity(ids.len());
            if let Some(dup) = entities
                .iter()
                .find(|e| !seen.insert(e.id()) || self.contains(e.id()))
            {
                let err = LayerError::DuplicateName {
                    name: dup.name().to_owned(),
                };
                warn!(target: "strata.layers", error = %err, "insert rejected");
                return Err(err);
            }
            let fresh: Vec<LayerEntity> = entities
                .into_iter()
                .filter(|e| !root.contains(e.id()))
                .collect();
            root.insert_many(fresh, None)?;
            let members: Vec<LayerEntity> = ids.iter().filter_map(|id| root.get(*id)).collect();
            self.insert_members(members, at);
            return Ok(ids);
        }
        {
            let mut inner = self.inner.borrow_mut();
            {
                let mut seen: AHashSet<&str> = AHashSet::with_capacity(entities.len());
                for entity in &entities {
                    let checked = inner.check_name(entity.name(), None).and_then(|()| {
                        if seen.insert(entity.name()) && inner.position(entity.id()).is_none() {
                            Ok(())
                        } else {
                            Err(LayerError::DuplicateName {
                                name: entity.name().to_owned(),
                            })
                        }
                    });
                    if let Err(err) = checked {
                        warn!(target: "strata.layers", error = %err, "insert rejected");
                        return Err(err);
                    }
                }
            }
            let index = at.map_or(inner.layers.len(), |i| i.min(inner.layers.len()));
            let count = entities.len();
            inner.layers.splice(index..index, entities);
            let generation = inner.bump();
            debug!(target: "strata.layers", index, count, generation, "layers inserted");
        }
        self.notify(Vec::new());
        Ok(ids)
    }

    /// Insert root layers into a subset's order.
    fn insert_members(&self, entities: Vec<LayerEntity>, at: Option<usize>) {
        if entities.is_empty() {
            return;
        }
        {
            let mut inner = self.inner.borrow_mut();
            let index = at.map_or(inner.layers.len(), |i| i.min(inner.layers.len()));
            let count = entities.len();
            inner.layers.splice(index..index, entities);
            let generation = inner.bump();
            debug!(target: "strata.layers", index, count, generation, "subset members added");
        }
        self.notify(Vec::new());
    }

    /// Add layers of the root to this subset, appended in the given order.
    ///
    /// Layers already here, or no longer in the root, are skipped. On a root
    /// collection this does nothing. Returns the ids added.
    pub fn adopt(&self, ids: &[LayerId]) -> Vec<LayerId> {
        let Some(root) = self.parent_root() else {
            return Vec::new();
        };
        let mut seen: AHashSet<LayerId> = AHashSet::with_capacity(ids.len());
        let members: Vec<LayerEntity> = ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id) && !self.contains(*id))
            .filter_map(|id| root.get(id))
            .collect();
        let adopted: Vec<LayerId> = members.iter().map(LayerEntity::id).collect();
        self.insert_members(members, None);
        adopted
    }

    /// Drop layers from this subset, leaving them in the root. On a root
    /// collection this does nothing. Returns the layers dropped.
    pub fn release(&self, ids: &[LayerId]) -> Vec<LayerEntity> {
        if !self.is_subset() {
            return Vec::new();
        }
        let removed = {
            let mut inner = self.inner.borrow_mut();
            let (kept, removed): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.layers)
                .into_iter()
                .partition(|l| !ids.contains(&l.id()));
            inner.layers = kept;
            if removed.is_empty() {
                return removed;
            }
            let generation = inner.bump();
            debug!(
                target: "strata.layers",
                count = removed.len(),
                generation,
                "subset members released"
            );
            removed
        };
        self.notify(removed.clone());
        removed
    }

    /// Move layers out of `source`, a collection under another root, and
    /// append them here.
    ///
    /// Layers keep their identity. A name already used under this root is
    /// made unique. Returns the ids moved, in source order; nothing moves
    /// when both collections share a root.
    pub fn transfer_from(
        &self,
        source: &Self,
        ids: &[LayerId],
    ) -> Result<Vec<LayerId>, LayerError> {
        if self.same_root(source) {
            return Ok(Vec::new());
        }
        let root = self.root();
        let wanted: AHashSet<LayerId> = ids.iter().copied().collect();
        let entities: Vec<LayerEntity> = source.with_layers(|layers| {
            layers
                .iter()
                .filter(|l| wanted.contains(&l.id()) && !root.contains(l.id()))
                .cloned()
                .collect()
        });
        let entities = root.with_unique_names(entities);
        let moved = self.insert_many(entities, None)?;
        let gone: AHashSet<LayerId> = moved.iter().copied().collect();
        source.retain(|l| !gone.contains(&l.id()));
        debug!(target: "strata.layers", count = moved.len(), "layers transferred");
        Ok(moved)
    }

    /// Rename `entities` where needed so their names are free here and
    /// distinct from each other. Identity is kept.
    fn with_unique_names(&self, entities: Vec<LayerEntity>) -> Vec<LayerEntity> {
        let inner = self.inner.borrow();
        let mut reserved: Vec<String> = Vec::with_capacity(entities.len());
        entities
            .into_iter()
            .map(|mut entity| {
                let taken =
                    |n: &str| inner.name_taken(n, None) || reserved.iter().any(|r| r == n);
                if taken(entity.name()) {
                    let base = match base_name(entity.name()) {
                        "" => inner.naming.fallback_name.as_str(),
                        base => base,
                    };
                    let name = unique_name(base, inner.naming.suffix_start, taken);
                    entity.set_name(name);
                }
                reserved.push(entity.name().to_owned());
                entity
            })
            .collect()
    }

    /// Remove a layer. No-op (returning `None`) if absent.
    pub fn remove(&self, id: LayerId) -> Option<LayerEntity> {
        if let Some(root) = self.parent_root() {
            if !self.contains(id) {
                return None;
            }
            let removed = root.remove(id);
            self.sync_from_root();
            return removed;
        }
        let removed = {
            let mut inner = self.inner.borrow_mut();
            let index = inner.position(id)?;
            let entity = inner.layers.remove(index);
            let generation = inner.bump();
            debug!(
                target: "strata.layers",
                layer = entity.name(),
                index,
                generation,
                "layer removed"
            );
            entity
        };
        self.notify(vec![removed.clone()]);
        Some(removed)
    }

    /// Remove every layer for which `keep` returns false, with one
    /// notification. Returns the removed layers in their former order.
    pub fn retain(&self, mut keep: impl FnMut(&LayerEntity) -> bool) -> Vec<LayerEntity> {
        if let Some(root) = self.parent_root() {
            let doomed: AHashSet<LayerId> = self.with_layers(|layers| {
                layers
                    .iter()
                    .filter(|l| !keep(l))
                    .map(LayerEntity::id)
                    .collect()
            });
            if doomed.is_empty() {
                return Vec::new();
            }
            let mut pred = |l: &LayerEntity| !doomed.contains(&l.id());
            let removed = root.retain(&mut pred as &mut dyn FnMut(&LayerEntity) -> bool);
            self.sync_from_root();
            return removed;
        }
        let removed = {
            let mut inner = self.inner.borrow_mut();
            let (kept, removed): (Vec<_>, Vec<_>) =
                std::mem::take(&mut inner.layers).into_iter().partition(|l| keep(l));
            inner.layers = kept;
            if removed.is_empty() {
                return removed;
            }
            let generation = inner.bump();
            debug!(target: "strata.layers", count = removed.len(), generation, "layers removed");
            removed
        };
        self.notify(removed.clone());
        removed
    }

    /// Remove every layer.
    pub fn clear(&self) -> Vec<LayerEntity> {
        self.retain(|_| false)
    }

    /// Rename a layer. Renaming to its current name succeeds silently.
    pub fn rename(&self, id: LayerId, new_name: &str) -> Result<(), LayerError> {
        if let Some(root) = self.forward_target(id)? {
            root.rename(id, new_name)?;
            self.sync_from_root();
            return Ok(());
        }
        {
            let mut inner = self.inner.borrow_mut();
            let index = inner.position(id).ok_or(LayerError::UnknownLayer(id))?;
            if inner.layers[index].name() == new_name {
                return Ok(());
            }
            if let Err(err) = inner.check_name(new_name, Some(id)) {
                warn!(target: "strata.layers", error = %err, "rename rejected");
                return Err(err);
            }
            inner.layers[index].set_name(new_name.to_owned());
            let generation = inner.bump();
            debug!(target: "strata.layers", layer = new_name, index, generation, "layer renamed");
        }
        self.notify(Vec::new());
        Ok(())
    }

    fn update_entity(
        &self,
        id: LayerId,
        f: impl FnOnce(&mut LayerEntity) -> bool,
    ) -> Result<(), LayerError> {
        if let Some(root) = self.forward_target(id)? {
            root.update_entity(id, f)?;
            self.sync_from_root();
            return Ok(());
        }
        let changed = {
            let mut inner = self.inner.borrow_mut();
            let index = inner.position(id).ok_or(LayerError::UnknownLayer(id))?;
            let changed = f(&mut inner.layers[index]);
            if changed {
                inner.bump();
            }
            changed
        };
        if changed {
            self.notify(Vec::new());
        }
        Ok(())
    }

    pub fn set_visible(&self, id: LayerId, visible: bool) -> Result<(), LayerError> {
        self.update_entity(id, |layer| {
            let changed = layer.visible() != visible;
            layer.set_visible(visible);
            changed
        })
    }

    /// Flip visibility; returns the new value.
    pub fn toggle_visible(&self, id: LayerId) -> Result<bool, LayerError> {
        let mut now = false;
        self.update_entity(id, |layer| {
            now = !layer.visible();
            layer.set_visible(now);
            true
        })?;
        Ok(now)
    }

    pub fn set_archived(&self, id: LayerId, archived: bool) -> Result<(), LayerError> {
        self.update_entity(id, |layer| {
            let changed = layer.archived() != archived;
            layer.set_archived(archived);
            changed
        })
    }

    /// Move `moved` (keeping their relative order) next to `target`.
    ///
    /// With a target, see the module docs for where the layers land. Without
    /// one, or if the target is no longer present, they go to the end. Ids
    /// not in the collection are skipped. Dropping onto a member of `moved`
    /// is a no-op.
    ///
    /// Returns `true` (and notifies once) only if the order changed.
    pub fn reorder(&self, moved: &[LayerId], target: Option<LayerId>) -> bool {
        let moved: AHashSet<LayerId> = moved.iter().copied().collect();
        if target.is_some_and(|t| moved.contains(&t)) {
            return false;
        }
        {
            let mut inner = self.inner.borrow_mut();
            let before: Vec<LayerId> = inner.layers.iter().map(LayerEntity::id).collect();

            let mut first_removal = usize::MAX;
            let mut taken = Vec::new();
            let mut remaining = Vec::with_capacity(inner.layers.len());
            for (index, layer) in std::mem::take(&mut inner.layers).into_iter().enumerate() {
                if moved.contains(&layer.id()) {
                    first_removal = first_removal.min(index);
                    taken.push(layer);
                } else {
                    remaining.push(layer);
                }
            }

            let target_index = target.and_then(|t| remaining.iter().position(|l| l.id() == t));
            let new_index = match target_index {
                Some(index) if first_removal <= index => index + 1,
                Some(index) => index,
                None => remaining.len(),
            };
            let count = taken.len();
            remaining.splice(new_index..new_index, taken);
            inner.layers = remaining;

            let unchanged = inner
                .layers
                .iter()
                .map(LayerEntity::id)
                .eq(before.iter().copied());
            if unchanged {
                return false;
            }
            let generation = inner.bump();
            debug!(
                target: "strata.layers",
                count,
                index = new_index,
                generation,
                "layers reordered"
            );
        }
        self.notify(Vec::new());
        true
    }

    /// [`reorder`](Self::reorder) onto whichever layer currently sits at
    /// `index`; past the end means "append".
    pub fn reorder_to_index(&self, moved: &[LayerId], index: usize) -> bool {
        let target = self.at(index).map(|l| l.id());
        self.reorder(moved, target)
    }

    // -- Snapshot -------------------------------------------------------------

    /// Ordered `{name, locator, visible}` records.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LayerSpec> {
        self.with_layers(|layers| layers.iter().map(LayerEntity::to_spec).collect())
    }

    /// Replace every layer with ones built from `specs`, with one change
    /// notification. Colliding or empty names are made unique.
    ///
    /// On a subset the old members are removed from the root and the new
    /// layers are added to it.
    pub fn restore(&self, specs: &[LayerSpec]) -> Vec<LayerId> {
        if let Some(root) = self.parent_root() {
            return self.restore_subset(&root, specs);
        }
        let (removed, ids) = {
            let mut inner = self.inner.borrow_mut();
            let removed = std::mem::take(&mut inner.layers);
            let naming = inner.naming.clone();
            inner.layers = restored_entities(specs, &naming, |_| false);
            let ids: Vec<LayerId> = inner.layers.iter().map(LayerEntity::id).collect();
            let generation = inner.bump();
            debug!(target: "strata.layers", count = ids.len(), generation, "collection restored");
            (removed, ids)
        };
        self.notify(removed);
        ids
    }

    fn restore_subset(&self, root: &Self, specs: &[LayerSpec]) -> Vec<LayerId> {
        let _batch = BatchScope::new();
        let old: AHashSet<LayerId> = self.ids().into_iter().collect();
        root.retain(|l| !old.contains(&l.id()));
        let entities = restored_entities(specs, &root.naming(), |n| root.name_taken(n, None));
        let ids: Vec<LayerId> = entities.iter().map(LayerEntity::id).collect();
        let members: Vec<LayerEntity> = match root.insert_many(entities, None) {
            Ok(_) => ids.iter().filter_map(|id| root.get(*id)).collect(),
            Err(err) => {
                warn!(target: "strata.layers", error = %err, "subset restore rejected");
                Vec::new()
            }
        };
        let (removed, ids) = {
            let mut inner = self.inner.borrow_mut();
            let ids: Vec<LayerId> = members.iter().map(LayerEntity::id).collect();
            let removed = std::mem::replace(&mut inner.layers, members);
            let generation = inner.bump();
            debug!(target: "strata.layers", count = ids.len(), generation, "subset restored");
            (removed, ids)
        };
        self.notify(removed);
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn names(c: &LayerCollection) -> Vec<String> {
        c.names()
    }

    fn collection(names: &[&str]) -> (LayerCollection, Vec<LayerId>) {
        let c = LayerCollection::new();
        let ids = names
            .iter()
            .map(|n| c.add(LayerEntity::new(*n), None).unwrap())
            .collect();
        (c, ids)
    }

    fn counter(c: &LayerCollection) -> (Rc<Cell<u32>>, Subscription) {
        let count = Rc::new(Cell::new(0));
        let sink = Rc::clone(&count);
        let sub = c.subscribe(move || sink.set(sink.get() + 1));
        (count, sub)
    }

    #[test]
    fn add_appends_and_inserts() {
        let (c, _) = collection(&["a", "b"]);
        c.add(LayerEntity::new("c"), Some(1)).unwrap();
        c.add(LayerEntity::new("d"), Some(99)).unwrap();
        assert_eq!(names(&c), ["a", "c", "b", "d"]);
    }

    #[test]
    fn add_rejects_duplicate_and_empty() {
        let (c, _) = collection(&["a"]);
        let (count, _sub) = counter(&c);
        assert_eq!(
            c.add(LayerEntity::new("a"), None),
            Err(LayerError::DuplicateName { name: "a".into() })
        );
        assert_eq!(c.add(LayerEntity::new(""), None), Err(LayerError::EmptyName));
        assert_eq!(c.len(), 1);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn re_adding_same_entity_is_noop() {
        let c = LayerCollection::new();
        let entity = LayerEntity::new("a");
        let id = c.add(entity.clone(), None).unwrap();
        let generation = c.generation();
        assert_eq!(c.add(entity, None), Ok(id));
        assert_eq!(c.len(), 1);
        assert_eq!(c.generation(), generation);
    }

    #[test]
    fn each_mutation_notifies_once() {
        let (c, ids) = collection(&["a", "b", "c"]);
        let (count, _sub) = counter(&c);
        c.rename(ids[0], "z").unwrap();
        c.remove(ids[1]);
        c.set_visible(ids[2], false).unwrap();
        c.reorder(&[ids[2]], Some(ids[0]));
        assert_eq!(count.get(), 4);
        assert_eq!(c.generation(), 3 + 4);
    }

    #[test]
    fn remove_absent_is_noop() {
        let (c, ids) = collection(&["a"]);
        c.remove(ids[0]);
        let (count, _sub) = counter(&c);
        assert!(c.remove(ids[0]).is_none());
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn removal_hook_sees_removed_layer() {
        let (c, ids) = collection(&["a", "b"]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = c.on_removed(move |l| sink.borrow_mut().push(l.name().to_owned()));
        c.remove(ids[1]);
        c.clear();
        assert_eq!(*seen.borrow(), ["b", "a"]);
    }

    #[test]
    fn rename_rules() {
        let (c, ids) = collection(&["a", "b"]);
        let (count, _sub) = counter(&c);
        assert_eq!(c.rename(ids[0], "a"), Ok(()));
        assert_eq!(count.get(), 0);
        assert_eq!(
            c.rename(ids[0], "b"),
            Err(LayerError::DuplicateName { name: "b".into() })
        );
        assert_eq!(c.rename(ids[0], ""), Err(LayerError::EmptyName));
        let ghost = LayerId::next();
        assert_eq!(c.rename(ghost, "x"), Err(LayerError::UnknownLayer(ghost)));
        assert_eq!(names(&c), ["a", "b"]);
    }

    #[test]
    fn unique_name_counts_up() {
        let (c, _) = collection(&["sample", "sample (2)"]);
        assert_eq!(c.unique_name("sample"), "sample (3)");
        assert_eq!(c.unique_name("other"), "other");
    }

    #[test]
    fn unique_name_respects_suffix_start() {
        let c = LayerCollection::with_naming(NamingConfig {
            suffix_start: 5,
            ..NamingConfig::default()
        });
        c.add(LayerEntity::new("x"), None).unwrap();
        assert_eq!(c.unique_name("x"), "x (5)");
    }

    #[test]
    fn prepare_copies_strips_suffix_and_reserves() {
        let (c, _) = collection(&["img", "img (2)"]);
        let copies = c.prepare_copies(&[
            LayerSpec::new("img (2)", None),
            LayerSpec::new("img", None),
        ]);
        let names: Vec<_> = copies.iter().map(LayerEntity::name).collect();
        assert_eq!(names, ["img (3)", "img (4)"]);
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn reorder_tie_break_moves_after_lower_target() {
        let (c, ids) = collection(&["a", "b", "c", "d"]);
        assert!(c.reorder(&[ids[0]], Some(ids[2])));
        assert_eq!(names(&c), ["b", "c", "a", "d"]);
    }

    #[test]
    fn reorder_before_higher_target() {
        let (c, ids) = collection(&["a", "b", "c", "d"]);
        assert!(c.reorder(&[ids[3]], Some(ids[1])));
        assert_eq!(names(&c), ["a", "d", "b", "c"]);
    }

    #[test]
    fn reorder_multi_adjusts_once() {
        let (c, ids) = collection(&["a", "b", "c", "d", "e"]);
        // Remaining [b, d, e]; d at 1; first removal 0 <= 1 -> insert at 2.
        assert!(c.reorder(&[ids[0], ids[2]], Some(ids[3])));
        assert_eq!(names(&c), ["b", "d", "a", "c", "e"]);
    }

    #[test]
    fn reorder_without_target_appends() {
        let (c, ids) = collection(&["a", "b", "c"]);
        assert!(c.reorder(&[ids[0]], None));
        assert_eq!(names(&c), ["b", "c", "a"]);
    }

    #[test]
    fn reorder_onto_self_is_noop() {
        let (c, ids) = collection(&["a", "b", "c"]);
        let (count, _sub) = counter(&c);
        assert!(!c.reorder(&[ids[1]], Some(ids[1])));
        assert!(!c.reorder(&[ids[2]], None));
        assert_eq!(names(&c), ["a", "b", "c"]);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn reorder_skips_absent_layers() {
        let (c, ids) = collection(&["a", "b", "c"]);
        c.remove(ids[0]);
        assert!(c.reorder(&[ids[0], ids[1]], None));
        assert_eq!(names(&c), ["c", "b"]);
    }

    #[test]
    fn reorder_to_index_targets_current_occupant() {
        let (c, ids) = collection(&["a", "b", "c"]);
        assert!(c.reorder_to_index(&[ids[2]], 0));
        assert_eq!(names(&c), ["c", "a", "b"]);
        assert!(c.reorder_to_index(&[ids[2]], 10));
        assert_eq!(names(&c), ["a", "b", "c"]);
    }

    #[test]
    fn insert_many_is_atomic() {
        let (c, _) = collection(&["a"]);
        let err = c
            .insert_many(vec![LayerEntity::new("x"), LayerEntity::new("a")], Some(0))
            .unwrap_err();
        assert_eq!(err, LayerError::DuplicateName { name: "a".into() });
        let err = c
            .insert_many(vec![LayerEntity::new("y"), LayerEntity::new("y")], None)
            .unwrap_err();
        assert_eq!(err, LayerError::DuplicateName { name: "y".into() });
        assert_eq!(names(&c), ["a"]);

        let (count, _sub) = counter(&c);
        c.insert_many(vec![LayerEntity::new("x"), LayerEntity::new("y")], Some(0))
            .unwrap();
        assert_eq!(names(&c), ["x", "y", "a"]);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn retain_notifies_once() {
        let (c, _) = collection(&["a", "b", "c"]);
        let (count, _sub) = counter(&c);
        let removed = c.retain(|l| l.name() == "b");
        assert_eq!(removed.len(), 2);
        assert_eq!(names(&c), ["b"]);
        assert_eq!(count.get(), 1);
        assert!(c.retain(|_| true).is_empty());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn toggle_and_archive() {
        let (c, ids) = collection(&["a"]);
        assert_eq!(c.toggle_visible(ids[0]), Ok(false));
        assert_eq!(c.toggle_visible(ids[0]), Ok(true));
        c.set_archived(ids[0], true).unwrap();
        assert!(c.get(ids[0]).unwrap().archived());
        let (count, _sub) = counter(&c);
        c.set_archived(ids[0], true).unwrap();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn snapshot_restore_round_trip() {
        let c = LayerCollection::new();
        c.add(
            LayerEntity::new("img").with_locator("precomputed://gs://b/img"),
            None,
        )
        .unwrap();
        c.add(LayerEntity::new("seg").with_visible(false), None)
            .unwrap();
        let snapshot = c.snapshot();

        let restored = LayerCollection::from_specs(&snapshot);
        assert_eq!(restored.snapshot(), snapshot);
        assert_ne!(restored.ids(), c.ids());
    }

    #[test]
    fn restore_makes_names_unique() {
        let c = LayerCollection::new();
        c.restore(&[
            LayerSpec::new("a", None),
            LayerSpec::new("a", None),
            LayerSpec::new("", None),
        ]);
        assert_eq!(names(&c), ["a", "a (2)", "layer"]);
    }

    #[test]
    fn subset_adds_reach_the_root() {
        let (root, ids) = collection(&["a", "b"]);
        let group = root.subset();
        assert!(group.is_subset());
        assert!(group.same_root(&root));
        assert!(group.is_empty());

        let c = group.add(LayerEntity::new("c"), None).unwrap();
        assert_eq!(group.add(root.get(ids[1]).unwrap(), Some(0)), Ok(ids[1]));
        assert_eq!(names(&group), ["b", "c"]);
        assert_eq!(names(&root), ["a", "b", "c"]);
        assert!(root.contains(c));

        // Names are unique across the root.
        assert_eq!(
            group.add(LayerEntity::new("a"), None),
            Err(LayerError::DuplicateName { name: "a".into() })
        );
        assert_eq!(group.unique_name("a"), "a (2)");
    }

    #[test]
    fn subset_follows_root_changes() {
        let (root, ids) = collection(&["a", "b", "c"]);
        let group = root.subset();
        group.adopt(&[ids[2], ids[0]]);
        assert_eq!(names(&group), ["c", "a"]);
        let (count, _sub) = counter(&group);

        root.rename(ids[0], "z").unwrap();
        assert_eq!(names(&group), ["c", "z"]);
        root.rename(ids[1], "y").unwrap();
        root.remove(ids[2]);
        assert_eq!(names(&group), ["z"]);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn subset_updates_go_through_the_root() {
        let (root, ids) = collection(&["a", "b"]);
        let group = root.subset();
        group.adopt(&[ids[0]]);
        let (count, _sub) = counter(&group);

        group.rename(ids[0], "x").unwrap();
        assert_eq!(root.get(ids[0]).unwrap().name(), "x");
        assert_eq!(group.toggle_visible(ids[0]), Ok(false));
        assert!(!root.get(ids[0]).unwrap().visible());
        assert_eq!(count.get(), 2);
        assert_eq!(group.rename(ids[1], "y"), Err(LayerError::UnknownLayer(ids[1])));

        group.remove(ids[0]);
        assert!(group.is_empty());
        assert_eq!(names(&root), ["b"]);
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn release_keeps_layer_in_root() {
        let (root, ids) = collection(&["a", "b"]);
        let group = root.subset();
        group.adopt(&ids);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = group.on_removed(move |l| sink.borrow_mut().push(l.name().to_owned()));

        assert_eq!(group.release(&[ids[0]]).len(), 1);
        assert_eq!(names(&group), ["b"]);
        assert_eq!(names(&root), ["a", "b"]);
        assert_eq!(*seen.borrow(), ["a"]);
        assert!(root.release(&[ids[0]]).is_empty());
        assert!(root.adopt(&[ids[0]]).is_empty());
    }

    #[test]
    fn subset_of_subset_shares_the_root() {
        let (root, _) = collection(&["a"]);
        let nested = root.subset().subset();
        assert!(nested.root().same_collection(&root));
    }

    #[test]
    fn transfer_moves_between_roots() {
        let (left, left_ids) = collection(&["img", "seg"]);
        let (right, _) = collection(&["img"]);
        let moved = right.transfer_from(&left, &[left_ids[1], left_ids[0]]).unwrap();
        assert_eq!(moved, left_ids);
        assert_eq!(names(&left), Vec::<String>::new());
        assert_eq!(names(&right), ["img", "img (2)", "seg"]);

        let group = right.subset();
        assert!(group.transfer_from(&right, &moved).unwrap().is_empty());
    }

    #[test]
    fn subset_restore_replaces_members_in_root() {
        let (root, ids) = collection(&["keep", "old"]);
        let group = root.subset();
        group.adopt(&[ids[1]]);
        let (count, _sub) = counter(&group);

        group.restore(&[LayerSpec::new("keep", None), LayerSpec::new("new", None)]);
        assert_eq!(names(&group), ["keep (2)", "new"]);
        assert_eq!(names(&root), ["keep", "keep (2)", "new"]);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn subscriber_may_read_collection() {
        let (c, _) = collection(&["a"]);
        let seen = Rc::new(Cell::new(0));
        let sink = Rc::clone(&seen);
        let handle = c.clone();
        let _sub = c.subscribe(move || sink.set(handle.len()));
        c.add(LayerEntity::new("b"), None).unwrap();
        assert_eq!(seen.get(), 2);
    }
}
