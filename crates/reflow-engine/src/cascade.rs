//! Cascade execution over the association graph.
//!
//! Each top-level operation walks from its root entity and applies the same
//! action to every reachable associated entity exactly once. Traversal is an
//! explicit chain of boxed continuations rather than plain recursion-depth
//! bookkeeping: every step awaits its sub-steps, so a cascade never reports
//! completion while any part of it is still in flight, and a per-call
//! visited set keyed by allocation identity short-circuits cycles.

use crate::collection::TrackedCollection;
use crate::queue::ActionOp;
use crate::state::{EntityState, classify};
use crate::{CollectionKey, EntityEntry, EntityKey, EntityStatus, Session};
use asupersync::{Cx, Outcome};
use reflow_core::{
    Association, AssociationTarget, Backend, CascadeTypes, EntityRef, Error, IdGenerationKind,
    IdStrategy, InstanceId, StateTransitionKind, Value,
};
use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::Arc;

/// The actions that propagate across cascadable associations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeAction {
    Persist,
    Merge,
    Delete,
    Refresh,
    Lock,
}

impl CascadeAction {
    /// Whether an association's mapping lets this action cross it.
    #[must_use]
    pub fn applies_to(self, cascades: &CascadeTypes) -> bool {
        match self {
            CascadeAction::Persist => cascades.persist,
            CascadeAction::Merge => cascades.merge,
            CascadeAction::Delete => cascades.delete,
            CascadeAction::Refresh => cascades.refresh,
            CascadeAction::Lock => cascades.lock,
        }
    }

    /// Whether cascading must force a lazy collection to load. Deleting an
    /// owner has to reach children the collection never fetched, or their
    /// rows would be orphaned.
    #[must_use]
    pub fn requires_initialization(self) -> bool {
        matches!(self, CascadeAction::Delete)
    }

    fn as_str(self) -> &'static str {
        match self {
            CascadeAction::Persist => "persist",
            CascadeAction::Merge => "merge",
            CascadeAction::Delete => "delete",
            CascadeAction::Refresh => "refresh",
            CascadeAction::Lock => "lock",
        }
    }
}

/// Per-call traversal state: the visited set and the source-to-managed copy
/// map. Created at the top-level entry point, discarded when it returns;
/// never shared between calls.
#[derive(Default)]
pub struct CascadeContext {
    visited: HashSet<InstanceId>,
    copies: HashMap<InstanceId, EntityRef>,
}

impl CascadeContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a visit. Returns `true` on first visit, `false` when the
    /// instance was already reached in this call.
    pub(crate) fn add(&mut self, entity: &EntityRef) -> bool {
        self.visited.insert(InstanceId::of(entity))
    }

    /// Map a source instance to its managed counterpart.
    pub(crate) fn record_copy(&mut self, source: &EntityRef, managed: EntityRef) {
        self.copies.insert(InstanceId::of(source), managed);
    }

    /// Look up the managed counterpart of a source instance.
    #[must_use]
    pub fn copy_of(&self, source: &EntityRef) -> Option<EntityRef> {
        self.copies.get(&InstanceId::of(source)).cloned()
    }

    /// Number of instances visited so far.
    #[must_use]
    pub fn visited_len(&self) -> usize {
        self.visited.len()
    }
}

/// How a newly tracked owner's collections are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CollectionSchedule {
    /// New owner: write the full contents.
    Recreate,
    /// Deleted owner: drop all rows.
    Remove,
    /// Track only; the dirty sweep decides later.
    TrackOnly,
}

type BoxOutcome<'a> = Pin<Box<dyn Future<Output = Outcome<(), Error>> + Send + 'a>>;

impl<B: Backend> Session<B> {
    pub(crate) fn dispatch_node<'a>(
        &'a mut self,
        cx: &'a Cx,
        action: CascadeAction,
        entity: EntityRef,
        ctx: &'a mut CascadeContext,
    ) -> BoxOutcome<'a> {
        match action {
            CascadeAction::Persist => self.persist_node(cx, entity, ctx),
            CascadeAction::Merge => self.merge_node(cx, entity, ctx),
            CascadeAction::Delete => self.delete_node(cx, entity, ctx),
            CascadeAction::Refresh => self.refresh_node(cx, entity, ctx),
            CascadeAction::Lock => self.lock_node(cx, entity, ctx),
        }
    }

    /// Handle one node of a persist cascade.
    pub(crate) fn persist_node<'a>(
        &'a mut self,
        cx: &'a Cx,
        entity: EntityRef,
        ctx: &'a mut CascadeContext,
    ) -> BoxOutcome<'a> {
        Box::pin(async move {
            let (name, mut id) = {
                let guard = entity.read().expect("lock poisoned");
                (guard.entity_name(), guard.id())
            };
            let Some(descriptor) = self.entities.get(name).copied() else {
                return Outcome::Err(Error::assertion(format!(
                    "no descriptor registered for entity {name}"
                )));
            };

            let mut status = self.status_for(name, id.as_ref());
            let mut state = classify(
                status,
                id.as_ref(),
                descriptor.id_strategy.allows_placeholder_id(),
                true,
            );

            if state == EntityState::Detached {
                // A borrowed identifier may have been stamped by the caller
                // even though the instance was never persisted. Clearing it
                // and classifying once more tells the two cases apart.
                if let IdStrategy::Foreign {
                    reclassify_detached: true,
                } = descriptor.id_strategy
                {
                    tracing::debug!(
                        entity = name,
                        "clearing identifier for foreign-strategy re-classification"
                    );
                    entity.write().expect("lock poisoned").set_id(None);
                    id = None;
                    status = None;
                    state = classify(
                        status,
                        None,
                        descriptor.id_strategy.allows_placeholder_id(),
                        true,
                    );
                }
            }

            match state {
                EntityState::Detached => Outcome::Err(Error::state_transition(
                    StateTransitionKind::DetachedPassedToPersist,
                    name,
                    "detached entity passed to persist",
                )),
                EntityState::Persistent => {
                    tracing::trace!(entity = name, "ignoring persistent instance");
                    if ctx.add(&entity) {
                        ctx.record_copy(&entity, Arc::clone(&entity));
                        self.cascade_all(cx, CascadeAction::Persist, &entity, ctx).await
                    } else {
                        Outcome::Ok(())
                    }
                }
                EntityState::Transient => {
                    if ctx.add(&entity) {
                        ctx.record_copy(&entity, Arc::clone(&entity));
                        self.save_transient(cx, entity, CascadeAction::Persist, ctx).await
                    } else {
                        Outcome::Ok(())
                    }
                }
                EntityState::Deleted => {
                    // Persisting an instance whose delete is still pending
                    // resurrects it: cancel the delete, re-manage the entry,
                    // and continue as a cascade-only pass.
                    let Some(idv) = id else {
                        return Outcome::Err(Error::assertion(
                            "deleted entry without identifier",
                        ));
                    };
                    let key = EntityKey::new(name, &idv);
                    tracing::debug!(entity = name, id = %idv, "un-scheduling entity deletion");
                    self.queue.unschedule_delete(&key);
                    if let Some(entry) = self.entries.get_mut(&key) {
                        entry.status = EntityStatus::Managed;
                    }
                    if ctx.add(&entity) {
                        ctx.record_copy(&entity, Arc::clone(&entity));
                        self.cascade_all(cx, CascadeAction::Persist, &entity, ctx).await
                    } else {
                        Outcome::Ok(())
                    }
                }
            }
        })
    }

    /// Handle one node of a merge cascade.
    pub(crate) fn merge_node<'a>(
        &'a mut self,
        cx: &'a Cx,
        entity: EntityRef,
        ctx: &'a mut CascadeContext,
    ) -> BoxOutcome<'a> {
        Box::pin(async move {
            let (name, id) = {
                let guard = entity.read().expect("lock poisoned");
                (guard.entity_name(), guard.id())
            };
            let Some(descriptor) = self.entities.get(name).copied() else {
                return Outcome::Err(Error::assertion(format!(
                    "no descriptor registered for entity {name}"
                )));
            };

            let status = self.status_for(name, id.as_ref());
            let state = classify(
                status,
                id.as_ref(),
                descriptor.id_strategy.allows_placeholder_id(),
                true,
            );

            match state {
                EntityState::Deleted => Outcome::Err(Error::state_transition(
                    StateTransitionKind::DeletedPassedToMerge,
                    name,
                    "instance scheduled for deletion passed to merge",
                )),
                EntityState::Transient => {
                    if ctx.add(&entity) {
                        ctx.record_copy(&entity, Arc::clone(&entity));
                        self.save_transient(cx, entity, CascadeAction::Merge, ctx).await
                    } else {
                        Outcome::Ok(())
                    }
                }
                EntityState::Persistent => {
                    if ctx.add(&entity) {
                        ctx.record_copy(&entity, Arc::clone(&entity));
                        self.cascade_all(cx, CascadeAction::Merge, &entity, ctx).await
                    } else {
                        Outcome::Ok(())
                    }
                }
                EntityState::Detached => {
                    // No select service at this layer: the detached state
                    // becomes the managed copy and a full-state update is
                    // scheduled.
                    if !ctx.add(&entity) {
                        return Outcome::Ok(());
                    }
                    ctx.record_copy(&entity, Arc::clone(&entity));
                    let Some(idv) = id else {
                        return Outcome::Err(Error::assertion(
                            "detached classification without identifier",
                        ));
                    };
                    tracing::trace!(entity = name, id = %idv, "merging detached instance");
                    let (assocs, current) = {
                        let guard = entity.read().expect("lock poisoned");
                        (guard.associations(), guard.state())
                    };
                    let key = EntityKey::new(name, &idv);
                    self.entries.insert(
                        key,
                        EntityEntry {
                            status: EntityStatus::Managed,
                            entity_name: name,
                            id: idv.clone(),
                            loaded_state: Some(current),
                            expired: false,
                            entity: Arc::clone(&entity),
                        },
                    );
                    self.queue.push(ActionOp::EntityUpdate { key });
                    self.track_owned_collections(&idv, &assocs, CollectionSchedule::TrackOnly);

                    for assoc in &assocs {
                        if !CascadeAction::Merge.applies_to(&assoc.info.cascades) {
                            continue;
                        }
                        match self
                            .cascade_into(cx, CascadeAction::Merge, assoc, Some(&idv), ctx)
                            .await
                        {
                            Outcome::Ok(()) => {}
                            Outcome::Err(e) => return Outcome::Err(e),
                            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                            Outcome::Panicked(p) => return Outcome::Panicked(p),
                        }
                    }
                    Outcome::Ok(())
                }
            }
        })
    }

    /// Handle one node of a delete cascade.
    pub(crate) fn delete_node<'a>(
        &'a mut self,
        cx: &'a Cx,
        entity: EntityRef,
        ctx: &'a mut CascadeContext,
    ) -> BoxOutcome<'a> {
        Box::pin(async move {
            let (name, id) = {
                let guard = entity.read().expect("lock poisoned");
                (guard.entity_name(), guard.id())
            };
            let Some(descriptor) = self.entities.get(name).copied() else {
                return Outcome::Err(Error::assertion(format!(
                    "no descriptor registered for entity {name}"
                )));
            };

            let status = self.status_for(name, id.as_ref());
            let state = classify(
                status,
                id.as_ref(),
                descriptor.id_strategy.allows_placeholder_id(),
                true,
            );

            match state {
                EntityState::Deleted => Outcome::Ok(()),
                EntityState::Transient => {
                    // Nothing to delete, but the cascade still propagates.
                    if ctx.add(&entity) {
                        self.cascade_all(cx, CascadeAction::Delete, &entity, ctx).await
                    } else {
                        Outcome::Ok(())
                    }
                }
                EntityState::Detached => {
                    let Some(idv) = id else {
                        return Outcome::Err(Error::assertion(
                            "detached classification without identifier",
                        ));
                    };
                    // Re-attach from the carried identifier, then proceed as
                    // managed.
                    let key = EntityKey::new(name, &idv);
                    self.entries.insert(
                        key,
                        EntityEntry {
                            status: EntityStatus::Managed,
                            entity_name: name,
                            id: idv.clone(),
                            loaded_state: None,
                            expired: false,
                            entity: Arc::clone(&entity),
                        },
                    );
                    self.delete_managed(cx, entity, name, idv, ctx).await
                }
                EntityState::Persistent => {
                    let Some(idv) = id else {
                        return Outcome::Err(Error::assertion(
                            "managed entry without identifier",
                        ));
                    };
                    self.delete_managed(cx, entity, name, idv, ctx).await
                }
            }
        })
    }

    async fn delete_managed(
        &mut self,
        cx: &Cx,
        entity: EntityRef,
        name: &'static str,
        id: Value,
        ctx: &mut CascadeContext,
    ) -> Outcome<(), Error> {
        if !ctx.add(&entity) {
            return Outcome::Ok(());
        }
        let assocs = entity.read().expect("lock poisoned").associations();

        // Children holding a foreign key to the owner must go first or the
        // owner's delete would violate their constraint.
        for assoc in &assocs {
            if !assoc.info.constrained || !CascadeAction::Delete.applies_to(&assoc.info.cascades) {
                continue;
            }
            match self
                .cascade_into(cx, CascadeAction::Delete, assoc, Some(&id), ctx)
                .await
            {
                Outcome::Ok(()) => {}
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }

        let key = EntityKey::new(name, &id);
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.status = EntityStatus::Deleted;
        }
        self.queue.push(ActionOp::EntityDelete { key });
        // The owner's collection rows go away with it; removals run before
        // entity deletes in the queue's global order.
        self.track_owned_collections(&id, &assocs, CollectionSchedule::Remove);

        for assoc in &assocs {
            if assoc.info.constrained || !CascadeAction::Delete.applies_to(&assoc.info.cascades) {
                continue;
            }
            match self
                .cascade_into(cx, CascadeAction::Delete, assoc, Some(&id), ctx)
                .await
            {
                Outcome::Ok(()) => {}
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }
        Outcome::Ok(())
    }

    /// Handle one node of a refresh cascade.
    pub(crate) fn refresh_node<'a>(
        &'a mut self,
        cx: &'a Cx,
        entity: EntityRef,
        ctx: &'a mut CascadeContext,
    ) -> BoxOutcome<'a> {
        Box::pin(async move {
            if !ctx.add(&entity) {
                return Outcome::Ok(());
            }
            let (name, id) = {
                let guard = entity.read().expect("lock poisoned");
                (guard.entity_name(), guard.id())
            };
            let Some(idv) = id else {
                return Outcome::Err(Error::state_transition(
                    StateTransitionKind::RefreshOnUntracked,
                    name,
                    "cannot refresh an instance without identifier",
                ));
            };
            let key = EntityKey::new(name, &idv);
            let Some(entry) = self.entries.get_mut(&key) else {
                return Outcome::Err(Error::state_transition(
                    StateTransitionKind::RefreshOnUntracked,
                    name,
                    "cannot refresh an untracked instance",
                ));
            };
            entry.expired = true;
            self.cache.evict_entity(name, &idv);
            tracing::trace!(entity = name, id = %idv, "expired entry and evicted cached state");
            self.cascade_all(cx, CascadeAction::Refresh, &entity, ctx).await
        })
    }

    /// Handle one node of a lock cascade.
    pub(crate) fn lock_node<'a>(
        &'a mut self,
        cx: &'a Cx,
        entity: EntityRef,
        ctx: &'a mut CascadeContext,
    ) -> BoxOutcome<'a> {
        Box::pin(async move {
            if !ctx.add(&entity) {
                return Outcome::Ok(());
            }
            let (name, id) = {
                let guard = entity.read().expect("lock poisoned");
                (guard.entity_name(), guard.id())
            };
            let Some(descriptor) = self.entities.get(name).copied() else {
                return Outcome::Err(Error::assertion(format!(
                    "no descriptor registered for entity {name}"
                )));
            };
            let status = self.status_for(name, id.as_ref());
            let state = classify(
                status,
                id.as_ref(),
                descriptor.id_strategy.allows_placeholder_id(),
                true,
            );
            match state {
                EntityState::Persistent => {
                    self.cascade_all(cx, CascadeAction::Lock, &entity, ctx).await
                }
                EntityState::Transient => Outcome::Err(Error::state_transition(
                    StateTransitionKind::LockOnUnmanaged,
                    name,
                    "cannot lock a transient instance",
                )),
                EntityState::Detached => Outcome::Err(Error::state_transition(
                    StateTransitionKind::LockOnUnmanaged,
                    name,
                    "cannot lock a detached instance",
                )),
                EntityState::Deleted => Outcome::Err(Error::state_transition(
                    StateTransitionKind::LockOnUnmanaged,
                    name,
                    "cannot lock an instance scheduled for deletion",
                )),
            }
        })
    }

    /// Save a transient instance: cascade to key-source associations, bind
    /// the identifier, schedule the insert, then cascade to the rest.
    async fn save_transient(
        &mut self,
        cx: &Cx,
        entity: EntityRef,
        action: CascadeAction,
        ctx: &mut CascadeContext,
    ) -> Outcome<(), Error> {
        let (name, assocs, initial_id) = {
            let guard = entity.read().expect("lock poisoned");
            (guard.entity_name(), guard.associations(), guard.id())
        };
        let Some(descriptor) = self.entities.get(name).copied() else {
            return Outcome::Err(Error::assertion(format!(
                "no descriptor registered for entity {name}"
            )));
        };
        tracing::trace!(entity = name, action = action.as_str(), "saving transient instance");

        // Associations the identifier depends on must be settled before the
        // owner can be saved.
        for assoc in &assocs {
            if !assoc.info.key_source || !action.applies_to(&assoc.info.cascades) {
                continue;
            }
            match self
                .cascade_into(cx, action, assoc, initial_id.as_ref(), ctx)
                .await
            {
                Outcome::Ok(()) => {}
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }

        let id = match descriptor.id_strategy {
            IdStrategy::Assigned => match entity.read().expect("lock poisoned").id() {
                Some(v) if !v.is_null() => v,
                _ => {
                    return Outcome::Err(Error::id_generation(
                        IdGenerationKind::MissingAssignedId,
                        name,
                        "assigned-id entity reached save without an identifier",
                    ));
                }
            },
            IdStrategy::Generated => {
                let existing = entity.read().expect("lock poisoned").id();
                match existing {
                    Some(v) if !v.is_null() => v,
                    _ => {
                        let generated = match self.backend.generate_id(cx, name).await {
                            Outcome::Ok(v) => v,
                            Outcome::Err(e) => return Outcome::Err(e),
                            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                            Outcome::Panicked(p) => return Outcome::Panicked(p),
                        };
                        tracing::debug!(entity = name, id = %generated, "generated identifier");
                        entity
                            .write()
                            .expect("lock poisoned")
                            .set_id(Some(generated.clone()));
                        generated
                    }
                }
            }
            IdStrategy::Foreign { .. } => {
                let borrowed = assocs
                    .iter()
                    .find(|a| a.info.key_source)
                    .and_then(|a| match &a.target {
                        AssociationTarget::Single(Some(t)) => {
                            t.read().expect("lock poisoned").id()
                        }
                        _ => None,
                    });
                match borrowed {
                    Some(v) if !v.is_null() => {
                        entity
                            .write()
                            .expect("lock poisoned")
                            .set_id(Some(v.clone()));
                        v
                    }
                    _ => {
                        return Outcome::Err(Error::id_generation(
                            IdGenerationKind::MissingForeignSource,
                            name,
                            "no key-source association with an identifier to borrow",
                        ));
                    }
                }
            }
        };

        let key = EntityKey::new(name, &id);
        self.entries.insert(
            key,
            EntityEntry {
                status: EntityStatus::Managed,
                entity_name: name,
                id: id.clone(),
                loaded_state: None,
                expired: false,
                entity: Arc::clone(&entity),
            },
        );
        self.queue.push(ActionOp::EntityInsert { key });
        self.track_owned_collections(&id, &assocs, CollectionSchedule::Recreate);

        for assoc in &assocs {
            if assoc.info.key_source || !action.applies_to(&assoc.info.cascades) {
                continue;
            }
            match self.cascade_into(cx, action, assoc, Some(&id), ctx).await {
                Outcome::Ok(()) => {}
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }
        Outcome::Ok(())
    }

    /// Cascade one action across every cascadable association of an entity.
    async fn cascade_all(
        &mut self,
        cx: &Cx,
        action: CascadeAction,
        entity: &EntityRef,
        ctx: &mut CascadeContext,
    ) -> Outcome<(), Error> {
        let (assocs, owner_id) = {
            let guard = entity.read().expect("lock poisoned");
            (guard.associations(), guard.id())
        };
        for assoc in &assocs {
            if !action.applies_to(&assoc.info.cascades) {
                continue;
            }
            match self
                .cascade_into(cx, action, assoc, owner_id.as_ref(), ctx)
                .await
            {
                Outcome::Ok(()) => {}
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }
        Outcome::Ok(())
    }

    /// Cascade one action into a single association target.
    async fn cascade_into(
        &mut self,
        cx: &Cx,
        action: CascadeAction,
        assoc: &Association,
        owner_id: Option<&Value>,
        ctx: &mut CascadeContext,
    ) -> Outcome<(), Error> {
        match &assoc.target {
            AssociationTarget::Single(Some(target)) => {
                self.dispatch_node(cx, action, Arc::clone(target), ctx).await
            }
            AssociationTarget::Single(None) => Outcome::Ok(()),
            AssociationTarget::Collection(coll) => {
                let (initialized, role, mut members) = {
                    let guard = coll.read().expect("lock poisoned");
                    let members: Vec<EntityRef> = guard
                        .elements()
                        .iter()
                        .filter_map(|e| e.entity.clone())
                        .collect();
                    (guard.is_initialized(), guard.role(), members)
                };

                if !initialized {
                    if !action.requires_initialization() {
                        tracing::trace!(
                            role,
                            action = action.as_str(),
                            "skipping uninitialized collection"
                        );
                        return Outcome::Ok(());
                    }
                    let Some(owner) = owner_id else {
                        return Outcome::Err(Error::assertion(
                            "cannot initialize a collection without the owner identifier",
                        ));
                    };
                    tracing::debug!(
                        role,
                        action = action.as_str(),
                        "forcing lazy collection initialization"
                    );
                    let elements = match self.backend.load_collection(cx, role, owner).await {
                        Outcome::Ok(e) => e,
                        Outcome::Err(e) => return Outcome::Err(e),
                        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                        Outcome::Panicked(p) => return Outcome::Panicked(p),
                    };
                    members = elements.iter().filter_map(|e| e.entity.clone()).collect();
                    coll.write().expect("lock poisoned").initialize(elements);
                }

                for member in members {
                    match self.dispatch_node(cx, action, member, ctx).await {
                        Outcome::Ok(()) => {}
                        Outcome::Err(e) => return Outcome::Err(e),
                        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                        Outcome::Panicked(p) => return Outcome::Panicked(p),
                    }
                }
                Outcome::Ok(())
            }
        }
    }

    /// Track an owner's collections and schedule their creation or removal.
    pub(crate) fn track_owned_collections(
        &mut self,
        owner_id: &Value,
        assocs: &[Association],
        schedule: CollectionSchedule,
    ) {
        for assoc in assocs {
            let AssociationTarget::Collection(coll) = &assoc.target else {
                continue;
            };
            let (role, initialized, has_rows) = {
                let guard = coll.read().expect("lock poisoned");
                (
                    guard.role(),
                    guard.is_initialized(),
                    !guard.elements().is_empty(),
                )
            };
            let key = CollectionKey::new(role, owner_id);
            self.tracked_collections.entry(key).or_insert_with(|| {
                TrackedCollection {
                    role,
                    owner: owner_id.clone(),
                    snapshot: None,
                    collection: Arc::clone(coll),
                }
            });
            match schedule {
                CollectionSchedule::Recreate => {
                    if initialized && has_rows && !self.queue.has_collection_action(&key) {
                        self.queue.push(ActionOp::CollectionRecreate { key });
                    }
                }
                CollectionSchedule::Remove => {
                    if !self.queue.has_collection_action(&key) {
                        self.queue.push(ActionOp::CollectionRemove { key });
                    }
                }
                CollectionSchedule::TrackOnly => {}
            }
        }
    }
}
