//! Action scheduling and cascade execution for reflow.
//!
//! `reflow-engine` is the **unit-of-work layer** of a non-blocking
//! persistence engine. It decides, for a mutated entity or collection, what
//! database operations must run, in what order relative to other pending
//! mutations, and how the asynchronous sub-operations chain so the net
//! effect matches what a blocking engine gets from call-stack synchrony.
//!
//! # Role In The Architecture
//!
//! - **Tracking**: entity entries and collection entries with flush
//!   baselines, exclusively owned by one session.
//! - **Cascades**: persist/merge/delete/refresh/lock propagate across the
//!   association graph, visiting each instance once per call.
//! - **Scheduling**: pending actions drain in a fixed global order, each
//!   action's asynchronous body chained after the previous one settled.
//! - **Hooks**: pre/post notifications fire synchronously at exact points
//!   in that chain.
//!
//! # Design Philosophy
//!
//! - **Explicit context**: every suspending call threads a `Cx`; there is
//!   no ambient session state.
//! - **Type erasure**: entries hold `Arc<RwLock<dyn Entity>>` so one unit
//!   of work tracks heterogeneous models.
//! - **Cancel-correct**: all async paths return `Outcome` and propagate
//!   cancellation instead of swallowing it.
//!
//! # Example
//!
//! ```ignore
//! let mut session = Session::new(backend);
//! session.register_entity(EntityDescriptor::new("author", IdStrategy::Generated));
//!
//! // Schedule a graph for insertion (cascades to associations)
//! session.persist(&cx, &author).await?;
//!
//! // Push every pending mutation to the backend, in order
//! session.flush(&cx).await?;
//! ```

pub mod cascade;
pub mod collection;
pub mod events;
pub mod queue;
pub mod state;

pub use cascade::{CascadeAction, CascadeContext};
pub use collection::{MutationPlan, TrackedCollection, plan};
pub use events::{HookKind, HookPayload, ListenerRegistry};
pub use queue::{ActionKind, ActionOp, ActionQueue, ActionState, PendingAction, PendingCounts};
pub use state::{EntityState, classify};

use asupersync::{Cx, Outcome};
use queue::ActionOp as Op;
use reflow_core::{
    AssociationTarget, Backend, CacheRegion, CollectionDescriptor, EntityDescriptor, EntityRef,
    Error, NullCacheRegion, Result, Value,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

// ============================================================================
// Identity keys
// ============================================================================

/// Hash a single value with a variant discriminant, so equal payloads of
/// different variants do not collide.
pub(crate) fn hash_value(v: &Value) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    match v {
        Value::Null => 0u8.hash(&mut hasher),
        Value::Bool(b) => {
            1u8.hash(&mut hasher);
            b.hash(&mut hasher);
        }
        Value::Int(i) => {
            2u8.hash(&mut hasher);
            i.hash(&mut hasher);
        }
        Value::BigInt(i) => {
            3u8.hash(&mut hasher);
            i.hash(&mut hasher);
        }
        Value::Double(f) => {
            4u8.hash(&mut hasher);
            f.to_bits().hash(&mut hasher);
        }
        Value::Text(s) => {
            5u8.hash(&mut hasher);
            s.hash(&mut hasher);
        }
        Value::Bytes(b) => {
            6u8.hash(&mut hasher);
            b.hash(&mut hasher);
        }
    }
    hasher.finish()
}

/// Unique key for a tracked entity: entity name plus hashed identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityKey {
    entity_name: &'static str,
    id_hash: u64,
}

impl EntityKey {
    /// Create a key from an entity name and identifier value.
    #[must_use]
    pub fn new(entity_name: &'static str, id: &Value) -> Self {
        Self {
            entity_name,
            id_hash: hash_value(id),
        }
    }

    /// The entity name.
    #[must_use]
    pub fn entity_name(&self) -> &'static str {
        self.entity_name
    }
}

/// Unique key for a tracked collection: role plus hashed owner identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollectionKey {
    role: &'static str,
    owner_hash: u64,
}

impl CollectionKey {
    /// Create a key from a collection role and owner identifier.
    #[must_use]
    pub fn new(role: &'static str, owner: &Value) -> Self {
        Self {
            role,
            owner_hash: hash_value(owner),
        }
    }

    /// The collection role.
    #[must_use]
    pub fn role(&self) -> &'static str {
        self.role
    }
}

// ============================================================================
// Tracking entries
// ============================================================================

/// Status of a tracked entity entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityStatus {
    /// Managed: dirty-checked and flushed.
    Managed,
    /// Managed but never written by the dirty sweep.
    ReadOnly,
    /// Scheduled for deletion.
    Deleted,
    /// Deleted and flushed; the row no longer exists.
    Gone,
}

/// Tracking record for one entity instance within a unit of work.
pub struct EntityEntry {
    pub(crate) status: EntityStatus,
    pub(crate) entity_name: &'static str,
    pub(crate) id: Value,
    /// Flush baseline for dirty checking; `None` while an insert is pending.
    pub(crate) loaded_state: Option<Vec<(&'static str, Value)>>,
    /// Expired entries skip the dirty sweep until reloaded.
    pub(crate) expired: bool,
    pub(crate) entity: EntityRef,
}

impl EntityEntry {
    /// Current status.
    #[must_use]
    pub fn status(&self) -> EntityStatus {
        self.status
    }

    /// The tracked identifier.
    #[must_use]
    pub fn id(&self) -> &Value {
        &self.id
    }

    /// The mapped entity name.
    #[must_use]
    pub fn entity_name(&self) -> &'static str {
        self.entity_name
    }

    /// The dirty-check baseline, if one exists.
    #[must_use]
    pub fn loaded_state(&self) -> Option<&[(&'static str, Value)]> {
        self.loaded_state.as_deref()
    }

    /// Whether the entry was expired by a refresh.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expired
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Mutation counters, recorded only while enabled.
#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct Statistics {
    enabled: bool,
    entity_inserts: u64,
    entity_updates: u64,
    entity_deletes: u64,
    collection_updates: u64,
    collection_recreates: u64,
    collection_removes: u64,
}

impl Statistics {
    /// Whether counters are being recorded.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn record(&mut self, kind: ActionKind) {
        match kind {
            ActionKind::EntityInsert => self.entity_inserts += 1,
            ActionKind::EntityUpdate => self.entity_updates += 1,
            ActionKind::EntityDelete => self.entity_deletes += 1,
            ActionKind::CollectionUpdate => self.collection_updates += 1,
            ActionKind::CollectionRecreate => self.collection_recreates += 1,
            ActionKind::CollectionRemove => self.collection_removes += 1,
        }
    }

    /// Entity rows inserted.
    #[must_use]
    pub fn entity_inserts(&self) -> u64 {
        self.entity_inserts
    }

    /// Entity rows updated.
    #[must_use]
    pub fn entity_updates(&self) -> u64 {
        self.entity_updates
    }

    /// Entity rows deleted.
    #[must_use]
    pub fn entity_deletes(&self) -> u64 {
        self.entity_deletes
    }

    /// Collection row-update cycles executed.
    #[must_use]
    pub fn collection_updates(&self) -> u64 {
        self.collection_updates
    }

    /// Collection recreations executed.
    #[must_use]
    pub fn collection_recreates(&self) -> u64 {
        self.collection_recreates
    }

    /// Collection removals executed.
    #[must_use]
    pub fn collection_removes(&self) -> u64 {
        self.collection_removes
    }
}

// ============================================================================
// Session
// ============================================================================

/// The Session is the unit-of-work manager.
///
/// It owns the tracking state, the action queue, the listener registry, and
/// the handles to the external services, and it coordinates cascades and
/// flushes over them. All of that state belongs to exactly one logical unit
/// of work; nothing here is shared between sessions.
pub struct Session<B: Backend> {
    pub(crate) backend: B,
    pub(crate) cache: Box<dyn CacheRegion>,
    pub(crate) entities: HashMap<&'static str, EntityDescriptor>,
    pub(crate) collections: HashMap<&'static str, CollectionDescriptor>,
    pub(crate) enabled_filters: HashSet<&'static str>,
    pub(crate) entries: HashMap<EntityKey, EntityEntry>,
    pub(crate) tracked_collections: HashMap<CollectionKey, TrackedCollection>,
    pub(crate) queue: ActionQueue,
    pub(crate) listeners: ListenerRegistry,
    pub(crate) statistics: Statistics,
}

impl<B: Backend> Session<B> {
    /// Create a session over a backend, with no second-level cache.
    pub fn new(backend: B) -> Self {
        Self::with_cache(backend, NullCacheRegion)
    }

    /// Create a session over a backend and a cache region.
    pub fn with_cache(backend: B, cache: impl CacheRegion + 'static) -> Self {
        Self {
            backend,
            cache: Box::new(cache),
            entities: HashMap::new(),
            collections: HashMap::new(),
            enabled_filters: HashSet::new(),
            entries: HashMap::new(),
            tracked_collections: HashMap::new(),
            queue: ActionQueue::new(),
            listeners: ListenerRegistry::new(),
            statistics: Statistics::default(),
        }
    }

    /// Get a reference to the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    // ========================================================================
    // Metadata registration
    // ========================================================================

    /// Register an entity mapping.
    pub fn register_entity(&mut self, descriptor: EntityDescriptor) {
        self.entities.insert(descriptor.entity_name, descriptor);
    }

    /// Register a collection mapping.
    pub fn register_collection(&mut self, descriptor: CollectionDescriptor) {
        self.collections.insert(descriptor.role, descriptor);
    }

    /// Enable a row filter by name.
    pub fn enable_filter(&mut self, name: &'static str) {
        self.enabled_filters.insert(name);
    }

    /// Disable a row filter by name.
    pub fn disable_filter(&mut self, name: &'static str) {
        self.enabled_filters.remove(name);
    }

    pub(crate) fn filters_affect(&self, descriptor: &CollectionDescriptor) -> bool {
        descriptor
            .filters
            .iter()
            .any(|f| self.enabled_filters.contains(f))
    }

    /// Register a lifecycle hook listener.
    pub fn register_listener(
        &mut self,
        kind: HookKind,
        f: impl FnMut(&HookPayload) -> Result<()> + Send + 'static,
    ) {
        self.listeners.register(kind, f);
    }

    /// Turn statistics recording on or off.
    pub fn enable_statistics(&mut self, enabled: bool) {
        self.statistics.enabled = enabled;
    }

    /// Current statistics counters.
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    // ========================================================================
    // Tracking
    // ========================================================================

    /// Track an already-loaded instance as managed, snapshotting its state
    /// and its collections as the dirty-check baseline.
    #[allow(clippy::result_large_err)]
    pub fn attach(&mut self, entity: &EntityRef) -> Result<EntityKey> {
        let (name, id, current, assocs) = {
            let guard = entity.read().expect("lock poisoned");
            (
                guard.entity_name(),
                guard.id(),
                guard.state(),
                guard.associations(),
            )
        };
        if !self.entities.contains_key(name) {
            return Err(Error::assertion(format!(
                "no descriptor registered for entity {name}"
            )));
        }
        let Some(id) = id.filter(|v| !v.is_null()) else {
            return Err(Error::assertion(
                "cannot attach an instance without identifier",
            ));
        };

        let key = EntityKey::new(name, &id);
        self.entries.insert(
            key,
            EntityEntry {
                status: EntityStatus::Managed,
                entity_name: name,
                id: id.clone(),
                loaded_state: Some(current),
                expired: false,
                entity: Arc::clone(entity),
            },
        );

        for assoc in &assocs {
            let AssociationTarget::Collection(coll) = &assoc.target else {
                continue;
            };
            let (role, initialized, rows) = {
                let guard = coll.read().expect("lock poisoned");
                (guard.role(), guard.is_initialized(), guard.rows())
            };
            let ckey = CollectionKey::new(role, &id);
            self.tracked_collections.insert(
                ckey,
                TrackedCollection {
                    role,
                    owner: id.clone(),
                    snapshot: initialized.then_some(rows),
                    collection: Arc::clone(coll),
                },
            );
        }

        tracing::trace!(entity = name, id = %id, "attached loaded instance");
        Ok(key)
    }

    /// Flip an entry between managed and read-only.
    #[allow(clippy::result_large_err)]
    pub fn set_read_only(&mut self, entity: &EntityRef, read_only: bool) -> Result<()> {
        let (name, id) = {
            let guard = entity.read().expect("lock poisoned");
            (guard.entity_name(), guard.id())
        };
        let Some(id) = id else {
            return Err(Error::assertion("instance has no identifier"));
        };
        let key = EntityKey::new(name, &id);
        let Some(entry) = self.entries.get_mut(&key) else {
            return Err(Error::assertion("instance is not tracked"));
        };
        match entry.status {
            EntityStatus::Managed | EntityStatus::ReadOnly => {
                entry.status = if read_only {
                    EntityStatus::ReadOnly
                } else {
                    EntityStatus::Managed
                };
                Ok(())
            }
            EntityStatus::Deleted | EntityStatus::Gone => Err(Error::assertion(
                "cannot change read-only mode of a deleted instance",
            )),
        }
    }

    /// Look up a tracking entry.
    pub fn entry(&self, key: &EntityKey) -> Option<&EntityEntry> {
        self.entries.get(key)
    }

    /// Status of a tracked instance, if any.
    pub fn entity_status(&self, entity: &EntityRef) -> Option<EntityStatus> {
        let (name, id) = {
            let guard = entity.read().expect("lock poisoned");
            (guard.entity_name(), guard.id())
        };
        self.status_for(name, id.as_ref())
    }

    pub(crate) fn status_for(
        &self,
        name: &'static str,
        id: Option<&Value>,
    ) -> Option<EntityStatus> {
        id.filter(|v| !v.is_null())
            .and_then(|v| self.entries.get(&EntityKey::new(name, v)))
            .map(|e| e.status)
    }

    /// Pending action counts by kind.
    pub fn pending_actions(&self) -> PendingCounts {
        self.queue.counts()
    }

    /// Serializable snapshot of the session's internals, for diagnostics.
    pub fn debug_info(&self) -> serde_json::Value {
        let mut filters: Vec<&'static str> = self.enabled_filters.iter().copied().collect();
        filters.sort_unstable();
        serde_json::json!({
            "tracked_entities": self.entries.len(),
            "tracked_collections": self.tracked_collections.len(),
            "enabled_filters": filters,
            "pending": self.queue.counts(),
            "statistics": self.statistics,
        })
    }

    // ========================================================================
    // Cascading entry points
    // ========================================================================

    /// Make a transient graph persistent, cascading per mapping.
    #[tracing::instrument(level = "debug", skip(self, cx, entity))]
    pub async fn persist(&mut self, cx: &Cx, entity: &EntityRef) -> Outcome<(), Error> {
        let mut ctx = CascadeContext::new();
        self.dispatch_node(cx, CascadeAction::Persist, Arc::clone(entity), &mut ctx)
            .await
    }

    /// Merge an instance's state into the unit of work, cascading per
    /// mapping.
    #[tracing::instrument(level = "debug", skip(self, cx, entity))]
    pub async fn merge(&mut self, cx: &Cx, entity: &EntityRef) -> Outcome<(), Error> {
        let mut ctx = CascadeContext::new();
        self.dispatch_node(cx, CascadeAction::Merge, Arc::clone(entity), &mut ctx)
            .await
    }

    /// Schedule an instance (and cascaded children) for deletion.
    #[tracing::instrument(level = "debug", skip(self, cx, entity))]
    pub async fn delete(&mut self, cx: &Cx, entity: &EntityRef) -> Outcome<(), Error> {
        let mut ctx = CascadeContext::new();
        self.dispatch_node(cx, CascadeAction::Delete, Arc::clone(entity), &mut ctx)
            .await
    }

    /// Expire cached and tracked state for an instance, cascading per
    /// mapping.
    #[tracing::instrument(level = "debug", skip(self, cx, entity))]
    pub async fn refresh(&mut self, cx: &Cx, entity: &EntityRef) -> Outcome<(), Error> {
        let mut ctx = CascadeContext::new();
        self.dispatch_node(cx, CascadeAction::Refresh, Arc::clone(entity), &mut ctx)
            .await
    }

    /// Verify an instance is managed, cascading per mapping.
    #[tracing::instrument(level = "debug", skip(self, cx, entity))]
    pub async fn lock(&mut self, cx: &Cx, entity: &EntityRef) -> Outcome<(), Error> {
        let mut ctx = CascadeContext::new();
        self.dispatch_node(cx, CascadeAction::Lock, Arc::clone(entity), &mut ctx)
            .await
    }

    // ========================================================================
    // Flush
    // ========================================================================

    /// Push every pending mutation to the backend.
    ///
    /// Sweeps managed entries and tracked collections for changes, then
    /// drains the action queue as one sequenced chain. A failure aborts the
    /// remaining chain and leaves the queue inspectable; nothing already
    /// executed is compensated at this layer.
    #[tracing::instrument(level = "info", skip(self, cx))]
    pub async fn flush(&mut self, cx: &Cx) -> Outcome<(), Error> {
        if let Err(e) = self
            .listeners
            .dispatch_with(HookKind::PreFlush, HookPayload::flush)
        {
            return Outcome::Err(e);
        }

        // Dirty sweep: managed entries whose state moved off the baseline.
        let mut dirty_entities: Vec<EntityKey> = Vec::new();
        for (key, entry) in &self.entries {
            if entry.status != EntityStatus::Managed || entry.expired {
                continue;
            }
            if self.queue.has_pending_update(key) {
                continue;
            }
            let Some(baseline) = &entry.loaded_state else {
                continue;
            };
            let current = entry.entity.read().expect("lock poisoned").state();
            if &current != baseline {
                dirty_entities.push(*key);
            }
        }
        for key in dirty_entities {
            self.queue.push(Op::EntityUpdate { key });
        }

        // Dirty collections not already scheduled by a cascade.
        let mut dirty_collections: Vec<CollectionKey> = Vec::new();
        for (key, tracked) in &self.tracked_collections {
            if self.queue.has_collection_action(key) {
                continue;
            }
            if tracked.collection.read().expect("lock poisoned").is_dirty() {
                dirty_collections.push(*key);
            }
        }
        for key in dirty_collections {
            self.queue.push(Op::CollectionUpdate { key });
        }

        tracing::debug!(pending = self.queue.len(), "executing action queue");
        match self.execute_queue(cx).await {
            Outcome::Ok(()) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }

        if let Err(e) = self
            .listeners
            .dispatch_with(HookKind::PostFlush, HookPayload::flush)
        {
            return Outcome::Err(e);
        }
        Outcome::Ok(())
    }
}
