//! The action queue and its asynchronous drain.
//!
//! Producers append actions while persist/delete/dirty-sweep run; the drain
//! executes them as one strictly sequenced chain. Global order across kinds
//! is fixed — entity inserts, entity updates, collection removals,
//! collection recreations, collection row-updates, entity deletes — with
//! enqueue order breaking ties inside a kind. Action k+1 begins only after
//! action k's body and post-effects resolved, so foreign-key ordering
//! matches what a blocking engine would get from call-stack synchrony.

use crate::collection::{self, MutationPlan};
use crate::events::{HookKind, HookPayload};
use crate::{CollectionKey, EntityKey, EntityStatus, Session};
use asupersync::{Cx, Outcome};
use reflow_core::{Backend, Error, Value};
use std::collections::VecDeque;

/// The kind of a pending action, in global execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    EntityInsert,
    EntityUpdate,
    CollectionRemove,
    CollectionRecreate,
    CollectionUpdate,
    EntityDelete,
}

/// Lifecycle of one action: the completion marker advances as the drain
/// touches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Pending,
    Executing,
    Completed,
    Failed,
}

/// The target of a pending action. State is read from the tracking entry at
/// execution time, not captured at enqueue time, so late in-memory edits are
/// flushed rather than a stale copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOp {
    EntityInsert { key: EntityKey },
    EntityUpdate { key: EntityKey },
    EntityDelete { key: EntityKey },
    CollectionRemove { key: CollectionKey },
    CollectionRecreate { key: CollectionKey },
    CollectionUpdate { key: CollectionKey },
}

impl ActionOp {
    /// The kind bucket this op belongs to.
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionOp::EntityInsert { .. } => ActionKind::EntityInsert,
            ActionOp::EntityUpdate { .. } => ActionKind::EntityUpdate,
            ActionOp::EntityDelete { .. } => ActionKind::EntityDelete,
            ActionOp::CollectionRemove { .. } => ActionKind::CollectionRemove,
            ActionOp::CollectionRecreate { .. } => ActionKind::CollectionRecreate,
            ActionOp::CollectionUpdate { .. } => ActionKind::CollectionUpdate,
        }
    }
}

/// One unit of deferred work, owned by the queue until executed.
#[derive(Debug)]
pub struct PendingAction {
    op: ActionOp,
    state: ActionState,
}

impl PendingAction {
    fn new(op: ActionOp) -> Self {
        Self {
            op,
            state: ActionState::Pending,
        }
    }

    /// The action's target.
    #[must_use]
    pub fn op(&self) -> &ActionOp {
        &self.op
    }

    /// The completion marker.
    #[must_use]
    pub fn state(&self) -> ActionState {
        self.state
    }
}

/// Count of pending actions by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PendingCounts {
    pub inserts: usize,
    pub updates: usize,
    pub collection_removes: usize,
    pub collection_recreates: usize,
    pub collection_updates: usize,
    pub deletes: usize,
}

impl PendingCounts {
    /// Total number of pending actions.
    #[must_use]
    pub fn total(&self) -> usize {
        self.inserts
            + self.updates
            + self.collection_removes
            + self.collection_recreates
            + self.collection_updates
            + self.deletes
    }

    /// Check if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Ordered queue of pending actions, bucketed by kind.
#[derive(Debug, Default)]
pub struct ActionQueue {
    inserts: VecDeque<PendingAction>,
    updates: VecDeque<PendingAction>,
    collection_removes: VecDeque<PendingAction>,
    collection_recreates: VecDeque<PendingAction>,
    collection_updates: VecDeque<PendingAction>,
    deletes: VecDeque<PendingAction>,
}

impl ActionQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action to its kind bucket.
    pub fn push(&mut self, op: ActionOp) {
        let bucket = self.bucket_mut(op.kind());
        bucket.push_back(PendingAction::new(op));
    }

    fn bucket_mut(&mut self, kind: ActionKind) -> &mut VecDeque<PendingAction> {
        match kind {
            ActionKind::EntityInsert => &mut self.inserts,
            ActionKind::EntityUpdate => &mut self.updates,
            ActionKind::CollectionRemove => &mut self.collection_removes,
            ActionKind::CollectionRecreate => &mut self.collection_recreates,
            ActionKind::CollectionUpdate => &mut self.collection_updates,
            ActionKind::EntityDelete => &mut self.deletes,
        }
    }

    /// Pop the next action in global execution order.
    pub(crate) fn next_action(&mut self) -> Option<PendingAction> {
        self.inserts
            .pop_front()
            .or_else(|| self.updates.pop_front())
            .or_else(|| self.collection_removes.pop_front())
            .or_else(|| self.collection_recreates.pop_front())
            .or_else(|| self.collection_updates.pop_front())
            .or_else(|| self.deletes.pop_front())
    }

    /// Put a failed action back at the front of its bucket so the aborted
    /// queue stays inspectable.
    pub(crate) fn restore(&mut self, action: PendingAction) {
        let kind = action.op.kind();
        self.bucket_mut(kind).push_front(action);
    }

    /// Drop a scheduled entity delete. Returns whether one was found.
    ///
    /// This is the resurrection path: persisting an instance whose delete is
    /// still pending must cancel that delete before re-managing the entry.
    pub fn unschedule_delete(&mut self, key: &EntityKey) -> bool {
        let before = self.deletes.len();
        self.deletes
            .retain(|a| !matches!(&a.op, ActionOp::EntityDelete { key: k } if k == key));
        self.deletes.len() != before
    }

    /// Whether any action already targets this collection.
    #[must_use]
    pub fn has_collection_action(&self, key: &CollectionKey) -> bool {
        let matches_key = |a: &PendingAction| match &a.op {
            ActionOp::CollectionRemove { key: k }
            | ActionOp::CollectionRecreate { key: k }
            | ActionOp::CollectionUpdate { key: k } => k == key,
            _ => false,
        };
        self.collection_removes.iter().any(matches_key)
            || self.collection_recreates.iter().any(matches_key)
            || self.collection_updates.iter().any(matches_key)
    }

    /// Whether a delete is scheduled for this entity.
    #[must_use]
    pub fn has_pending_delete(&self, key: &EntityKey) -> bool {
        self.deletes
            .iter()
            .any(|a| matches!(&a.op, ActionOp::EntityDelete { key: k } if k == key))
    }

    /// Whether an update is scheduled for this entity.
    #[must_use]
    pub fn has_pending_update(&self, key: &EntityKey) -> bool {
        self.updates
            .iter()
            .any(|a| matches!(&a.op, ActionOp::EntityUpdate { key: k } if k == key))
    }

    /// Pending action counts by kind.
    #[must_use]
    pub fn counts(&self) -> PendingCounts {
        PendingCounts {
            inserts: self.inserts.len(),
            updates: self.updates.len(),
            collection_removes: self.collection_removes.len(),
            collection_recreates: self.collection_recreates.len(),
            collection_updates: self.collection_updates.len(),
            deletes: self.deletes.len(),
        }
    }

    /// Total pending actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts().total()
    }

    /// Check if the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard every pending action.
    pub fn clear(&mut self) {
        self.inserts.clear();
        self.updates.clear();
        self.collection_removes.clear();
        self.collection_recreates.clear();
        self.collection_updates.clear();
        self.deletes.clear();
    }
}

impl<B: Backend> Session<B> {
    /// Drain the queue front-to-back, chaining each action's asynchronous
    /// body so the next action starts only after the previous one fully
    /// settled. A failure aborts the remaining queue and surfaces as-is;
    /// completed actions are not compensated here (that is the transaction
    /// boundary's job).
    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub(crate) async fn execute_queue(&mut self, cx: &Cx) -> Outcome<(), Error> {
        while let Some(mut action) = self.queue.next_action() {
            action.state = ActionState::Executing;
            tracing::trace!(op = ?action.op, "executing action");
            match self.execute_action(cx, &action.op).await {
                Outcome::Ok(()) => {
                    action.state = ActionState::Completed;
                }
                Outcome::Err(e) => {
                    action.state = ActionState::Failed;
                    self.queue.restore(action);
                    return Outcome::Err(e);
                }
                Outcome::Cancelled(r) => {
                    action.state = ActionState::Failed;
                    self.queue.restore(action);
                    return Outcome::Cancelled(r);
                }
                Outcome::Panicked(p) => {
                    action.state = ActionState::Failed;
                    self.queue.restore(action);
                    return Outcome::Panicked(p);
                }
            }
        }
        Outcome::Ok(())
    }

    async fn execute_action(&mut self, cx: &Cx, op: &ActionOp) -> Outcome<(), Error> {
        match op {
            ActionOp::EntityInsert { key } => self.execute_entity_insert(cx, key).await,
            ActionOp::EntityUpdate { key } => self.execute_entity_update(cx, key).await,
            ActionOp::EntityDelete { key } => self.execute_entity_delete(cx, key).await,
            ActionOp::CollectionRemove { key } => self.execute_collection_remove(cx, key).await,
            ActionOp::CollectionRecreate { key } => {
                self.execute_collection_recreate(cx, key).await
            }
            ActionOp::CollectionUpdate { key } => self.execute_collection_update(cx, key).await,
        }
    }

    async fn execute_entity_insert(&mut self, cx: &Cx, key: &EntityKey) -> Outcome<(), Error> {
        let (name, id, row) = {
            let Some(entry) = self.entries.get(key) else {
                return Outcome::Err(Error::assertion("insert action targets an untracked entity"));
            };
            let row = entry.entity.read().expect("lock poisoned").state();
            (entry.entity_name, entry.id.clone(), row)
        };

        if let Err(e) = self
            .listeners
            .dispatch_with(HookKind::PreInsert, || HookPayload::target(name, id.clone()))
        {
            return Outcome::Err(e);
        }

        match self.backend.insert_entity(cx, name, &id, &row).await {
            Outcome::Ok(_) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }

        let Some(entry) = self.entries.get_mut(key) else {
            return Outcome::Err(Error::assertion("entry vanished during insert"));
        };
        entry.loaded_state = Some(row);
        self.cache.evict_entity(name, &id);
        if let Err(e) = self
            .listeners
            .dispatch_with(HookKind::PostInsert, || HookPayload::target(name, id.clone()))
        {
            return Outcome::Err(e);
        }
        if self.statistics.is_enabled() {
            self.statistics.record(ActionKind::EntityInsert);
        }
        Outcome::Ok(())
    }

    async fn execute_entity_update(&mut self, cx: &Cx, key: &EntityKey) -> Outcome<(), Error> {
        let (name, id, row) = {
            let Some(entry) = self.entries.get(key) else {
                return Outcome::Err(Error::assertion("update action targets an untracked entity"));
            };
            let row = entry.entity.read().expect("lock poisoned").state();
            (entry.entity_name, entry.id.clone(), row)
        };

        if let Err(e) = self
            .listeners
            .dispatch_with(HookKind::PreUpdate, || HookPayload::target(name, id.clone()))
        {
            return Outcome::Err(e);
        }

        match self.backend.update_entity(cx, name, &id, &row).await {
            Outcome::Ok(_) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }

        let Some(entry) = self.entries.get_mut(key) else {
            return Outcome::Err(Error::assertion("entry vanished during update"));
        };
        entry.loaded_state = Some(row);
        entry.expired = false;
        self.cache.evict_entity(name, &id);
        if let Err(e) = self
            .listeners
            .dispatch_with(HookKind::PostUpdate, || HookPayload::target(name, id.clone()))
        {
            return Outcome::Err(e);
        }
        if self.statistics.is_enabled() {
            self.statistics.record(ActionKind::EntityUpdate);
        }
        Outcome::Ok(())
    }

    async fn execute_entity_delete(&mut self, cx: &Cx, key: &EntityKey) -> Outcome<(), Error> {
        let (name, id) = {
            let Some(entry) = self.entries.get(key) else {
                return Outcome::Err(Error::assertion("delete action targets an untracked entity"));
            };
            (entry.entity_name, entry.id.clone())
        };

        if let Err(e) = self
            .listeners
            .dispatch_with(HookKind::PreDelete, || HookPayload::target(name, id.clone()))
        {
            return Outcome::Err(e);
        }

        match self.backend.delete_entity(cx, name, &id).await {
            Outcome::Ok(_) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }

        let Some(entry) = self.entries.get_mut(key) else {
            return Outcome::Err(Error::assertion("entry vanished during delete"));
        };
        entry.status = EntityStatus::Gone;
        entry.loaded_state = None;
        self.cache.evict_entity(name, &id);
        if let Err(e) = self
            .listeners
            .dispatch_with(HookKind::PostDelete, || HookPayload::target(name, id.clone()))
        {
            return Outcome::Err(e);
        }
        if self.statistics.is_enabled() {
            self.statistics.record(ActionKind::EntityDelete);
        }
        Outcome::Ok(())
    }

    async fn execute_collection_update(
        &mut self,
        cx: &Cx,
        key: &CollectionKey,
    ) -> Outcome<(), Error> {
        let (role, owner) = {
            let Some(t) = self.tracked_collections.get(key) else {
                return Outcome::Err(Error::assertion(
                    "collection update targets an untracked collection",
                ));
            };
            (t.role, t.owner.clone())
        };

        if let Err(e) = self.listeners.dispatch_with(HookKind::PreCollectionUpdate, || {
            HookPayload::target(role, owner.clone())
        }) {
            return Outcome::Err(e);
        }

        let plan = {
            let Some(t) = self.tracked_collections.get(key) else {
                return Outcome::Err(Error::assertion("collection entry vanished"));
            };
            let Some(descriptor) = self.collections.get(role) else {
                return Outcome::Err(Error::assertion(format!(
                    "no descriptor registered for collection role {role}"
                )));
            };
            let affected = self.filters_affect(descriptor);
            match collection::plan(t, descriptor, affected) {
                Ok(p) => p,
                Err(e) => return Outcome::Err(e),
            }
        };
        tracing::debug!(role, plan = ?plan, "collection mutation plan");

        match &plan {
            MutationPlan::CacheOnly | MutationPlan::NoEffect => {}
            MutationPlan::RemoveAll => {
                match self.backend.remove(cx, role, &owner).await {
                    Outcome::Ok(count) => {
                        tracing::debug!(role, rows = count, "removed collection rows");
                    }
                    Outcome::Err(e) => return Outcome::Err(e),
                    Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                    Outcome::Panicked(p) => return Outcome::Panicked(p),
                }
            }
            MutationPlan::Recreate { remove_first } => {
                if *remove_first {
                    match self.backend.remove(cx, role, &owner).await {
                        Outcome::Ok(count) => {
                            tracing::debug!(role, rows = count, "removed collection rows");
                        }
                        Outcome::Err(e) => return Outcome::Err(e),
                        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                        Outcome::Panicked(p) => return Outcome::Panicked(p),
                    }
                }
                let rows = {
                    let Some(t) = self.tracked_collections.get(key) else {
                        return Outcome::Err(Error::assertion("collection entry vanished"));
                    };
                    t.collection.read().expect("lock poisoned").rows()
                };
                match self.backend.recreate(cx, role, &owner, &rows).await {
                    Outcome::Ok(_) => {}
                    Outcome::Err(e) => return Outcome::Err(e),
                    Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                    Outcome::Panicked(p) => return Outcome::Panicked(p),
                }
            }
            MutationPlan::Rows {
                deletes,
                updates,
                inserts,
            } => {
                if !deletes.is_empty() {
                    match self.backend.delete_rows(cx, role, &owner, deletes).await {
                        Outcome::Ok(_) => {}
                        Outcome::Err(e) => return Outcome::Err(e),
                        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                        Outcome::Panicked(p) => return Outcome::Panicked(p),
                    }
                }
                if !updates.is_empty() {
                    match self.backend.update_rows(cx, role, &owner, updates).await {
                        Outcome::Ok(_) => {}
                        Outcome::Err(e) => return Outcome::Err(e),
                        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                        Outcome::Panicked(p) => return Outcome::Panicked(p),
                    }
                }
                if !inserts.is_empty() {
                    match self.backend.insert_rows(cx, role, &owner, inserts).await {
                        Outcome::Ok(_) => {}
                        Outcome::Err(e) => return Outcome::Err(e),
                        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                        Outcome::Panicked(p) => return Outcome::Panicked(p),
                    }
                }
            }
        }

        if let Outcome::Err(e) =
            self.collection_after_action(key, HookKind::PostCollectionUpdate, role, &owner)
        {
            return Outcome::Err(e);
        }
        if self.statistics.is_enabled() {
            self.statistics.record(ActionKind::CollectionUpdate);
        }
        Outcome::Ok(())
    }

    async fn execute_collection_recreate(
        &mut self,
        cx: &Cx,
        key: &CollectionKey,
    ) -> Outcome<(), Error> {
        let (role, owner, rows) = {
            let Some(t) = self.tracked_collections.get(key) else {
                return Outcome::Err(Error::assertion(
                    "collection recreate targets an untracked collection",
                ));
            };
            let guard = t.collection.read().expect("lock poisoned");
            if !guard.is_initialized() {
                return Outcome::Err(Error::assertion(
                    "cannot recreate an uninitialized collection",
                ));
            }
            (t.role, t.owner.clone(), guard.rows())
        };

        if let Err(e) = self
            .listeners
            .dispatch_with(HookKind::PreCollectionRecreate, || {
                HookPayload::target(role, owner.clone())
            })
        {
            return Outcome::Err(e);
        }

        match self.backend.recreate(cx, role, &owner, &rows).await {
            Outcome::Ok(_) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }

        if let Outcome::Err(e) =
            self.collection_after_action(key, HookKind::PostCollectionRecreate, role, &owner)
        {
            return Outcome::Err(e);
        }
        if self.statistics.is_enabled() {
            self.statistics.record(ActionKind::CollectionRecreate);
        }
        Outcome::Ok(())
    }

    async fn execute_collection_remove(
        &mut self,
        cx: &Cx,
        key: &CollectionKey,
    ) -> Outcome<(), Error> {
        let (role, owner, empty_snapshot) = {
            let Some(t) = self.tracked_collections.get(key) else {
                return Outcome::Err(Error::assertion(
                    "collection remove targets an untracked collection",
                ));
            };
            let empty = matches!(&t.snapshot, Some(rows) if rows.is_empty());
            (t.role, t.owner.clone(), empty)
        };

        if let Err(e) = self
            .listeners
            .dispatch_with(HookKind::PreCollectionRemove, || {
                HookPayload::target(role, owner.clone())
            })
        {
            return Outcome::Err(e);
        }

        if empty_snapshot {
            tracing::trace!(role, "no persisted rows to remove");
        } else {
            match self.backend.remove(cx, role, &owner).await {
                Outcome::Ok(count) => {
                    tracing::debug!(role, rows = count, "removed collection rows");
                }
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }

        {
            let Some(t) = self.tracked_collections.get_mut(key) else {
                return Outcome::Err(Error::assertion("collection entry vanished"));
            };
            t.snapshot = Some(Vec::new());
            t.collection.write().expect("lock poisoned").after_flush();
        }
        self.cache.evict_collection(role, &owner);
        if let Err(e) = self
            .listeners
            .dispatch_with(HookKind::PostCollectionRemove, || {
                HookPayload::target(role, owner.clone())
            })
        {
            return Outcome::Err(e);
        }
        if self.statistics.is_enabled() {
            self.statistics.record(ActionKind::CollectionRemove);
        }
        Outcome::Ok(())
    }

    /// Shared post-effects for collection update/recreate: snapshot refresh,
    /// eviction, post-hook — exactly once per collection per flush, in that
    /// order.
    fn collection_after_action(
        &mut self,
        key: &CollectionKey,
        post_hook: HookKind,
        role: &'static str,
        owner: &Value,
    ) -> Outcome<(), Error> {
        {
            let Some(t) = self.tracked_collections.get_mut(key) else {
                return Outcome::Err(Error::assertion("collection entry vanished"));
            };
            let mut guard = t.collection.write().expect("lock poisoned");
            if guard.is_initialized() {
                t.snapshot = Some(guard.rows());
            }
            guard.after_flush();
        }
        self.cache.evict_collection(role, owner);
        if let Err(e) = self
            .listeners
            .dispatch_with(post_hook, || HookPayload::target(role, owner.clone()))
        {
            return Outcome::Err(e);
        }
        Outcome::Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ekey(name: &'static str, id: i64) -> EntityKey {
        EntityKey::new(name, &Value::BigInt(id))
    }

    fn ckey(role: &'static str, owner: i64) -> CollectionKey {
        CollectionKey::new(role, &Value::BigInt(owner))
    }

    #[test]
    fn test_global_order_across_kinds() {
        let mut q = ActionQueue::new();
        // Enqueue in deliberately scrambled order.
        q.push(ActionOp::EntityDelete { key: ekey("a", 1) });
        q.push(ActionOp::CollectionRecreate { key: ckey("a.xs", 1) });
        q.push(ActionOp::EntityUpdate { key: ekey("a", 2) });
        q.push(ActionOp::EntityInsert { key: ekey("a", 3) });

        let kinds: Vec<ActionKind> = std::iter::from_fn(|| q.next_action())
            .map(|a| a.op().kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                ActionKind::EntityInsert,
                ActionKind::EntityUpdate,
                ActionKind::CollectionRecreate,
                ActionKind::EntityDelete,
            ]
        );
    }

    #[test]
    fn test_enqueue_order_breaks_ties_within_kind() {
        let mut q = ActionQueue::new();
        q.push(ActionOp::EntityInsert { key: ekey("a", 1) });
        q.push(ActionOp::EntityInsert { key: ekey("a", 2) });

        let first = q.next_action().expect("action");
        let second = q.next_action().expect("action");
        assert_eq!(first.op(), &ActionOp::EntityInsert { key: ekey("a", 1) });
        assert_eq!(second.op(), &ActionOp::EntityInsert { key: ekey("a", 2) });
    }

    #[test]
    fn test_unschedule_delete() {
        let mut q = ActionQueue::new();
        q.push(ActionOp::EntityDelete { key: ekey("a", 1) });
        q.push(ActionOp::EntityDelete { key: ekey("a", 2) });

        assert!(q.has_pending_delete(&ekey("a", 1)));
        assert!(q.unschedule_delete(&ekey("a", 1)));
        assert!(!q.has_pending_delete(&ekey("a", 1)));
        assert!(q.has_pending_delete(&ekey("a", 2)));
        assert!(!q.unschedule_delete(&ekey("a", 1)));
    }

    #[test]
    fn test_new_action_starts_pending() {
        let mut q = ActionQueue::new();
        q.push(ActionOp::EntityInsert { key: ekey("a", 1) });
        let a = q.next_action().expect("action");
        assert_eq!(a.state(), ActionState::Pending);
    }

    #[test]
    fn test_has_collection_action_across_buckets() {
        let mut q = ActionQueue::new();
        q.push(ActionOp::CollectionUpdate { key: ckey("a.xs", 1) });
        assert!(q.has_collection_action(&ckey("a.xs", 1)));
        assert!(!q.has_collection_action(&ckey("a.xs", 2)));
    }

    #[test]
    fn test_counts_and_clear() {
        let mut q = ActionQueue::new();
        q.push(ActionOp::EntityInsert { key: ekey("a", 1) });
        q.push(ActionOp::EntityUpdate { key: ekey("a", 1) });
        q.push(ActionOp::CollectionUpdate { key: ckey("a.xs", 1) });

        let counts = q.counts();
        assert_eq!(counts.inserts, 1);
        assert_eq!(counts.updates, 1);
        assert_eq!(counts.collection_updates, 1);
        assert_eq!(counts.total(), 3);

        q.clear();
        assert!(q.is_empty());
    }

    #[test]
    fn test_restore_keeps_failed_action_at_front() {
        let mut q = ActionQueue::new();
        q.push(ActionOp::EntityInsert { key: ekey("a", 1) });
        q.push(ActionOp::EntityInsert { key: ekey("a", 2) });

        let mut failed = q.next_action().expect("action");
        failed.state = ActionState::Failed;
        q.restore(failed);

        let next = q.next_action().expect("action");
        assert_eq!(next.state(), ActionState::Failed);
        assert_eq!(next.op(), &ActionOp::EntityInsert { key: ekey("a", 1) });
    }
}
