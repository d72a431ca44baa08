//! Collection tracking and the mutation-plan decision table.
//!
//! A [`TrackedCollection`] pairs a shared collection handle with the
//! last-flushed snapshot owned by the unit of work. [`plan`] turns that pair
//! into the cheapest correct rewrite: nothing, a cache-only touch, a bulk
//! removal, a full recreation, or a row-level delete/update/insert set.

use crate::hash_value;
use reflow_core::{CollectionDescriptor, CollectionRef, Error, PolicyKind, Result, Value};
use std::collections::HashMap;

/// A collection tracked by one unit of work.
pub struct TrackedCollection {
    /// The mapped collection role.
    pub role: &'static str,
    /// The owning entity's identifier.
    pub owner: Value,
    /// Last-flushed `(key, payload)` rows; `None` when the collection has
    /// never been loaded or written by this unit of work.
    pub snapshot: Option<Vec<(Value, Value)>>,
    /// Handle to the in-memory collection.
    pub collection: CollectionRef,
}

impl TrackedCollection {
    /// Whether a non-empty persisted snapshot exists.
    #[must_use]
    pub fn has_persisted_rows(&self) -> bool {
        matches!(&self.snapshot, Some(rows) if !rows.is_empty())
    }
}

/// The decided rewrite for one collection in one flush.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationPlan {
    /// Uninitialized but dirty: nothing to write, only the cached copy is
    /// stale.
    CacheOnly,
    /// No rows changed. Named outcome: the empty-to-empty transition is a
    /// success, not a discarded result.
    NoEffect,
    /// Delete every persisted row for the owner.
    RemoveAll,
    /// Delete everything (if anything was persisted), then reinsert the
    /// full current contents.
    Recreate {
        /// A persisted snapshot exists and must be removed first.
        remove_first: bool,
    },
    /// Row-level rewrite. Deletions apply first, then updates, then
    /// insertions, so reordering within the same key space cannot collide.
    Rows {
        deletes: Vec<Value>,
        updates: Vec<(Value, Value)>,
        inserts: Vec<(Value, Value)>,
    },
}

/// Decide the mutation plan for one tracked collection.
///
/// The branches are evaluated in fixed priority order; every error is
/// raised before any I/O would be issued.
#[allow(clippy::result_large_err)]
pub fn plan(
    tracked: &TrackedCollection,
    descriptor: &CollectionDescriptor,
    affected_by_filters: bool,
) -> Result<MutationPlan> {
    let guard = tracked.collection.read().expect("lock poisoned");

    if !guard.is_initialized() {
        // Queued mutations were already folded in upstream; reaching the
        // diff stage uninitialized is only legal for a dirty collection.
        if !guard.is_dirty() {
            return Err(Error::assertion(format!(
                "uninitialized clean collection {} reached the diff stage",
                tracked.role
            )));
        }
        return Ok(MutationPlan::CacheOnly);
    }

    let current = guard.rows();

    if !affected_by_filters && current.is_empty() {
        return Ok(if tracked.has_persisted_rows() {
            MutationPlan::RemoveAll
        } else {
            MutationPlan::NoEffect
        });
    }

    if descriptor.recreate_only {
        if affected_by_filters {
            // Filtered reads hide rows; recreating from the visible subset
            // would silently destroy the hidden ones.
            return Err(Error::policy(
                PolicyKind::RecreateUnderFilter,
                tracked.role,
                "cannot recreate collection while row filters are enabled",
            ));
        }
        return Ok(MutationPlan::Recreate {
            remove_first: tracked.has_persisted_rows(),
        });
    }

    let snapshot = tracked.snapshot.as_deref().unwrap_or(&[]);
    Ok(diff_rows(snapshot, &current))
}

/// Three-way diff between snapshot and current rows, keyed by row identity.
fn diff_rows(snapshot: &[(Value, Value)], current: &[(Value, Value)]) -> MutationPlan {
    let snapshot_by_key: HashMap<u64, &(Value, Value)> = snapshot
        .iter()
        .map(|row| (hash_value(&row.0), row))
        .collect();
    let current_keys: std::collections::HashSet<u64> =
        current.iter().map(|row| hash_value(&row.0)).collect();

    let deletes: Vec<Value> = snapshot
        .iter()
        .filter(|row| !current_keys.contains(&hash_value(&row.0)))
        .map(|row| row.0.clone())
        .collect();

    let mut updates = Vec::new();
    let mut inserts = Vec::new();
    for row in current {
        match snapshot_by_key.get(&hash_value(&row.0)) {
            Some(old) => {
                if old.1 != row.1 {
                    updates.push(row.clone());
                }
            }
            None => inserts.push(row.clone()),
        }
    }

    if deletes.is_empty() && updates.is_empty() && inserts.is_empty() {
        MutationPlan::NoEffect
    } else {
        MutationPlan::Rows {
            deletes,
            updates,
            inserts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflow_core::{CollectionElement, PersistentCollection};

    fn element(k: i64, p: &str) -> CollectionElement {
        CollectionElement::value(Value::BigInt(k), Value::Text(p.into()))
    }

    fn tracked(
        role: &'static str,
        snapshot: Option<Vec<(i64, &str)>>,
        current: Vec<CollectionElement>,
    ) -> TrackedCollection {
        TrackedCollection {
            role,
            owner: Value::BigInt(1),
            snapshot: snapshot.map(|rows| {
                rows.into_iter()
                    .map(|(k, p)| (Value::BigInt(k), Value::Text(p.into())))
                    .collect()
            }),
            collection: PersistentCollection::initialized(role, current).into_ref(),
        }
    }

    const PLAIN: CollectionDescriptor = CollectionDescriptor::new("author.books");
    const RECREATE_ONLY: CollectionDescriptor = CollectionDescriptor::new("author.tags")
        .recreate_only()
        .filters(&["tenant"]);

    #[test]
    fn test_uninitialized_dirty_is_cache_only() {
        let mut coll = PersistentCollection::uninitialized("author.books");
        coll.mark_dirty();
        let t = TrackedCollection {
            role: "author.books",
            owner: Value::BigInt(1),
            snapshot: None,
            collection: coll.into_ref(),
        };
        assert_eq!(plan(&t, &PLAIN, false).expect("plan"), MutationPlan::CacheOnly);
    }

    #[test]
    fn test_uninitialized_clean_is_assertion_failure() {
        let t = TrackedCollection {
            role: "author.books",
            owner: Value::BigInt(1),
            snapshot: None,
            collection: PersistentCollection::uninitialized("author.books").into_ref(),
        };
        match plan(&t, &PLAIN, false) {
            Err(Error::Assertion(_)) => {}
            other => std::panic::panic_any(format!("expected assertion failure, got {other:?}")),
        }
    }

    #[test]
    fn test_emptied_collection_removes_all() {
        let t = tracked("author.books", Some(vec![(1, "a")]), vec![]);
        assert_eq!(plan(&t, &PLAIN, false).expect("plan"), MutationPlan::RemoveAll);
    }

    #[test]
    fn test_empty_to_empty_is_named_no_effect() {
        let t = tracked("author.books", Some(vec![]), vec![]);
        assert_eq!(plan(&t, &PLAIN, false).expect("plan"), MutationPlan::NoEffect);
        let t = tracked("author.books", None, vec![]);
        assert_eq!(plan(&t, &PLAIN, false).expect("plan"), MutationPlan::NoEffect);
    }

    #[test]
    fn test_recreate_only_plans_recreation() {
        let t = TrackedCollection {
            role: "author.tags",
            owner: Value::BigInt(1),
            snapshot: Some(vec![(Value::BigInt(1), Value::Text("old".into()))]),
            collection: PersistentCollection::initialized("author.tags", vec![element(2, "new")])
                .into_ref(),
        };
        assert_eq!(
            plan(&t, &RECREATE_ONLY, false).expect("plan"),
            MutationPlan::Recreate { remove_first: true }
        );
    }

    #[test]
    fn test_recreate_without_snapshot_skips_removal() {
        let t = TrackedCollection {
            role: "author.tags",
            owner: Value::BigInt(1),
            snapshot: None,
            collection: PersistentCollection::initialized("author.tags", vec![element(1, "a")])
                .into_ref(),
        };
        assert_eq!(
            plan(&t, &RECREATE_ONLY, false).expect("plan"),
            MutationPlan::Recreate {
                remove_first: false
            }
        );
    }

    #[test]
    fn test_recreate_under_filter_is_policy_violation() {
        let t = TrackedCollection {
            role: "author.tags",
            owner: Value::BigInt(1),
            snapshot: Some(vec![]),
            collection: PersistentCollection::initialized("author.tags", vec![element(1, "a")])
                .into_ref(),
        };
        match plan(&t, &RECREATE_ONLY, true) {
            Err(Error::Policy(p)) => assert_eq!(p.kind, PolicyKind::RecreateUnderFilter),
            other => std::panic::panic_any(format!("expected policy violation, got {other:?}")),
        }
    }

    #[test]
    fn test_row_diff_orders_delete_update_insert() {
        // snapshot {1,2,3}, current {2,3,4} with 2's payload changed
        let t = tracked(
            "author.books",
            Some(vec![(1, "one"), (2, "two"), (3, "three")]),
            vec![element(2, "two!"), element(3, "three"), element(4, "four")],
        );
        match plan(&t, &PLAIN, false).expect("plan") {
            MutationPlan::Rows {
                deletes,
                updates,
                inserts,
            } => {
                assert_eq!(deletes, vec![Value::BigInt(1)]);
                assert_eq!(
                    updates,
                    vec![(Value::BigInt(2), Value::Text("two!".into()))]
                );
                assert_eq!(
                    inserts,
                    vec![(Value::BigInt(4), Value::Text("four".into()))]
                );
            }
            other => std::panic::panic_any(format!("expected row plan, got {other:?}")),
        }
    }

    #[test]
    fn test_unchanged_rows_produce_no_effect() {
        let t = tracked(
            "author.books",
            Some(vec![(1, "a"), (2, "b")]),
            vec![element(1, "a"), element(2, "b")],
        );
        assert_eq!(plan(&t, &PLAIN, false).expect("plan"), MutationPlan::NoEffect);
    }

    #[test]
    fn test_diff_converges_after_snapshot_refresh() {
        // Applying the plan and re-snapshotting must yield an empty plan.
        let t = tracked(
            "author.books",
            Some(vec![(1, "one"), (2, "two")]),
            vec![element(2, "two"), element(3, "three")],
        );
        let first = plan(&t, &PLAIN, false).expect("plan");
        assert!(matches!(first, MutationPlan::Rows { .. }));

        let refreshed_rows = t.collection.read().expect("lock poisoned").rows();
        let converged = TrackedCollection {
            role: t.role,
            owner: t.owner.clone(),
            snapshot: Some(refreshed_rows),
            collection: t.collection,
        };
        assert_eq!(
            plan(&converged, &PLAIN, false).expect("plan"),
            MutationPlan::NoEffect
        );
    }

    #[test]
    fn test_filtered_collection_keeps_row_diff() {
        // Filters block the empty shortcut and recreation, not row diffs.
        let t = tracked("author.books", Some(vec![(1, "a")]), vec![element(1, "b")]);
        match plan(&t, &PLAIN, true).expect("plan") {
            MutationPlan::Rows { updates, .. } => {
                assert_eq!(updates.len(), 1);
            }
            other => std::panic::panic_any(format!("expected row plan, got {other:?}")),
        }
    }
}
