//! Service interfaces the engine consumes.
//!
//! The engine performs no I/O of its own: every row mutation, identifier
//! generation, and lazy fetch goes through [`Backend`], and every cache
//! interaction through [`CacheRegion`]. All suspending operations take a
//! `Cx` context and return `Outcome` so cancellation propagates through the
//! action chain instead of being swallowed.

use crate::collection::CollectionElement;
use crate::error::Error;
use crate::value::Value;
use asupersync::{Cx, Outcome};

/// How an entity's identifier comes to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStrategy {
    /// The application assigns identifiers before persist.
    Assigned,
    /// The backend generates an identifier on demand.
    Generated,
    /// The identifier is borrowed from an associated entity (derived
    /// identity). `reclassify_detached` opts the strategy into the
    /// clear-and-retry rule when classification first yields detached:
    /// a manually stamped borrowed id is indistinguishable from a real
    /// detached instance until the id is cleared and classification rerun.
    Foreign {
        /// Clear a stamped identifier and re-classify once.
        reclassify_detached: bool,
    },
}

impl IdStrategy {
    /// Whether an externally-set identifier on an untracked instance still
    /// classifies as transient.
    #[must_use]
    pub fn allows_placeholder_id(&self) -> bool {
        matches!(self, IdStrategy::Assigned)
    }
}

/// The asynchronous row-mutation, identifier, and fetch service.
///
/// Entity operations address rows by entity name + identifier; collection
/// operations by role + owner key. Affected-row counts are surfaced where
/// the engine observes them (`remove`), `u64` rows-touched elsewhere.
pub trait Backend: Send + Sync {
    /// Insert one entity row.
    fn insert_entity(
        &self,
        cx: &Cx,
        entity: &'static str,
        id: &Value,
        state: &[(&'static str, Value)],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Update one entity row.
    fn update_entity(
        &self,
        cx: &Cx,
        entity: &'static str,
        id: &Value,
        state: &[(&'static str, Value)],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Delete one entity row.
    fn delete_entity(
        &self,
        cx: &Cx,
        entity: &'static str,
        id: &Value,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Insert collection rows for an owner.
    fn insert_rows(
        &self,
        cx: &Cx,
        role: &'static str,
        owner: &Value,
        rows: &[(Value, Value)],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Update collection rows (matched by row key) for an owner.
    fn update_rows(
        &self,
        cx: &Cx,
        role: &'static str,
        owner: &Value,
        rows: &[(Value, Value)],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Delete collection rows by row key for an owner.
    fn delete_rows(
        &self,
        cx: &Cx,
        role: &'static str,
        owner: &Value,
        keys: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Replace all rows of a collection with the given contents.
    fn recreate(
        &self,
        cx: &Cx,
        role: &'static str,
        owner: &Value,
        rows: &[(Value, Value)],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Remove every row of a collection for an owner, returning the
    /// affected-row count.
    fn remove(
        &self,
        cx: &Cx,
        role: &'static str,
        owner: &Value,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Generate an identifier for an entity about to be inserted.
    ///
    /// Strategies that cannot run under non-blocking execution fail with
    /// `IdGenerationKind::UnsupportedStrategy`; that outcome is terminal.
    fn generate_id(
        &self,
        cx: &Cx,
        entity: &'static str,
    ) -> impl Future<Output = Outcome<Value, Error>> + Send;

    /// Fetch the contents of a lazy collection.
    ///
    /// Only invoked when a cascade action requires full materialization
    /// (delete must reach children even through an uninitialized
    /// collection).
    fn load_collection(
        &self,
        cx: &Cx,
        role: &'static str,
        owner: &Value,
    ) -> impl Future<Output = Outcome<Vec<CollectionElement>, Error>> + Send;
}

/// Synchronous second-level cache interactions, fire-and-forget from the
/// engine's perspective.
pub trait CacheRegion: Send + Sync {
    /// Evict a cached entity.
    fn evict_entity(&self, entity: &'static str, id: &Value);

    /// Evict a cached collection region.
    fn evict_collection(&self, role: &'static str, owner: &Value);
}

/// A cache region that caches nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCacheRegion;

impl CacheRegion for NullCacheRegion {
    fn evict_entity(&self, _entity: &'static str, _id: &Value) {}

    fn evict_collection(&self, _role: &'static str, _owner: &Value) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_policy_per_strategy() {
        assert!(IdStrategy::Assigned.allows_placeholder_id());
        assert!(!IdStrategy::Generated.allows_placeholder_id());
        assert!(
            !IdStrategy::Foreign {
                reclassify_detached: true
            }
            .allows_placeholder_id()
        );
    }
}
