//! The entity contract and shared instance handles.
//!
//! The engine is deliberately object-safe here: one unit of work tracks
//! heterogeneous entity types, so instances travel as `Arc<RwLock<dyn Entity>>`
//! handles and the trait exposes only flattened state. Identifier and row
//! state are expressed in [`Value`]s; associations are enumerated as live
//! handles paired with static metadata.

use crate::association::Association;
use crate::value::Value;
use std::sync::{Arc, RwLock};

/// A persistable object.
///
/// Implementations flatten their column state into `(name, Value)` pairs and
/// expose their identifier for reading and writing (the engine assigns
/// generated identifiers during persist).
pub trait Entity: Send + Sync {
    /// The mapped entity name, matching a registered descriptor.
    fn entity_name(&self) -> &'static str;

    /// The identifier value, if assigned.
    fn id(&self) -> Option<Value>;

    /// Set or clear the identifier.
    ///
    /// Clearing happens during foreign-strategy re-classification; setting
    /// happens when a generated identifier is bound.
    fn set_id(&mut self, id: Option<Value>);

    /// Flatten the current column state.
    fn state(&self) -> Vec<(&'static str, Value)>;

    /// Enumerate associations as live handles.
    ///
    /// Handles must be stable across calls: returning clones of the same
    /// shared `Arc`s, not fresh copies of the targets.
    fn associations(&self) -> Vec<Association> {
        Vec::new()
    }
}

/// A shared, mutable handle to a tracked entity instance.
pub type EntityRef = Arc<RwLock<dyn Entity>>;

/// Wrap an entity value into a shared handle.
pub fn entity_ref<E: Entity + 'static>(entity: E) -> EntityRef {
    Arc::new(RwLock::new(entity))
}

/// Allocation-based pseudo-identity for an entity instance.
///
/// Stable for the lifetime of the instance and independent of whether an
/// identifier has been assigned yet, which makes it the right key for
/// per-cascade visited sets: a transient node keeps the same identity before
/// and after id generation within one traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(usize);

impl InstanceId {
    /// Derive the pseudo-identity of a shared handle.
    #[must_use]
    pub fn of(entity: &EntityRef) -> Self {
        InstanceId(Arc::as_ptr(entity) as *const () as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe {
        id: Option<Value>,
    }

    impl Entity for Probe {
        fn entity_name(&self) -> &'static str {
            "probe"
        }

        fn id(&self) -> Option<Value> {
            self.id.clone()
        }

        fn set_id(&mut self, id: Option<Value>) {
            self.id = id;
        }

        fn state(&self) -> Vec<(&'static str, Value)> {
            vec![("id", self.id.clone().unwrap_or(Value::Null))]
        }
    }

    #[test]
    fn test_instance_id_stable_across_clones() {
        let a = entity_ref(Probe { id: None });
        let b = Arc::clone(&a);
        assert_eq!(InstanceId::of(&a), InstanceId::of(&b));
    }

    #[test]
    fn test_instance_id_distinct_per_allocation() {
        let a = entity_ref(Probe { id: None });
        let b = entity_ref(Probe { id: None });
        assert_ne!(InstanceId::of(&a), InstanceId::of(&b));
    }

    #[test]
    fn test_instance_id_survives_id_assignment() {
        let a = entity_ref(Probe { id: None });
        let before = InstanceId::of(&a);
        a.write().expect("lock poisoned").set_id(Some(Value::BigInt(9)));
        assert_eq!(before, InstanceId::of(&a));
    }
}
