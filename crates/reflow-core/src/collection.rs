//! Shared collection handles.
//!
//! A [`PersistentCollection`] is the in-memory side of a mapped collection:
//! its current elements, its initialization flag (lazy collections start
//! uninitialized), and a dirty flag set by mutation. The engine's tracked
//! entry keeps the last-flushed snapshot separately; this type only carries
//! what the owning entity can see.

use crate::entity::EntityRef;
use crate::value::Value;
use std::sync::{Arc, RwLock};

/// One element of a persistent collection.
///
/// `key` is the stable per-row identity used by the diff engine; `payload`
/// is the non-key column state whose change forces a row update. Entity
/// valued collections also carry the element's instance handle so cascades
/// can reach it.
#[derive(Clone)]
pub struct CollectionElement {
    /// Stable row identity within the collection.
    pub key: Value,
    /// Non-key state compared for row updates.
    pub payload: Value,
    /// The element entity, for entity-valued collections.
    pub entity: Option<EntityRef>,
}

impl CollectionElement {
    /// A value element with no entity handle.
    #[must_use]
    pub fn value(key: Value, payload: Value) -> Self {
        Self {
            key,
            payload,
            entity: None,
        }
    }

    /// An entity element.
    #[must_use]
    pub fn entity(key: Value, payload: Value, entity: EntityRef) -> Self {
        Self {
            key,
            payload,
            entity: Some(entity),
        }
    }
}

/// The in-memory state of a mapped collection.
pub struct PersistentCollection {
    role: &'static str,
    initialized: bool,
    dirty: bool,
    elements: Vec<CollectionElement>,
}

/// A shared, mutable handle to a persistent collection.
pub type CollectionRef = Arc<RwLock<PersistentCollection>>;

impl PersistentCollection {
    /// A loaded collection with the given elements.
    #[must_use]
    pub fn initialized(role: &'static str, elements: Vec<CollectionElement>) -> Self {
        Self {
            role,
            initialized: true,
            dirty: false,
            elements,
        }
    }

    /// A lazy collection whose contents have not been fetched.
    #[must_use]
    pub fn uninitialized(role: &'static str) -> Self {
        Self {
            role,
            initialized: false,
            dirty: false,
            elements: Vec::new(),
        }
    }

    /// Wrap into a shared handle.
    #[must_use]
    pub fn into_ref(self) -> CollectionRef {
        Arc::new(RwLock::new(self))
    }

    /// The mapped collection role.
    #[must_use]
    pub fn role(&self) -> &'static str {
        self.role
    }

    /// Whether contents have been fetched.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether in-memory state diverged from the last flush.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Current elements. Empty for an uninitialized collection.
    #[must_use]
    pub fn elements(&self) -> &[CollectionElement] {
        &self.elements
    }

    /// Current (key, payload) rows, for diffing.
    #[must_use]
    pub fn rows(&self) -> Vec<(Value, Value)> {
        self.elements
            .iter()
            .map(|e| (e.key.clone(), e.payload.clone()))
            .collect()
    }

    /// Append an element, marking the collection dirty.
    pub fn add(&mut self, element: CollectionElement) {
        self.elements.push(element);
        self.dirty = true;
    }

    /// Remove elements by row key, marking the collection dirty if any
    /// matched.
    pub fn remove_by_key(&mut self, key: &Value) {
        let before = self.elements.len();
        self.elements.retain(|e| &e.key != key);
        if self.elements.len() != before {
            self.dirty = true;
        }
    }

    /// Replace an element's payload in place, marking the collection dirty.
    pub fn update_payload(&mut self, key: &Value, payload: Value) {
        for e in &mut self.elements {
            if &e.key == key {
                e.payload = payload;
                self.dirty = true;
                return;
            }
        }
    }

    /// Force the dirty flag. Queued mutations against a lazy collection
    /// leave it dirty without ever initializing it.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Populate a lazy collection with fetched elements.
    pub fn initialize(&mut self, elements: Vec<CollectionElement>) {
        self.elements = elements;
        self.initialized = true;
    }

    /// Clear the dirty flag after a flush has applied the contents.
    pub fn after_flush(&mut self) {
        self.dirty = false;
    }
}
