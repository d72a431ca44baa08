//! Mapping descriptors registered with a unit of work.
//!
//! Descriptors answer the synchronous, read-only metadata questions the
//! engine asks: how an entity's identifier is produced, whether a
//! collection can be diffed row-by-row, and which row filters touch it.

use crate::backend::IdStrategy;

/// Per-entity mapping metadata.
#[derive(Debug, Clone, Copy)]
pub struct EntityDescriptor {
    /// The mapped entity name.
    pub entity_name: &'static str,

    /// How identifiers come to exist for this entity.
    pub id_strategy: IdStrategy,
}

impl EntityDescriptor {
    /// Create a descriptor with the given identifier strategy.
    #[must_use]
    pub const fn new(entity_name: &'static str, id_strategy: IdStrategy) -> Self {
        Self {
            entity_name,
            id_strategy,
        }
    }
}

/// Per-collection-role mapping metadata.
#[derive(Debug, Clone, Copy)]
pub struct CollectionDescriptor {
    /// The mapped collection role (e.g. `"author.books"`).
    pub role: &'static str,

    /// Rows have no stable identity; the only safe rewrite is delete-all
    /// followed by full reinsertion.
    pub recreate_only: bool,

    /// Names of row filters that restrict this collection when enabled.
    pub filters: &'static [&'static str],
}

impl CollectionDescriptor {
    /// Create a descriptor for a row-diffable collection.
    #[must_use]
    pub const fn new(role: &'static str) -> Self {
        Self {
            role,
            recreate_only: false,
            filters: &[],
        }
    }

    /// Mark the collection as recreate-only.
    #[must_use]
    pub const fn recreate_only(mut self) -> Self {
        self.recreate_only = true;
        self
    }

    /// Declare the row filters that apply to this collection.
    #[must_use]
    pub const fn filters(mut self, filters: &'static [&'static str]) -> Self {
        self.filters = filters;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_descriptor_builder() {
        const D: CollectionDescriptor = CollectionDescriptor::new("author.tags")
            .recreate_only()
            .filters(&["tenant"]);
        assert_eq!(D.role, "author.tags");
        assert!(D.recreate_only);
        assert_eq!(D.filters, &["tenant"]);
    }

    #[test]
    fn test_entity_descriptor() {
        const D: EntityDescriptor = EntityDescriptor::new("author", IdStrategy::Generated);
        assert_eq!(D.entity_name, "author");
        assert_eq!(D.id_strategy, IdStrategy::Generated);
    }
}
