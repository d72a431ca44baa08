//! Association metadata and live association handles.
//!
//! Metadata is defined at compile time as `&'static` values (const builder
//! style) so the cascade walker can plan without runtime reflection; the
//! live side pairs that metadata with shared handles to the actual targets.

use crate::collection::CollectionRef;
use crate::entity::EntityRef;

/// The shape of an association.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AssociationKind {
    /// Reference to a single entity (many-to-one / one-to-one).
    #[default]
    ToOne,
    /// Collection of entities or elements (one-to-many / element collection).
    ToMany,
}

/// Which cascade actions propagate across an association.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeTypes {
    pub persist: bool,
    pub merge: bool,
    pub delete: bool,
    pub refresh: bool,
    pub lock: bool,
}

impl CascadeTypes {
    /// No cascading.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            persist: false,
            merge: false,
            delete: false,
            refresh: false,
            lock: false,
        }
    }

    /// Every action cascades.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            persist: true,
            merge: true,
            delete: true,
            refresh: true,
            lock: true,
        }
    }

    /// Enable persist cascading.
    #[must_use]
    pub const fn persist(mut self) -> Self {
        self.persist = true;
        self
    }

    /// Enable merge cascading.
    #[must_use]
    pub const fn merge(mut self) -> Self {
        self.merge = true;
        self
    }

    /// Enable delete cascading.
    #[must_use]
    pub const fn delete(mut self) -> Self {
        self.delete = true;
        self
    }

    /// Enable refresh cascading.
    #[must_use]
    pub const fn refresh(mut self) -> Self {
        self.refresh = true;
        self
    }

    /// Enable lock cascading.
    #[must_use]
    pub const fn lock(mut self) -> Self {
        self.lock = true;
        self
    }
}

/// Static metadata about one association of an entity.
#[derive(Debug, Clone, Copy)]
pub struct AssociationInfo {
    /// Name of the association field.
    pub name: &'static str,

    /// The target entity name.
    pub target_entity: &'static str,

    /// Shape of the association.
    pub kind: AssociationKind,

    /// Cascade actions that propagate across this association.
    pub cascades: CascadeTypes,

    /// The owner's identifier is derived from this association's target
    /// (JPA-style derived identity). Persist/merge must cascade here before
    /// the owner is saved so the borrowed key exists.
    pub key_source: bool,

    /// Target rows carry a foreign key to the owner. Delete must cascade
    /// here before deleting the owner, or the constraint would be violated.
    pub constrained: bool,
}

impl AssociationInfo {
    /// Create association metadata with required fields.
    #[must_use]
    pub const fn new(
        name: &'static str,
        target_entity: &'static str,
        kind: AssociationKind,
    ) -> Self {
        Self {
            name,
            target_entity,
            kind,
            cascades: CascadeTypes::none(),
            key_source: false,
            constrained: false,
        }
    }

    /// Set the cascade types.
    #[must_use]
    pub const fn cascades(mut self, cascades: CascadeTypes) -> Self {
        self.cascades = cascades;
        self
    }

    /// Mark this association as the owner's key source.
    #[must_use]
    pub const fn key_source(mut self) -> Self {
        self.key_source = true;
        self
    }

    /// Mark the target as constrained by a foreign key to the owner.
    #[must_use]
    pub const fn constrained(mut self) -> Self {
        self.constrained = true;
        self
    }
}

/// A live association: static metadata plus a handle to the target.
pub struct Association {
    /// The association's mapping metadata.
    pub info: &'static AssociationInfo,
    /// Handle to the current target.
    pub target: AssociationTarget,
}

/// The current target of a live association.
pub enum AssociationTarget {
    /// A single (possibly absent) entity.
    Single(Option<EntityRef>),
    /// A collection handle; may be lazy-uninitialized.
    Collection(CollectionRef),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cascade_builder() {
        const C: CascadeTypes = CascadeTypes::none().persist().delete();
        assert!(C.persist);
        assert!(C.delete);
        assert!(!C.merge);
        assert!(!C.refresh);
    }

    #[test]
    fn test_association_info_builder() {
        const INFO: AssociationInfo =
            AssociationInfo::new("books", "book", AssociationKind::ToMany)
                .cascades(CascadeTypes::all())
                .constrained();
        assert_eq!(INFO.name, "books");
        assert_eq!(INFO.kind, AssociationKind::ToMany);
        assert!(INFO.constrained);
        assert!(!INFO.key_source);
        assert!(INFO.cascades.lock);
    }
}
