//! Entity lifecycle state classification.
//!
//! Classification is a pure function of what the unit of work already knows:
//! whether a tracking entry exists, what its status is, whether the instance
//! carries an identifier, and whether the mapped identifier strategy lets
//! callers stamp placeholder identifiers onto transient instances. The
//! foreign-strategy clear-and-retry rule and deleted-entry resurrection are
//! driven from the persist path, which re-invokes this function after
//! adjusting its inputs.

use crate::EntityStatus;
use reflow_core::Value;

/// The lifecycle state of an instance relative to one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Never persisted; will be saved.
    Transient,
    /// Tracked and managed by this unit of work.
    Persistent,
    /// Carries an identifier but is unknown to this unit of work.
    Detached,
    /// Tracked, with a deletion already scheduled.
    Deleted,
}

/// Classify an instance.
///
/// `status` is the tracking entry's status, if an entry exists. `id` is the
/// instance's identifier. `allows_placeholder_id` reflects the identifier
/// strategy (an assigned-id mapping treats an externally-set identifier on
/// an untracked instance as transient, not detached).
/// `assume_transient_on_null` controls the untracked-without-identifier
/// case; save paths pass `true`.
#[must_use]
pub fn classify(
    status: Option<EntityStatus>,
    id: Option<&Value>,
    allows_placeholder_id: bool,
    assume_transient_on_null: bool,
) -> EntityState {
    if let Some(status) = status {
        return if status == EntityStatus::Deleted {
            EntityState::Deleted
        } else {
            EntityState::Persistent
        };
    }

    match id {
        None | Some(Value::Null) => {
            if assume_transient_on_null {
                EntityState::Transient
            } else {
                EntityState::Detached
            }
        }
        Some(_) => {
            if allows_placeholder_id {
                EntityState::Transient
            } else {
                EntityState::Detached
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: Value = Value::BigInt(1);

    #[test]
    fn test_tracked_entry_wins_over_identifier() {
        assert_eq!(
            classify(Some(EntityStatus::Managed), Some(&ID), false, true),
            EntityState::Persistent
        );
        assert_eq!(
            classify(Some(EntityStatus::ReadOnly), None, false, true),
            EntityState::Persistent
        );
    }

    #[test]
    fn test_deleted_status_classifies_deleted() {
        assert_eq!(
            classify(Some(EntityStatus::Deleted), Some(&ID), false, true),
            EntityState::Deleted
        );
    }

    #[test]
    fn test_untracked_without_id_is_transient() {
        assert_eq!(classify(None, None, false, true), EntityState::Transient);
        assert_eq!(
            classify(None, Some(&Value::Null), false, true),
            EntityState::Transient
        );
    }

    #[test]
    fn test_untracked_with_id_is_detached() {
        assert_eq!(classify(None, Some(&ID), false, true), EntityState::Detached);
    }

    #[test]
    fn test_placeholder_id_policy_reclassifies_transient() {
        assert_eq!(classify(None, Some(&ID), true, true), EntityState::Transient);
    }

    #[test]
    fn test_no_assumption_without_id() {
        assert_eq!(classify(None, None, false, false), EntityState::Detached);
    }
}
