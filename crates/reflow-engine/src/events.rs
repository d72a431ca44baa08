//! Lifecycle hook dispatch.
//!
//! Hooks fire synchronously at fixed points in the action chain: the pre
//! hook immediately before an action's asynchronous body, the post hook
//! after the body and tracking refresh. Listeners are plain synchronous
//! callbacks; anything that needs further persistence work must enqueue new
//! actions rather than suspending inline, so the scheduler's chain stays
//! complete.
//!
//! Dispatch sits on the hot path of every mutation, so the no-listener case
//! is an explicit fast path: the group is checked for emptiness before the
//! payload is even built.

use reflow_core::{Error, Value};

/// The notification points the engine fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    /// Before the flush cycle starts.
    PreFlush,
    /// After the flush cycle completes successfully.
    PostFlush,
    /// Before/after an entity insert.
    PreInsert,
    PostInsert,
    /// Before/after an entity update.
    PreUpdate,
    PostUpdate,
    /// Before/after an entity delete.
    PreDelete,
    PostDelete,
    /// Before/after a collection row-level update cycle.
    PreCollectionUpdate,
    PostCollectionUpdate,
    /// Before/after a collection recreation.
    PreCollectionRecreate,
    PostCollectionRecreate,
    /// Before/after a collection removal.
    PreCollectionRemove,
    PostCollectionRemove,
}

impl HookKind {
    pub(crate) const COUNT: usize = 14;

    fn index(self) -> usize {
        match self {
            HookKind::PreFlush => 0,
            HookKind::PostFlush => 1,
            HookKind::PreInsert => 2,
            HookKind::PostInsert => 3,
            HookKind::PreUpdate => 4,
            HookKind::PostUpdate => 5,
            HookKind::PreDelete => 6,
            HookKind::PostDelete => 7,
            HookKind::PreCollectionUpdate => 8,
            HookKind::PostCollectionUpdate => 9,
            HookKind::PreCollectionRecreate => 10,
            HookKind::PostCollectionRecreate => 11,
            HookKind::PreCollectionRemove => 12,
            HookKind::PostCollectionRemove => 13,
        }
    }
}

/// What a listener sees: the entity name (or collection role) and the
/// identifier (or owner key) of the mutation target.
#[derive(Debug, Clone)]
pub struct HookPayload {
    /// Entity name or collection role; empty for flush-level hooks.
    pub name: &'static str,
    /// Entity identifier or collection owner key; NULL for flush-level hooks.
    pub key: Value,
}

impl HookPayload {
    /// Payload for an entity or collection mutation hook.
    #[must_use]
    pub fn target(name: &'static str, key: Value) -> Self {
        Self { name, key }
    }

    /// Payload for a flush-level hook.
    #[must_use]
    pub fn flush() -> Self {
        Self {
            name: "",
            key: Value::Null,
        }
    }
}

/// Type alias for hook callbacks.
///
/// Returning `Err` aborts the surrounding operation.
type HookFn = Box<dyn FnMut(&HookPayload) -> Result<(), Error> + Send>;

/// Holds registered listeners, ordered per hook kind.
pub struct ListenerRegistry {
    groups: [Vec<HookFn>; HookKind::COUNT],
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("registered", &self.groups.iter().map(Vec::len).sum::<usize>())
            .finish()
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self {
            groups: std::array::from_fn(|_| Vec::new()),
        }
    }
}

impl ListenerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for a hook kind. Listeners fire in registration
    /// order.
    pub fn register(
        &mut self,
        kind: HookKind,
        f: impl FnMut(&HookPayload) -> Result<(), Error> + Send + 'static,
    ) {
        self.groups[kind.index()].push(Box::new(f));
    }

    /// Whether any listener is registered for a hook kind.
    #[must_use]
    pub fn has_listeners(&self, kind: HookKind) -> bool {
        !self.groups[kind.index()].is_empty()
    }

    /// Dispatch a hook, building the payload only if a listener exists.
    #[allow(clippy::result_large_err)]
    pub fn dispatch_with<F>(&mut self, kind: HookKind, make: F) -> Result<(), Error>
    where
        F: FnOnce() -> HookPayload,
    {
        let group = &mut self.groups[kind.index()];
        if group.is_empty() {
            return Ok(());
        }
        let payload = make();
        for cb in group.iter_mut() {
            cb(&payload)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_empty_registry_skips_payload_construction() {
        let mut reg = ListenerRegistry::new();
        let result = reg.dispatch_with(HookKind::PreInsert, || {
            std::panic::panic_any("payload must not be built without listeners")
        });
        assert!(result.is_ok());
    }

    #[test]
    fn test_listeners_fire_in_registration_order() {
        let mut reg = ListenerRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            reg.register(HookKind::PostInsert, move |_| {
                order.lock().expect("lock poisoned").push(tag);
                Ok(())
            });
        }

        reg.dispatch_with(HookKind::PostInsert, HookPayload::flush)
            .expect("dispatch");
        assert_eq!(
            *order.lock().expect("lock poisoned"),
            vec!["first", "second", "third"]
        );
    }

    #[test]
    fn test_listener_error_aborts_dispatch() {
        let mut reg = ListenerRegistry::new();
        let fired = Arc::new(Mutex::new(0_u32));

        {
            let fired = Arc::clone(&fired);
            reg.register(HookKind::PreDelete, move |_| {
                *fired.lock().expect("lock poisoned") += 1;
                Err(Error::Custom("veto".into()))
            });
        }
        {
            let fired = Arc::clone(&fired);
            reg.register(HookKind::PreDelete, move |_| {
                *fired.lock().expect("lock poisoned") += 1;
                Ok(())
            });
        }

        let result = reg.dispatch_with(HookKind::PreDelete, HookPayload::flush);
        assert!(result.is_err());
        assert_eq!(*fired.lock().expect("lock poisoned"), 1);
    }

    #[test]
    fn test_kinds_are_isolated() {
        let mut reg = ListenerRegistry::new();
        reg.register(HookKind::PreInsert, |_| Ok(()));
        assert!(reg.has_listeners(HookKind::PreInsert));
        assert!(!reg.has_listeners(HookKind::PostInsert));
    }

    #[test]
    fn test_payload_carries_target() {
        let mut reg = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(None));
        {
            let seen = Arc::clone(&seen);
            reg.register(HookKind::PostUpdate, move |p| {
                *seen.lock().expect("lock poisoned") = Some((p.name, p.key.clone()));
                Ok(())
            });
        }
        reg.dispatch_with(HookKind::PostUpdate, || {
            HookPayload::target("author", Value::BigInt(7))
        })
        .expect("dispatch");
        assert_eq!(
            *seen.lock().expect("lock poisoned"),
            Some(("author", Value::BigInt(7)))
        );
    }
}
