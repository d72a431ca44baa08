//! Error types for the persistence engine.

use std::fmt;

/// The primary error type for all engine operations.
#[derive(Debug)]
pub enum Error {
    /// An internal invariant was violated; signals a bug in the caller or an
    /// earlier stage. Never retried.
    Assertion(AssertionFailure),
    /// An entity lifecycle transition was rejected (e.g. detached instance
    /// passed to persist). The unit of work stays inspectable.
    StateTransition(StateTransitionError),
    /// An operation was rejected by mapping policy before any I/O.
    Policy(PolicyViolation),
    /// A row-mutation or other backend call failed.
    Transport(TransportError),
    /// Identifier generation failed or the strategy is unsupported.
    IdGeneration(IdGenerationError),
    /// Operation was cancelled via asupersync.
    Cancelled,
    /// Serialization/deserialization errors.
    Serde(String),
    /// Custom error with message.
    Custom(String),
}

/// A broken internal invariant.
#[derive(Debug)]
pub struct AssertionFailure {
    pub message: String,
}

/// A rejected entity lifecycle transition.
#[derive(Debug)]
pub struct StateTransitionError {
    pub kind: StateTransitionKind,
    pub entity_name: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTransitionKind {
    /// A detached instance was passed to persist.
    DetachedPassedToPersist,
    /// An instance scheduled for deletion was passed to merge.
    DeletedPassedToMerge,
    /// A lock was requested on an instance this unit of work does not manage.
    LockOnUnmanaged,
    /// A refresh was requested on an untracked instance.
    RefreshOnUntracked,
}

/// A mapping-policy rejection, raised before any I/O is issued.
#[derive(Debug)]
pub struct PolicyViolation {
    pub kind: PolicyKind,
    pub role: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    /// A recreate-only collection cannot be rewritten while row filters are
    /// enabled: the unfiltered contents are unknowable.
    RecreateUnderFilter,
}

/// A backend (row-mutation service) failure, propagated as-is.
#[derive(Debug)]
pub struct TransportError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// An identifier-generation failure.
#[derive(Debug)]
pub struct IdGenerationError {
    pub kind: IdGenerationKind,
    pub entity_name: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdGenerationKind {
    /// The configured strategy cannot run under non-blocking execution.
    /// This is a legitimate terminal outcome, not a transient fault.
    UnsupportedStrategy,
    /// An assigned-id entity reached the insert path without an identifier.
    MissingAssignedId,
    /// A foreign strategy found no source association to borrow from.
    MissingForeignSource,
    /// The backend id service failed.
    Backend,
}

impl Error {
    /// Build an assertion failure.
    pub fn assertion(message: impl Into<String>) -> Self {
        Error::Assertion(AssertionFailure {
            message: message.into(),
        })
    }

    /// Build a state-transition rejection.
    pub fn state_transition(
        kind: StateTransitionKind,
        entity_name: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Error::StateTransition(StateTransitionError {
            kind,
            entity_name,
            message: message.into(),
        })
    }

    /// Build a policy rejection.
    pub fn policy(kind: PolicyKind, role: &'static str, message: impl Into<String>) -> Self {
        Error::Policy(PolicyViolation {
            kind,
            role,
            message: message.into(),
        })
    }

    /// Build a transport failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport(TransportError {
            message: message.into(),
            source: None,
        })
    }

    /// Build an identifier-generation failure.
    pub fn id_generation(
        kind: IdGenerationKind,
        entity_name: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Error::IdGeneration(IdGenerationError {
            kind,
            entity_name,
            message: message.into(),
        })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Assertion(e) => write!(f, "assertion failure: {}", e.message),
            Error::StateTransition(e) => {
                write!(f, "illegal state transition for {}: {}", e.entity_name, e.message)
            }
            Error::Policy(e) => write!(f, "policy violation on {}: {}", e.role, e.message),
            Error::Transport(e) => write!(f, "transport failure: {}", e.message),
            Error::IdGeneration(e) => {
                write!(f, "id generation failed for {}: {}", e.entity_name, e.message)
            }
            Error::Cancelled => write!(f, "operation cancelled"),
            Error::Serde(msg) => write!(f, "serialization error: {msg}"),
            Error::Custom(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport(e) => e
                .source
                .as_deref()
                .map(|s| s as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

/// Convenience result type alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_assertion() {
        let e = Error::assertion("collection is not dirty");
        assert_eq!(e.to_string(), "assertion failure: collection is not dirty");
    }

    #[test]
    fn test_display_state_transition() {
        let e = Error::state_transition(
            StateTransitionKind::DetachedPassedToPersist,
            "author",
            "detached entity passed to persist",
        );
        assert!(e.to_string().contains("author"));
        assert!(e.to_string().contains("detached"));
    }

    #[test]
    fn test_policy_kind_carried() {
        let e = Error::policy(
            PolicyKind::RecreateUnderFilter,
            "author.tags",
            "cannot recreate collection while filters are enabled",
        );
        match e {
            Error::Policy(p) => assert_eq!(p.kind, PolicyKind::RecreateUnderFilter),
            _ => std::panic::panic_any("expected Policy variant"),
        }
    }

    #[test]
    fn test_id_generation_unsupported_is_terminal_kind() {
        let e = Error::id_generation(
            IdGenerationKind::UnsupportedStrategy,
            "author",
            "strategy not supported under non-blocking execution",
        );
        match e {
            Error::IdGeneration(g) => {
                assert_eq!(g.kind, IdGenerationKind::UnsupportedStrategy);
            }
            _ => std::panic::panic_any("expected IdGeneration variant"),
        }
    }
}
