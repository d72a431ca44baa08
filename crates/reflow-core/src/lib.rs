//! Core types and service interfaces for the reflow persistence engine.
//!
//! This crate provides the foundational abstractions the engine builds on:
//!
//! - `Entity` trait and shared instance handles
//! - `Value` scalar type for identifiers and row state
//! - Association and descriptor metadata
//! - `Backend` and `CacheRegion` service interfaces
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod association;
pub mod backend;
pub mod collection;
pub mod descriptor;
pub mod entity;
pub mod error;
pub mod value;

pub use association::{
    Association, AssociationInfo, AssociationKind, AssociationTarget, CascadeTypes,
};
pub use backend::{Backend, CacheRegion, IdStrategy, NullCacheRegion};
pub use collection::{CollectionElement, CollectionRef, PersistentCollection};
pub use descriptor::{CollectionDescriptor, EntityDescriptor};
pub use entity::{Entity, EntityRef, InstanceId, entity_ref};
pub use error::{
    AssertionFailure, Error, IdGenerationError, IdGenerationKind, PolicyKind, PolicyViolation,
    Result, StateTransitionError, StateTransitionKind, TransportError,
};
pub use value::Value;
