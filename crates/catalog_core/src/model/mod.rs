//! Catalog domain model.
//!
//! # Responsibility
//! - Define the persisted catalog records (attribute variables, entities,
//!   attribute values) shared by the store layer and reconciliation.
//! - Define the tabular snapshot callers edit offline and push back.
//!
//! # Invariants
//! - `value` is the natural key of an entity within one category.
//! - Entity ids are surrogate keys assigned by the store on insert.
//! - Snapshot rows without an id are new and get one only from the store.

pub mod entity;
pub mod snapshot;
