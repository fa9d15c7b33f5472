//! Store access layer for entity catalogs.
//!
//! # Responsibility
//! - Define the narrow read/write contract reconciliation runs against.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Store handles are passed explicitly; there is no process-wide connection.
//! - Deleting an entity cascades to its attribute values and dependent
//!   references, so merges must repoint dependents first.

pub mod catalog_repo;
