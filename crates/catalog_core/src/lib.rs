//! Core domain logic for catalog synchronization.
//! This crate owns the reconciliation rules between edited entity snapshots
//! and the stored catalog.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::entity::{
    AttributeVariable, Category, CategoryId, Color, Entity, EntityId, NEW_ENTITY_ID,
};
pub use model::snapshot::{Snapshot, SnapshotError, SnapshotRow};
pub use repo::catalog_repo::{CatalogStore, RepoError, RepoResult, SqliteCatalogStore};
pub use service::reconcile_service::{
    ReconcileError, ReconcilePhase, ReconcileResult, ReconcileService, TransactionEnd,
};
pub use service::report::{CatalogCounts, ReconcileOutcome, ReconcileReport};
pub use service::snapshot_service::{SnapshotService, SnapshotServiceError, SnapshotServiceResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
