//! Snapshot export use-cases.
//!
//! # Responsibility
//! - Render the stored catalog of one category as a `Snapshot` that callers
//!   edit and hand back to reconciliation.
//!
//! # Invariants
//! - Rows are ordered by ascending entity id, columns by attribute variable id.
//! - A missing attribute cell exports as empty text.
//! - Reconciling an unedited export changes nothing.

use crate::model::entity::CategoryId;
use crate::model::snapshot::{Snapshot, SnapshotRow};
use crate::repo::catalog_repo::{CatalogStore, RepoError};
use crate::service::entity_sync::CatalogState;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type SnapshotServiceResult<T> = Result<T, SnapshotServiceError>;

#[derive(Debug)]
pub enum SnapshotServiceError {
    /// No category matches the requested lookup key.
    CategoryNotFound(String),
    Repo(RepoError),
}

impl Display for SnapshotServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CategoryNotFound(what) => write!(f, "category not found: {what}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SnapshotServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CategoryNotFound(_) => None,
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RepoError> for SnapshotServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Export facade over a catalog store handle.
pub struct SnapshotService<S: CatalogStore> {
    store: S,
}

impl<S: CatalogStore> SnapshotService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Exports the category with id `category_id`.
    pub fn export(&self, category_id: CategoryId) -> SnapshotServiceResult<Snapshot> {
        if self.store.get_category(category_id)?.is_none() {
            return Err(SnapshotServiceError::CategoryNotFound(format!(
                "id {category_id}"
            )));
        }
        self.export_unchecked(category_id)
    }

    /// Exports the category named `variable` under statement type id
    /// `statement_type_id`.
    pub fn export_by_type_id(
        &self,
        statement_type_id: i64,
        variable: &str,
    ) -> SnapshotServiceResult<Snapshot> {
        let category = self
            .store
            .find_category_by_type_id(statement_type_id, variable)?
            .ok_or_else(|| {
                SnapshotServiceError::CategoryNotFound(format!(
                    "variable `{variable}` in statement type {statement_type_id}"
                ))
            })?;
        self.export_unchecked(category.id)
    }

    /// Exports the category named `variable` under the statement type
    /// labelled `statement_type`.
    pub fn export_by_names(
        &self,
        statement_type: &str,
        variable: &str,
    ) -> SnapshotServiceResult<Snapshot> {
        let category = self
            .store
            .find_category(statement_type, variable)?
            .ok_or_else(|| {
                SnapshotServiceError::CategoryNotFound(format!(
                    "variable `{variable}` in statement type `{statement_type}`"
                ))
            })?;
        self.export_unchecked(category.id)
    }

    fn export_unchecked(&self, category_id: CategoryId) -> SnapshotServiceResult<Snapshot> {
        let variables = self.store.list_attribute_variables(category_id)?;
        let state = CatalogState::load(&self.store, category_id)?;

        let mut snapshot = Snapshot::new(variables.iter().map(|variable| variable.name.clone()));
        for entity in state.entities() {
            let cells = variables
                .iter()
                .map(|variable| entity.attribute(&variable.name).unwrap_or_default());
            snapshot.rows.push(
                SnapshotRow::new(Some(entity.id), entity.value.clone(), entity.color)
                    .with_attributes(cells),
            );
        }

        info!(
            "event=snapshot_export module=snapshot status=ok category_id={category_id} rows={} columns={}",
            snapshot.len(),
            snapshot.columns.len()
        );
        Ok(snapshot)
    }
}
