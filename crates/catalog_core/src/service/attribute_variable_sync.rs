//! Attribute-variable (column) reconciliation.
//!
//! # Responsibility
//! - Remove stored attribute variables whose column left the snapshot.
//! - Add attribute variables for new snapshot columns, with an empty cell
//!   for every entity already in the category.
//! - Reload the authoritative variable list for later phases.
//!
//! # Invariants
//! - Removals run before additions, so a rename (remove + add) never
//!   collides on the unique `(category, name)` constraint.
//! - After this phase every existing entity has one cell per variable.

use crate::model::entity::{AttributeVariable, CategoryId};
use crate::repo::catalog_repo::{CatalogStore, RepoResult};
use log::debug;
use std::collections::HashSet;

/// Result of column reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeVariableChanges {
    pub added: usize,
    pub removed: usize,
    /// Current variables, reloaded from the store, ordered by id.
    pub variables: Vec<AttributeVariable>,
}

/// Aligns the stored attribute variables of `category_id` with `columns`.
pub fn sync_attribute_variables<S>(
    store: &S,
    category_id: CategoryId,
    columns: &[String],
) -> RepoResult<AttributeVariableChanges>
where
    S: CatalogStore + ?Sized,
{
    let stored = store.list_attribute_variables(category_id)?;
    let wanted: HashSet<&str> = columns.iter().map(String::as_str).collect();
    let existing: HashSet<&str> = stored.iter().map(|variable| variable.name.as_str()).collect();

    let mut removed = 0;
    for variable in stored.iter().filter(|v| !wanted.contains(v.name.as_str())) {
        store.delete_attribute_variable(category_id, &variable.name)?;
        debug!(
            "event=attribute_variable_removed module=reconcile category_id={category_id} name={}",
            variable.name
        );
        removed += 1;
    }

    let entities = if columns.iter().any(|c| !existing.contains(c.as_str())) {
        store.list_entities(category_id)?
    } else {
        Vec::new()
    };

    let mut added = 0;
    for column in columns.iter().filter(|c| !existing.contains(c.as_str())) {
        store.insert_attribute_variable(category_id, column)?;
        for entity in &entities {
            store.upsert_attribute_value(entity.id, column, "")?;
        }
        debug!(
            "event=attribute_variable_added module=reconcile category_id={category_id} name={column} cells={}",
            entities.len()
        );
        added += 1;
    }

    Ok(AttributeVariableChanges {
        added,
        removed,
        variables: store.list_attribute_variables(category_id)?,
    })
}
