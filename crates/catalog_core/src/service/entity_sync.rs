//! Entity and attribute-value reconciliation.
//!
//! # Responsibility
//! - Capture one consistent read of the stored entities of a category.
//! - Delete stored entities that left the snapshot, insert new rows, update
//!   changed value/color pairs and changed attribute cells.
//!
//! # Invariants
//! - All decisions are taken against the state captured before the first
//!   write of this phase; writes of the phase are never re-read.
//! - A stored entity with an empty value that is absent from the snapshot is
//!   a placeholder and is kept.
//! - Value and color of one entity are written by a single update.

use crate::model::entity::{AttributeVariable, CategoryId, Entity, EntityId};
use crate::model::snapshot::{Snapshot, SnapshotRow};
use crate::repo::catalog_repo::{CatalogStore, RepoResult};
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Point-in-time read of a category's entities with their attribute cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogState {
    entities: BTreeMap<EntityId, Entity>,
}

impl CatalogState {
    /// Reads entities and attribute values of `category_id`.
    ///
    /// Attribute cells pointing at entities outside the listing are logged
    /// and skipped.
    pub fn load<S>(store: &S, category_id: CategoryId) -> RepoResult<Self>
    where
        S: CatalogStore + ?Sized,
    {
        let mut entities: BTreeMap<EntityId, Entity> = store
            .list_entities(category_id)?
            .into_iter()
            .map(|record| (record.id, Entity::from_record(category_id, record)))
            .collect();

        for cell in store.list_attribute_values(category_id)? {
            match entities.get_mut(&cell.entity_id) {
                Some(entity) => {
                    entity.attribute_values.insert(cell.variable_name, cell.value);
                }
                None => warn!(
                    "event=attribute_value_skipped module=reconcile status=skip category_id={category_id} entity_id={} reason=unknown_entity",
                    cell.entity_id
                ),
            }
        }

        Ok(Self { entities })
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Entities ordered by ascending id.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }
}

/// Counters produced by entity reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityChanges {
    pub added: usize,
    pub removed: usize,
    pub renamed: usize,
    pub color_updated: usize,
    pub attribute_values_updated: usize,
    pub dependents_renamed: i64,
}

/// Applies entity-level differences between a pruned snapshot and `state`.
///
/// `snapshot` must already be free of duplicate values and `variables` must
/// be the reloaded variable list of the category.
pub fn sync_entities<S>(
    store: &S,
    category_id: CategoryId,
    snapshot: &Snapshot,
    variables: &[AttributeVariable],
    state: &CatalogState,
) -> RepoResult<EntityChanges>
where
    S: CatalogStore + ?Sized,
{
    let mut changes = EntityChanges::default();
    let cells = CellLookup::new(snapshot, variables, category_id);

    let snapshot_ids: HashSet<EntityId> = snapshot.rows.iter().filter_map(|row| row.id).collect();
    for entity in state.entities() {
        if snapshot_ids.contains(&entity.id) {
            continue;
        }
        if entity.value.is_empty() {
            debug!(
                "event=entity_kept module=reconcile status=skip category_id={category_id} entity_id={} reason=empty_value",
                entity.id
            );
            continue;
        }
        store.delete_entity(entity.id)?;
        changes.removed += 1;
    }

    for row in &snapshot.rows {
        match row.id.and_then(|id| state.get(id)) {
            None => {
                let id = store.insert_entity(category_id, &row.value, row.color)?;
                for variable in variables {
                    store.upsert_attribute_value(id, &variable.name, cells.get(row, variable))?;
                }
                changes.added += 1;
            }
            Some(stored) => {
                update_entity(store, row, stored, &mut changes)?;
                for variable in variables {
                    let wanted = cells.get(row, variable);
                    if stored.attribute(&variable.name) == Some(wanted) {
                        continue;
                    }
                    store.upsert_attribute_value(stored.id, &variable.name, wanted)?;
                    changes.attribute_values_updated += 1;
                }
            }
        }
    }

    Ok(changes)
}

fn update_entity<S>(
    store: &S,
    row: &SnapshotRow,
    stored: &Entity,
    changes: &mut EntityChanges,
) -> RepoResult<()>
where
    S: CatalogStore + ?Sized,
{
    let renamed = row.value != stored.value;
    if !renamed && row.color == stored.color {
        return Ok(());
    }

    store.update_entity(stored.id, &row.value, row.color)?;
    if renamed {
        changes.renamed += 1;
        changes.dependents_renamed += store.count_dependents_referencing(stored.id)?;
    } else {
        changes.color_updated += 1;
    }
    Ok(())
}

/// Maps attribute variables to snapshot cell positions.
pub(crate) struct CellLookup {
    positions: HashMap<String, usize>,
}

impl CellLookup {
    pub(crate) fn new(
        snapshot: &Snapshot,
        variables: &[AttributeVariable],
        category_id: CategoryId,
    ) -> Self {
        let positions: HashMap<String, usize> = snapshot
            .columns
            .iter()
            .enumerate()
            .map(|(index, name)| (name.clone(), index))
            .collect();
        for variable in variables {
            if !positions.contains_key(&variable.name) {
                warn!(
                    "event=attribute_column_missing module=reconcile status=skip category_id={category_id} name={}",
                    variable.name
                );
            }
        }
        Self { positions }
    }

    /// Returns the row's cell for `variable`, or empty text when the
    /// snapshot has no such column.
    pub(crate) fn get<'row>(&self, row: &'row SnapshotRow, variable: &AttributeVariable) -> &'row str {
        self.positions
            .get(&variable.name)
            .and_then(|index| row.attributes.get(*index))
            .map_or("", String::as_str)
    }
}
