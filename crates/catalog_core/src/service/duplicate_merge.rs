//! Duplicate entity resolution.
//!
//! # Responsibility
//! - Group snapshot rows sharing one `value` (exact, case-sensitive match).
//! - Pick one merge target per group and give it a real store id.
//! - Fold every other member into the target: repoint its dependents, delete
//!   its stored entity and drop its row from the snapshot.
//!
//! # Invariants
//! - At most one entity per value survives; every reference to a folded
//!   entity ends up on the surviving id.
//! - Dependents are repointed before the folded entity is deleted, because
//!   deletion cascades to them.
//! - Stored entities absent from the snapshot but sharing a value with a
//!   group take part as candidates, so a re-typed row keeps the existing id
//!   instead of replacing it. Empty-value placeholders take part only when
//!   no row of the group is stored.

use crate::model::entity::{AttributeVariable, CategoryId, EntityId};
use crate::model::snapshot::{Snapshot, SnapshotRow};
use crate::repo::catalog_repo::{CatalogStore, RepoResult};
use crate::service::entity_sync::{CatalogState, CellLookup};
use log::debug;
use std::collections::{HashMap, HashSet};

/// Ranking inputs of one merge candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeCandidate {
    /// The candidate's id exists in the store.
    pub in_store: bool,
    /// Number of non-empty attribute cells.
    pub filled_attributes: usize,
    /// Color differs from the default black.
    pub has_color: bool,
}

impl MergeCandidate {
    pub fn from_row(row: &SnapshotRow, state: &CatalogState) -> Self {
        Self {
            in_store: row.id.is_some_and(|id| state.contains(id)),
            filled_attributes: row.filled_attribute_count(),
            has_color: !row.color.is_default(),
        }
    }

    /// Returns whether `self` displaces `target` as merge target.
    ///
    /// Store presence decides first, then attribute richness, then a
    /// non-default color when attribute counts tie. Full ties keep `target`.
    pub fn outranks(&self, target: &MergeCandidate) -> bool {
        match (self.in_store, target.in_store) {
            (true, false) => true,
            (false, true) => false,
            _ => {
                self.filled_attributes > target.filled_attributes
                    || (self.filled_attributes == target.filled_attributes
                        && self.has_color
                        && !target.has_color)
            }
        }
    }
}

/// Selects the merge target among `candidates` by stable reduction.
///
/// Returns `None` only for an empty slice.
pub fn select_merge_target(candidates: &[MergeCandidate]) -> Option<usize> {
    if candidates.is_empty() {
        return None;
    }
    let winner = (1..candidates.len()).fold(0, |target, index| {
        if candidates[index].outranks(&candidates[target]) {
            index
        } else {
            target
        }
    });
    Some(winner)
}

/// Counters produced by duplicate resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Groups that needed a freshly inserted target entity.
    pub entities_added: usize,
    /// Rows dropped from the snapshot plus stored entities folded away.
    pub entities_merged: usize,
    /// Store-backed targets whose value was renamed.
    pub entities_renamed: usize,
    pub dependents_renamed: i64,
    pub dependents_repointed: usize,
}

/// Collapses duplicate values in `snapshot` onto one surviving entity each.
///
/// On return the snapshot holds one row per distinct value and every row
/// that was part of a merge carries the surviving store id.
pub fn merge_duplicates<S>(
    store: &S,
    category_id: CategoryId,
    snapshot: &mut Snapshot,
    variables: &[AttributeVariable],
    state: &CatalogState,
) -> RepoResult<MergeOutcome>
where
    S: CatalogStore + ?Sized,
{
    let mut outcome = MergeOutcome::default();
    let cells = CellLookup::new(snapshot, variables, category_id);
    let claimed: HashSet<EntityId> = snapshot.rows.iter().filter_map(|row| row.id).collect();
    let mut discarded = HashSet::new();
    let mut assigned_ids = Vec::new();

    for group in group_by_value(&snapshot.rows) {
        let value = snapshot.rows[group[0]].value.as_str();
        let row_candidates: Vec<MergeCandidate> = group
            .iter()
            .map(|index| MergeCandidate::from_row(&snapshot.rows[*index], state))
            .collect();
        // Empty-value placeholders are only adopted by a group with no stored row.
        let adopts_stored = !value.is_empty()
            || !row_candidates.iter().any(|candidate| candidate.in_store);
        let unclaimed: Vec<EntityId> = if adopts_stored {
            state
                .entities()
                .filter(|entity| entity.value == value && !claimed.contains(&entity.id))
                .map(|entity| entity.id)
                .collect()
        } else {
            Vec::new()
        };
        if group.len() == 1 && unclaimed.is_empty() {
            continue;
        }

        let stored_candidates = unclaimed.iter().map(|id| stored_candidate(*id, state));
        let all_candidates: Vec<MergeCandidate> =
            row_candidates.iter().copied().chain(stored_candidates).collect();

        // The target row carries the data that survives; the target id may
        // come from an unclaimed stored entity that outranks every row.
        let Some(row_winner) = select_merge_target(&row_candidates) else {
            continue;
        };
        let target_row = group[row_winner];
        let overall_winner = select_merge_target(&all_candidates).unwrap_or(row_winner);

        let target_id = if overall_winner >= group.len() {
            unclaimed[overall_winner - group.len()]
        } else if let Some(id) = snapshot.rows[target_row].id.filter(|id| state.contains(*id)) {
            id
        } else {
            let row = &snapshot.rows[target_row];
            let id = store.insert_entity(category_id, &row.value, row.color)?;
            for variable in variables {
                store.upsert_attribute_value(id, &variable.name, cells.get(row, variable))?;
            }
            outcome.entities_added += 1;
            id
        };

        let folded_rows = group.iter().copied().filter(|index| *index != target_row);
        for index in folded_rows {
            if let Some(id) = snapshot.rows[index].id.filter(|id| state.contains(*id)) {
                if id != target_id {
                    outcome.dependents_repointed += fold_entity(store, id, target_id)?;
                }
            }
            discarded.insert(index);
            outcome.entities_merged += 1;
        }
        if let Some(id) = snapshot.rows[target_row].id.filter(|id| state.contains(*id)) {
            if id != target_id {
                outcome.dependents_repointed += fold_entity(store, id, target_id)?;
                outcome.entities_merged += 1;
            }
        }
        for id in unclaimed.iter().copied().filter(|id| *id != target_id) {
            outcome.dependents_repointed += fold_entity(store, id, target_id)?;
            outcome.entities_merged += 1;
        }

        if let Some(stored) = state.get(target_id) {
            let row = &snapshot.rows[target_row];
            if stored.value != row.value {
                store.update_entity(target_id, &row.value, row.color)?;
                outcome.entities_renamed += 1;
                outcome.dependents_renamed += store.count_dependents_referencing(target_id)?;
            }
        }

        debug!(
            "event=duplicates_merged module=reconcile category_id={category_id} target_id={target_id} rows={} stored={}",
            group.len(),
            unclaimed.len()
        );
        assigned_ids.push((target_row, target_id));
    }

    for (index, id) in assigned_ids {
        snapshot.rows[index].id = Some(id);
    }
    let mut index = 0;
    snapshot.rows.retain(|_| {
        let keep = !discarded.contains(&index);
        index += 1;
        keep
    });

    Ok(outcome)
}

/// Moves dependents of `from` onto `into`, then deletes `from`.
fn fold_entity<S>(store: &S, from: EntityId, into: EntityId) -> RepoResult<usize>
where
    S: CatalogStore + ?Sized,
{
    let moved = store.repoint_dependents(from, into)?;
    store.delete_entity(from)?;
    Ok(moved)
}

fn stored_candidate(id: EntityId, state: &CatalogState) -> MergeCandidate {
    match state.get(id) {
        Some(entity) => MergeCandidate {
            in_store: true,
            filled_attributes: entity
                .attribute_values
                .values()
                .filter(|value| !value.is_empty())
                .count(),
            has_color: !entity.color.is_default(),
        },
        None => MergeCandidate {
            in_store: false,
            filled_attributes: 0,
            has_color: false,
        },
    }
}

/// Groups row indices by identical value, in order of first appearance.
fn group_by_value(rows: &[SnapshotRow]) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut by_value: HashMap<&str, usize> = HashMap::new();
    for (index, row) in rows.iter().enumerate() {
        match by_value.get(row.value.as_str()) {
            Some(group) => groups[*group].push(index),
            None => {
                by_value.insert(row.value.as_str(), groups.len());
                groups.push(vec![index]);
            }
        }
    }
    groups
}
