//! Reconciliation report.
//!
//! # Responsibility
//! - Carry the change counters and before/after totals of one pass.
//! - Render the human-readable change table.
//!
//! # Invariants
//! - A report exists only for passes that reached commit or simulated
//!   rollback; aborted passes produce none.

use crate::model::entity::CategoryId;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// How a finished pass left the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Changes were written.
    Committed,
    /// Changes were computed and rolled back.
    Simulated,
}

/// Store totals for one category at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogCounts {
    pub attribute_variables: i64,
    pub entities: i64,
    /// Dependent references (statement cells) pointing at the category.
    pub dependents: i64,
}

/// Advisory summary of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub category_id: CategoryId,
    pub attribute_variables_added: usize,
    pub attribute_variables_removed: usize,
    pub entities_added: usize,
    pub entities_removed: usize,
    pub entities_renamed: usize,
    pub entities_color_updated: usize,
    /// Duplicate rows or store entities folded into a surviving entity.
    pub entities_merged: usize,
    pub attribute_values_updated: usize,
    /// Dependents whose referenced entity changed its value.
    pub dependents_renamed: i64,
    /// Dependents moved from a merged entity to the surviving one.
    pub dependents_repointed: usize,
    pub counts_before: CatalogCounts,
    pub counts_after: CatalogCounts,
    pub outcome: ReconcileOutcome,
}

impl ReconcileReport {
    pub fn is_committed(&self) -> bool {
        self.outcome == ReconcileOutcome::Committed
    }

    /// Dependents lost through cascading entity deletion.
    pub fn dependents_removed(&self) -> i64 {
        self.counts_before.dependents - self.counts_after.dependents
    }

    /// Returns whether the pass changed anything (or would have, if simulated).
    pub fn has_changes(&self) -> bool {
        self.attribute_variables_added > 0
            || self.attribute_variables_removed > 0
            || self.entities_added > 0
            || self.entities_removed > 0
            || self.entities_renamed > 0
            || self.entities_color_updated > 0
            || self.entities_merged > 0
            || self.attribute_values_updated > 0
    }
}

impl Display for ReconcileReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Recorded changes in entities and attributes:")?;
        writeln!(f)?;
        writeln!(
            f,
            "{:<14}{:>20}{:>12}{:>10}{:>12}",
            "", "Attribute variables", "Attributes", "Entities", "Statements"
        )?;
        let rows: [(&str, String, String, String, String); 7] = [
            (
                "Added",
                self.attribute_variables_added.to_string(),
                "-".to_string(),
                self.entities_added.to_string(),
                "-".to_string(),
            ),
            (
                "Removed",
                self.attribute_variables_removed.to_string(),
                "-".to_string(),
                self.entities_removed.to_string(),
                self.dependents_removed().to_string(),
            ),
            (
                "Merged",
                "-".to_string(),
                "-".to_string(),
                self.entities_merged.to_string(),
                self.dependents_repointed.to_string(),
            ),
            (
                "Value updates",
                "-".to_string(),
                self.attribute_values_updated.to_string(),
                self.entities_renamed.to_string(),
                self.dependents_renamed.to_string(),
            ),
            (
                "Color updates",
                "-".to_string(),
                "-".to_string(),
                self.entities_color_updated.to_string(),
                "-".to_string(),
            ),
            (
                "Num before",
                self.counts_before.attribute_variables.to_string(),
                "-".to_string(),
                self.counts_before.entities.to_string(),
                self.counts_before.dependents.to_string(),
            ),
            (
                "Num after",
                self.counts_after.attribute_variables.to_string(),
                "-".to_string(),
                self.counts_after.entities.to_string(),
                self.counts_after.dependents.to_string(),
            ),
        ];
        for (label, variables, attributes, entities, statements) in rows {
            writeln!(
                f,
                "{label:<14}{variables:>20}{attributes:>12}{entities:>10}{statements:>12}"
            )?;
        }
        writeln!(f)?;
        match self.outcome {
            ReconcileOutcome::Simulated => write!(
                f,
                "All changes were only simulated. The database remains unchanged."
            ),
            ReconcileOutcome::Committed => {
                write!(f, "All changes have been written into the database.")
            }
        }
    }
}
