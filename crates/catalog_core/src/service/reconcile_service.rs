//! Reconciliation use-case service.
//!
//! # Responsibility
//! - Validate the snapshot and resolve the category before touching data.
//! - Run column sync, duplicate merge and entity sync inside one transaction.
//! - Commit, or roll back when simulating, and report before/after totals.
//!
//! # Invariants
//! - Phases run in the fixed order columns -> duplicates -> entities.
//! - Every exit path ends the transaction; a failed pass leaves no write
//!   behind and yields no report.
//! - Each call is independent; nothing carries over between passes.

use crate::model::entity::CategoryId;
use crate::model::snapshot::{Snapshot, SnapshotError};
use crate::repo::catalog_repo::{CatalogStore, RepoError, RepoResult};
use crate::service::attribute_variable_sync::sync_attribute_variables;
use crate::service::duplicate_merge::merge_duplicates;
use crate::service::entity_sync::{sync_entities, CatalogState};
use crate::service::report::{CatalogCounts, ReconcileOutcome, ReconcileReport};
use log::{debug, error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// How the transaction of a finished pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionEnd {
    Committed,
    RolledBack,
}

/// Progress of one reconciliation pass; entered strictly in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePhase {
    Started,
    AttributeVariablesReconciled,
    EntitiesDeduplicated,
    EntitiesReconciled,
    Finished(TransactionEnd),
}

impl Display for ReconcilePhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Started => "started",
            Self::AttributeVariablesReconciled => "attribute_variables_reconciled",
            Self::EntitiesDeduplicated => "entities_deduplicated",
            Self::EntitiesReconciled => "entities_reconciled",
            Self::Finished(TransactionEnd::Committed) => "committed",
            Self::Finished(TransactionEnd::RolledBack) => "rolled_back",
        };
        f.write_str(name)
    }
}

/// Errors from reconciliation use-cases.
#[derive(Debug)]
pub enum ReconcileError {
    /// Category (or statement type/variable name) cannot be resolved.
    /// Raised before any transaction is opened.
    ConfigurationNotFound(String),
    /// Snapshot violates a structural precondition; nothing was attempted.
    MalformedSnapshot(SnapshotError),
    /// Store failure before the transaction opened.
    Store(RepoError),
    /// Store failure inside the transaction; all writes were rolled back.
    /// `phase` is the last phase the pass completed.
    Aborted {
        phase: ReconcilePhase,
        source: RepoError,
    },
}

impl Display for ReconcileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConfigurationNotFound(what) => write!(f, "configuration not found: {what}"),
            Self::MalformedSnapshot(err) => write!(f, "malformed snapshot: {err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Aborted { phase, source } => write!(
                f,
                "reconciliation rolled back after phase `{phase}`: {source}"
            ),
        }
    }
}

impl Error for ReconcileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ConfigurationNotFound(_) => None,
            Self::MalformedSnapshot(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Aborted { source, .. } => Some(source),
        }
    }
}

impl From<SnapshotError> for ReconcileError {
    fn from(value: SnapshotError) -> Self {
        Self::MalformedSnapshot(value)
    }
}

impl From<RepoError> for ReconcileError {
    fn from(value: RepoError) -> Self {
        Self::Store(value)
    }
}

/// Reconciliation facade over a catalog store handle.
pub struct ReconcileService<S: CatalogStore> {
    store: S,
}

impl<S: CatalogStore> ReconcileService<S> {
    /// Creates a service using the provided store handle.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Reconciles a category resolved from statement type label and
    /// variable name.
    pub fn reconcile_by_names(
        &self,
        statement_type: &str,
        variable: &str,
        snapshot: &Snapshot,
        simulate: bool,
    ) -> ReconcileResult<ReconcileReport> {
        let category = self
            .store
            .find_category(statement_type, variable)?
            .ok_or_else(|| {
                ReconcileError::ConfigurationNotFound(format!(
                    "variable `{variable}` in statement type `{statement_type}`"
                ))
            })?;
        self.reconcile(category.id, snapshot, simulate)
    }

    /// Makes the stored catalog of `category_id` match `snapshot`.
    ///
    /// With `simulate` the full pass runs and is then rolled back; the
    /// report still describes what would have changed.
    ///
    /// # Errors
    /// - `MalformedSnapshot` / `ConfigurationNotFound` before any write.
    /// - `Aborted` when a store call fails mid-pass; nothing is persisted.
    pub fn reconcile(
        &self,
        category_id: CategoryId,
        snapshot: &Snapshot,
        simulate: bool,
    ) -> ReconcileResult<ReconcileReport> {
        snapshot.validate()?;
        if self.store.get_category(category_id)?.is_none() {
            return Err(ReconcileError::ConfigurationNotFound(format!(
                "category {category_id}"
            )));
        }

        let started_at = Instant::now();
        info!(
            "event=reconcile module=reconcile status=start category_id={category_id} simulate={simulate} rows={} columns={}",
            snapshot.len(),
            snapshot.columns.len()
        );

        let mut phase = ReconcilePhase::Started;
        let result = self.run_transaction(category_id, snapshot, simulate, &mut phase);
        match &result {
            Ok(report) => info!(
                "event=reconcile module=reconcile status=ok category_id={category_id} simulate={simulate} phase={phase} changed={} duration_ms={}",
                report.has_changes(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=reconcile module=reconcile status=error category_id={category_id} simulate={simulate} phase={phase} duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    fn run_transaction(
        &self,
        category_id: CategoryId,
        snapshot: &Snapshot,
        simulate: bool,
        phase: &mut ReconcilePhase,
    ) -> ReconcileResult<ReconcileReport> {
        let abort = |phase: ReconcilePhase| {
            move |source: RepoError| ReconcileError::Aborted { phase, source }
        };

        let guard = TransactionGuard::begin(&self.store).map_err(abort(*phase))?;
        let tally = run_phases(&self.store, category_id, snapshot, phase).map_err(abort(*phase))?;
        let counts_after = read_counts(&self.store, category_id).map_err(abort(*phase))?;

        let (outcome, end) = if simulate {
            guard.rollback().map_err(abort(*phase))?;
            (ReconcileOutcome::Simulated, TransactionEnd::RolledBack)
        } else {
            guard.commit().map_err(abort(*phase))?;
            (ReconcileOutcome::Committed, TransactionEnd::Committed)
        };
        advance(phase, ReconcilePhase::Finished(end), category_id);

        Ok(tally.into_report(category_id, counts_after, outcome))
    }
}

/// Counters accumulated across the phases of one pass.
#[derive(Debug, Default)]
struct PassTally {
    counts_before: CatalogCounts,
    attribute_variables_added: usize,
    attribute_variables_removed: usize,
    entities_added: usize,
    entities_removed: usize,
    entities_renamed: usize,
    entities_color_updated: usize,
    entities_merged: usize,
    attribute_values_updated: usize,
    dependents_renamed: i64,
    dependents_repointed: usize,
}

impl PassTally {
    fn into_report(
        self,
        category_id: CategoryId,
        counts_after: CatalogCounts,
        outcome: ReconcileOutcome,
    ) -> ReconcileReport {
        ReconcileReport {
            category_id,
            attribute_variables_added: self.attribute_variables_added,
            attribute_variables_removed: self.attribute_variables_removed,
            entities_added: self.entities_added,
            entities_removed: self.entities_removed,
            entities_renamed: self.entities_renamed,
            entities_color_updated: self.entities_color_updated,
            entities_merged: self.entities_merged,
            attribute_values_updated: self.attribute_values_updated,
            dependents_renamed: self.dependents_renamed,
            dependents_repointed: self.dependents_repointed,
            counts_before: self.counts_before,
            counts_after,
            outcome,
        }
    }
}

fn run_phases<S>(
    store: &S,
    category_id: CategoryId,
    snapshot: &Snapshot,
    phase: &mut ReconcilePhase,
) -> RepoResult<PassTally>
where
    S: CatalogStore + ?Sized,
{
    let mut tally = PassTally {
        counts_before: read_counts(store, category_id)?,
        ..PassTally::default()
    };

    let columns = sync_attribute_variables(store, category_id, &snapshot.columns)?;
    tally.attribute_variables_added = columns.added;
    tally.attribute_variables_removed = columns.removed;
    advance(phase, ReconcilePhase::AttributeVariablesReconciled, category_id);

    let mut working = snapshot.clone();
    let state = CatalogState::load(store, category_id)?;
    let merged = merge_duplicates(store, category_id, &mut working, &columns.variables, &state)?;
    tally.entities_added += merged.entities_added;
    tally.entities_merged = merged.entities_merged;
    tally.entities_renamed += merged.entities_renamed;
    tally.dependents_renamed += merged.dependents_renamed;
    tally.dependents_repointed = merged.dependents_repointed;
    advance(phase, ReconcilePhase::EntitiesDeduplicated, category_id);

    let state = CatalogState::load(store, category_id)?;
    let entities = sync_entities(store, category_id, &working, &columns.variables, &state)?;
    tally.entities_added += entities.added;
    tally.entities_removed = entities.removed;
    tally.entities_renamed += entities.renamed;
    tally.entities_color_updated = entities.color_updated;
    tally.attribute_values_updated = entities.attribute_values_updated;
    tally.dependents_renamed += entities.dependents_renamed;
    advance(phase, ReconcilePhase::EntitiesReconciled, category_id);

    Ok(tally)
}

fn read_counts<S>(store: &S, category_id: CategoryId) -> RepoResult<CatalogCounts>
where
    S: CatalogStore + ?Sized,
{
    Ok(CatalogCounts {
        attribute_variables: store.count_attribute_variables(category_id)?,
        entities: store.count_entities(category_id)?,
        dependents: store.count_dependents_for_category(category_id)?,
    })
}

fn advance(phase: &mut ReconcilePhase, next: ReconcilePhase, category_id: CategoryId) {
    debug!(
        "event=reconcile_phase module=reconcile category_id={category_id} from={phase} to={next}"
    );
    *phase = next;
}

/// Scoped transaction: rolls back on drop unless explicitly finished.
struct TransactionGuard<'s, S: CatalogStore + ?Sized> {
    store: &'s S,
    finished: bool,
}

impl<'s, S: CatalogStore + ?Sized> TransactionGuard<'s, S> {
    fn begin(store: &'s S) -> RepoResult<Self> {
        store.begin()?;
        Ok(Self {
            store,
            finished: false,
        })
    }

    fn commit(mut self) -> RepoResult<()> {
        self.store.commit()?;
        self.finished = true;
        Ok(())
    }

    fn rollback(mut self) -> RepoResult<()> {
        self.finished = true;
        self.store.rollback()
    }
}

impl<S: CatalogStore + ?Sized> Drop for TransactionGuard<'_, S> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.store.rollback() {
            error!("event=reconcile_rollback module=reconcile status=error error={err}");
        }
    }
}
