//! Tabular entity snapshot.
//!
//! # Responsibility
//! - Hold the caller-edited table `{ID, value, color, attribute-1..n}` that
//!   reconciliation compares against the store.
//! - Convert from/to the raw string table used for export and import.
//! - Reject malformed tables before any store access.
//!
//! # Invariants
//! - Every row carries exactly one cell per attribute column.
//! - Attribute column names are unique and never shadow a fixed column.
//! - Store ids appear at most once across rows; new rows carry no id.

use crate::model::entity::{Color, EntityId, NEW_ENTITY_ID};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const ID_COLUMN: &str = "ID";
pub const VALUE_COLUMN: &str = "value";
pub const COLOR_COLUMN: &str = "color";

/// Fixed leading columns of the tabular form, in order.
pub const FIXED_COLUMNS: [&str; 3] = [ID_COLUMN, VALUE_COLUMN, COLOR_COLUMN];

/// Precondition violations that keep reconciliation from starting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// A fixed column is absent or out of place in the header.
    MissingFixedColumn(&'static str),
    /// An attribute column name appears twice or shadows a fixed column.
    DuplicateColumn(String),
    /// A row has a different cell count than the header.
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },
    /// An id cell is neither empty, `-1`, nor a positive integer.
    InvalidEntityId { row: usize, value: String },
    /// A color cell is not `#RRGGBB`.
    InvalidColor { row: usize, value: String },
    /// The same store id is claimed by more than one row.
    DuplicateEntityId(EntityId),
}

impl Display for SnapshotError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingFixedColumn(column) => {
                write!(f, "snapshot is missing fixed column `{column}`")
            }
            Self::DuplicateColumn(column) => {
                write!(f, "snapshot column `{column}` is not unique")
            }
            Self::RaggedRow {
                row,
                expected,
                actual,
            } => write!(
                f,
                "snapshot row {row} has {actual} attribute cells, expected {expected}"
            ),
            Self::InvalidEntityId { row, value } => {
                write!(f, "snapshot row {row} has invalid entity id `{value}`")
            }
            Self::InvalidColor { row, value } => {
                write!(f, "snapshot row {row} has invalid color `{value}`")
            }
            Self::DuplicateEntityId(id) => {
                write!(f, "entity id {id} appears in more than one snapshot row")
            }
        }
    }
}

impl Error for SnapshotError {}

/// One entity row of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRow {
    /// Store id, or `None` for a row that does not exist in the store yet.
    pub id: Option<EntityId>,
    pub value: String,
    pub color: Color,
    /// Cells aligned with `Snapshot::columns`.
    pub attributes: Vec<String>,
}

impl SnapshotRow {
    pub fn new(id: Option<EntityId>, value: impl Into<String>, color: Color) -> Self {
        Self {
            id,
            value: value.into(),
            color,
            attributes: Vec::new(),
        }
    }

    /// Replaces the attribute cells; order must follow the snapshot columns.
    pub fn with_attributes<I, S>(mut self, cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = cells.into_iter().map(Into::into).collect();
        self
    }

    /// Counts attribute cells holding non-empty text.
    pub fn filled_attribute_count(&self) -> usize {
        self.attributes.iter().filter(|cell| !cell.is_empty()).count()
    }
}

/// Caller-supplied table of entities for one category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Attribute column names, excluding the fixed columns.
    pub columns: Vec<String>,
    pub rows: Vec<SnapshotRow>,
}

impl Snapshot {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends one row and returns `self` for chained construction.
    pub fn with_row(mut self, row: SnapshotRow) -> Self {
        self.rows.push(row);
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the cell of `row` under attribute column `column`.
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.columns.iter().position(|name| name == column)?;
        self.rows
            .get(row)
            .and_then(|row| row.attributes.get(index))
            .map(String::as_str)
    }

    /// Checks the structural preconditions of reconciliation.
    ///
    /// # Errors
    /// - Duplicate or reserved attribute column names.
    /// - Rows whose cell count differs from the column count.
    /// - Non-positive store ids, or one id claimed by several rows.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        let mut seen_columns = HashSet::new();
        for column in &self.columns {
            let reserved = FIXED_COLUMNS
                .iter()
                .any(|fixed| fixed.eq_ignore_ascii_case(column));
            if reserved || !seen_columns.insert(column.as_str()) {
                return Err(SnapshotError::DuplicateColumn(column.clone()));
            }
        }

        let mut seen_ids = HashSet::new();
        for (index, row) in self.rows.iter().enumerate() {
            if row.attributes.len() != self.columns.len() {
                return Err(SnapshotError::RaggedRow {
                    row: index,
                    expected: self.columns.len(),
                    actual: row.attributes.len(),
                });
            }
            if let Some(id) = row.id {
                if id <= 0 {
                    return Err(SnapshotError::InvalidEntityId {
                        row: index,
                        value: id.to_string(),
                    });
                }
                if !seen_ids.insert(id) {
                    return Err(SnapshotError::DuplicateEntityId(id));
                }
            }
        }

        Ok(())
    }

    /// Builds a snapshot from the raw string table form.
    ///
    /// The header must start with `ID`, `value`, `color` (case-insensitive);
    /// an empty id cell or `-1` marks a new row.
    pub fn from_table(header: &[String], rows: &[Vec<String>]) -> Result<Self, SnapshotError> {
        for (position, fixed) in FIXED_COLUMNS.iter().enumerate() {
            let matches = header
                .get(position)
                .is_some_and(|name| name.trim().eq_ignore_ascii_case(fixed));
            if !matches {
                return Err(SnapshotError::MissingFixedColumn(fixed));
            }
        }

        let mut snapshot = Snapshot::new(header[FIXED_COLUMNS.len()..].iter().cloned());
        for (index, cells) in rows.iter().enumerate() {
            if cells.len() != header.len() {
                return Err(SnapshotError::RaggedRow {
                    row: index,
                    expected: snapshot.columns.len(),
                    actual: cells.len().saturating_sub(FIXED_COLUMNS.len()),
                });
            }
            let id = parse_id_cell(index, &cells[0])?;
            let color = Color::from_hex(&cells[2]).ok_or_else(|| SnapshotError::InvalidColor {
                row: index,
                value: cells[2].clone(),
            })?;
            snapshot.rows.push(
                SnapshotRow::new(id, cells[1].clone(), color)
                    .with_attributes(cells[FIXED_COLUMNS.len()..].iter().cloned()),
            );
        }

        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Renders the raw string table form: header plus one line per row.
    pub fn to_table(&self) -> (Vec<String>, Vec<Vec<String>>) {
        let header = FIXED_COLUMNS
            .iter()
            .map(|name| (*name).to_string())
            .chain(self.columns.iter().cloned())
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                [
                    row.id.unwrap_or(NEW_ENTITY_ID).to_string(),
                    row.value.clone(),
                    row.color.to_hex(),
                ]
                .into_iter()
                .chain(row.attributes.iter().cloned())
                .collect()
            })
            .collect();
        (header, rows)
    }
}

fn parse_id_cell(row: usize, cell: &str) -> Result<Option<EntityId>, SnapshotError> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match trimmed.parse::<EntityId>() {
        Ok(NEW_ENTITY_ID) => Ok(None),
        Ok(id) if id > 0 => Ok(Some(id)),
        _ => Err(SnapshotError::InvalidEntityId {
            row,
            value: cell.to_string(),
        }),
    }
}
