//! Persisted catalog records.
//!
//! # Responsibility
//! - Model categories, attribute variables, entities and attribute values as
//!   the store returns them.
//! - Provide the RGB color type with its `#RRGGBB` text form.
//!
//! # Invariants
//! - `(category_id, name)` is unique for attribute variables.
//! - A reconciled entity holds exactly one attribute value per attribute
//!   variable of its category.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

static HEX_COLOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#?([0-9A-Fa-f]{2})([0-9A-Fa-f]{2})([0-9A-Fa-f]{2})$").expect("valid color regex")
});

/// Surrogate id of a category (a `variables` row).
pub type CategoryId = i64;
/// Surrogate id of an entity, assigned by the store on insert.
pub type EntityId = i64;
/// Surrogate id of an attribute variable.
pub type AttributeVariableId = i64;

/// Id written for new rows in the tabular form.
pub const NEW_ENTITY_ID: EntityId = -1;

/// RGB color attached to an entity.
///
/// Serialized as `#RRGGBB`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Color {
    /// Default entity color (black).
    pub const DEFAULT: Color = Color::new(0, 0, 0);

    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Parses `#RRGGBB` (leading `#` optional, hex digits case-insensitive).
    pub fn from_hex(value: &str) -> Option<Self> {
        let caps = HEX_COLOR_RE.captures(value.trim())?;
        let channel = |index: usize| u8::from_str_radix(&caps[index], 16).ok();
        Some(Self::new(channel(1)?, channel(2)?, channel(3)?))
    }

    /// Formats as uppercase `#RRGGBB`.
    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.red, self.green, self.blue)
    }

    pub fn is_default(self) -> bool {
        self == Self::DEFAULT
    }
}

impl Display for Color {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value).ok_or_else(|| format!("invalid color `{value}`; expected #RRGGBB"))
    }
}

impl From<Color> for String {
    fn from(value: Color) -> Self {
        value.to_hex()
    }
}

/// A category resolved from a statement type and a variable name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub statement_type_id: i64,
    pub name: String,
}

/// Named column of supplementary text attached to every entity of a category.
///
/// Never renamed in place: a rename is a removal plus an addition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeVariable {
    pub id: AttributeVariableId,
    pub category_id: CategoryId,
    pub name: String,
}

/// Core fields of one stored entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub value: String,
    pub color: Color,
}

/// One stored attribute cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValueRecord {
    pub entity_id: EntityId,
    pub variable_name: String,
    pub value: String,
}

/// Stored entity together with its attribute cells keyed by variable name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub category_id: CategoryId,
    pub value: String,
    pub color: Color,
    pub attribute_values: BTreeMap<String, String>,
}

impl Entity {
    pub fn from_record(category_id: CategoryId, record: EntityRecord) -> Self {
        Self {
            id: record.id,
            category_id,
            value: record.value,
            color: record.color,
            attribute_values: BTreeMap::new(),
        }
    }

    /// Returns the stored cell for `variable_name`, if present.
    pub fn attribute(&self, variable_name: &str) -> Option<&str> {
        self.attribute_values.get(variable_name).map(String::as_str)
    }
}
