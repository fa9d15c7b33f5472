//! Catalog store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide list/insert/update/delete primitives over attribute variables,
//!   entities and attribute values of one category.
//! - Provide dependent-reference repointing and the counters used for
//!   before/after statistics.
//! - Expose transaction primitives so one reconciliation pass is atomic.
//!
//! # Invariants
//! - Entity ids are assigned by SQLite on insert and never reused here.
//! - `delete_entity` cascades; callers repoint dependents they want to keep.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::entity::{
    AttributeValueRecord, AttributeVariable, AttributeVariableId, Category, CategoryId, Color,
    EntityId, EntityRecord,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const REQUIRED_TABLES: [&str; 7] = [
    "statement_types",
    "variables",
    "attribute_variables",
    "entities",
    "attribute_values",
    "statements",
    "statement_entities",
];

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for catalog persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// A write addressed a row that does not exist.
    NotFound { table: &'static str, key: String },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { table, key } => write!(f, "{table} row not found: {key}"),
            Self::InvalidData(message) => write!(f, "invalid persisted catalog data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "catalog repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "catalog repository requires table `{table}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound { .. } => None,
            Self::InvalidData(_) => None,
            Self::UninitializedConnection { .. } => None,
            Self::MissingRequiredTable(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Store access contract consumed by reconciliation.
///
/// Implementations are handles over one connection; all writes issued
/// between `begin` and `commit`/`rollback` belong to one transaction.
pub trait CatalogStore {
    /// Opens a write transaction with autocommit disabled.
    fn begin(&self) -> RepoResult<()>;
    /// Makes every write since `begin` durable.
    fn commit(&self) -> RepoResult<()>;
    /// Discards every write since `begin`.
    fn rollback(&self) -> RepoResult<()>;

    /// Loads one category by id.
    fn get_category(&self, category_id: CategoryId) -> RepoResult<Option<Category>>;
    /// Resolves a category by statement type label and variable name.
    fn find_category(&self, statement_type: &str, variable: &str)
        -> RepoResult<Option<Category>>;
    /// Resolves a category by statement type id and variable name.
    fn find_category_by_type_id(
        &self,
        statement_type_id: i64,
        variable: &str,
    ) -> RepoResult<Option<Category>>;

    /// Lists attribute variables ordered by ascending id.
    fn list_attribute_variables(&self, category_id: CategoryId)
        -> RepoResult<Vec<AttributeVariable>>;
    fn insert_attribute_variable(
        &self,
        category_id: CategoryId,
        name: &str,
    ) -> RepoResult<AttributeVariableId>;
    /// Deletes one attribute variable; its attribute values cascade.
    fn delete_attribute_variable(&self, category_id: CategoryId, name: &str) -> RepoResult<()>;

    /// Lists entities ordered by ascending id.
    fn list_entities(&self, category_id: CategoryId) -> RepoResult<Vec<EntityRecord>>;
    /// Lists all attribute cells of the category.
    fn list_attribute_values(&self, category_id: CategoryId)
        -> RepoResult<Vec<AttributeValueRecord>>;
    fn insert_entity(&self, category_id: CategoryId, value: &str, color: Color)
        -> RepoResult<EntityId>;
    fn update_entity(&self, entity_id: EntityId, value: &str, color: Color) -> RepoResult<()>;
    /// Deletes one entity; attribute values and dependent references cascade.
    fn delete_entity(&self, entity_id: EntityId) -> RepoResult<()>;
    /// Writes one attribute cell, creating it when missing.
    fn upsert_attribute_value(
        &self,
        entity_id: EntityId,
        variable_name: &str,
        value: &str,
    ) -> RepoResult<()>;

    /// Rewrites every dependent reference of `old_entity_id` to
    /// `new_entity_id`. Returns the number of references moved.
    fn repoint_dependents(&self, old_entity_id: EntityId, new_entity_id: EntityId)
        -> RepoResult<usize>;
    fn count_dependents_referencing(&self, entity_id: EntityId) -> RepoResult<i64>;
    fn count_entities(&self, category_id: CategoryId) -> RepoResult<i64>;
    fn count_dependents_for_category(&self, category_id: CategoryId) -> RepoResult<i64>;
    fn count_attribute_variables(&self, category_id: CategoryId) -> RepoResult<i64>;
}

/// SQLite-backed catalog store over a borrowed connection.
pub struct SqliteCatalogStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCatalogStore<'conn> {
    /// Creates a store from a migrated connection.
    ///
    /// # Errors
    /// - `UninitializedConnection` when the schema version is not current.
    /// - `MissingRequiredTable` when a catalog table is absent.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_catalog_connection_ready(conn)?;
        Ok(Self { conn })
    }

    /// Registers a statement type and returns its id.
    pub fn insert_statement_type(&self, label: &str) -> RepoResult<i64> {
        self.conn.execute(
            "INSERT INTO statement_types (label) VALUES (?1);",
            [label],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Registers a category (variable) under a statement type.
    pub fn insert_category(&self, statement_type_id: i64, variable: &str) -> RepoResult<Category> {
        self.conn.execute(
            "INSERT INTO variables (statement_type_id, variable) VALUES (?1, ?2);",
            params![statement_type_id, variable],
        )?;
        Ok(Category {
            id: self.conn.last_insert_rowid(),
            statement_type_id,
            name: variable.to_string(),
        })
    }

    /// Creates an empty statement of the given type.
    pub fn insert_statement(&self, statement_type_id: i64) -> RepoResult<i64> {
        self.conn.execute(
            "INSERT INTO statements (statement_type_id) VALUES (?1);",
            [statement_type_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Records that `statement_id` references `entity_id` under `category_id`.
    pub fn insert_dependent(
        &self,
        statement_id: i64,
        category_id: CategoryId,
        entity_id: EntityId,
    ) -> RepoResult<i64> {
        self.conn.execute(
            "INSERT INTO statement_entities (statement_id, variable_id, entity_id)
             VALUES (?1, ?2, ?3);",
            params![statement_id, category_id, entity_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Lists the entity ids a statement references, in insertion order.
    pub fn dependent_entity_ids(&self, statement_id: i64) -> RepoResult<Vec<EntityId>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id
             FROM statement_entities
             WHERE statement_id = ?1
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([statement_id])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(row.get(0)?);
        }
        Ok(ids)
    }
}

impl CatalogStore for SqliteCatalogStore<'_> {
    fn begin(&self) -> RepoResult<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        Ok(())
    }

    fn commit(&self) -> RepoResult<()> {
        self.conn.execute_batch("COMMIT;")?;
        Ok(())
    }

    fn rollback(&self) -> RepoResult<()> {
        self.conn.execute_batch("ROLLBACK;")?;
        Ok(())
    }

    fn get_category(&self, category_id: CategoryId) -> RepoResult<Option<Category>> {
        let category = self
            .conn
            .query_row(
                "SELECT id, statement_type_id, variable
                 FROM variables
                 WHERE id = ?1;",
                [category_id],
                parse_category_row,
            )
            .optional()?;
        Ok(category)
    }

    fn find_category(
        &self,
        statement_type: &str,
        variable: &str,
    ) -> RepoResult<Option<Category>> {
        let category = self
            .conn
            .query_row(
                "SELECT v.id, v.statement_type_id, v.variable
                 FROM variables v
                 INNER JOIN statement_types st ON st.id = v.statement_type_id
                 WHERE st.label = ?1
                   AND v.variable = ?2;",
                params![statement_type, variable],
                parse_category_row,
            )
            .optional()?;
        Ok(category)
    }

    fn find_category_by_type_id(
        &self,
        statement_type_id: i64,
        variable: &str,
    ) -> RepoResult<Option<Category>> {
        let category = self
            .conn
            .query_row(
                "SELECT id, statement_type_id, variable
                 FROM variables
                 WHERE statement_type_id = ?1
                   AND variable = ?2;",
                params![statement_type_id, variable],
                parse_category_row,
            )
            .optional()?;
        Ok(category)
    }

    fn list_attribute_variables(
        &self,
        category_id: CategoryId,
    ) -> RepoResult<Vec<AttributeVariable>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, variable_id, attribute_variable
             FROM attribute_variables
             WHERE variable_id = ?1
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([category_id])?;
        let mut variables = Vec::new();
        while let Some(row) = rows.next()? {
            variables.push(AttributeVariable {
                id: row.get("id")?,
                category_id: row.get("variable_id")?,
                name: row.get("attribute_variable")?,
            });
        }
        Ok(variables)
    }

    fn insert_attribute_variable(
        &self,
        category_id: CategoryId,
        name: &str,
    ) -> RepoResult<AttributeVariableId> {
        self.conn.execute(
            "INSERT INTO attribute_variables (variable_id, attribute_variable)
             VALUES (?1, ?2);",
            params![category_id, name],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn delete_attribute_variable(&self, category_id: CategoryId, name: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM attribute_variables
             WHERE variable_id = ?1
               AND attribute_variable = ?2;",
            params![category_id, name],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                table: "attribute_variables",
                key: format!("{category_id}/{name}"),
            });
        }
        Ok(())
    }

    fn list_entities(&self, category_id: CategoryId) -> RepoResult<Vec<EntityRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, value, red, green, blue
             FROM entities
             WHERE variable_id = ?1
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([category_id])?;
        let mut entities = Vec::new();
        while let Some(row) = rows.next()? {
            entities.push(parse_entity_row(row)?);
        }
        Ok(entities)
    }

    fn list_attribute_values(
        &self,
        category_id: CategoryId,
    ) -> RepoResult<Vec<AttributeValueRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT av.entity_id, v.attribute_variable, av.attribute_value
             FROM attribute_values av
             INNER JOIN attribute_variables v ON v.id = av.attribute_variable_id
             WHERE v.variable_id = ?1
             ORDER BY av.entity_id ASC, v.id ASC;",
        )?;
        let mut rows = stmt.query([category_id])?;
        let mut values = Vec::new();
        while let Some(row) = rows.next()? {
            values.push(AttributeValueRecord {
                entity_id: row.get("entity_id")?,
                variable_name: row.get("attribute_variable")?,
                value: row.get("attribute_value")?,
            });
        }
        Ok(values)
    }

    fn insert_entity(
        &self,
        category_id: CategoryId,
        value: &str,
        color: Color,
    ) -> RepoResult<EntityId> {
        self.conn.execute(
            "INSERT INTO entities (variable_id, value, red, green, blue)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![category_id, value, color.red, color.green, color.blue],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_entity(&self, entity_id: EntityId, value: &str, color: Color) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE entities
             SET value = ?2,
                 red = ?3,
                 green = ?4,
                 blue = ?5
             WHERE id = ?1;",
            params![entity_id, value, color.red, color.green, color.blue],
        )?;
        if changed == 0 {
            return Err(entity_not_found(entity_id));
        }
        Ok(())
    }

    fn delete_entity(&self, entity_id: EntityId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM entities WHERE id = ?1;", [entity_id])?;
        if changed == 0 {
            return Err(entity_not_found(entity_id));
        }
        Ok(())
    }

    fn upsert_attribute_value(
        &self,
        entity_id: EntityId,
        variable_name: &str,
        value: &str,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "INSERT INTO attribute_values (entity_id, attribute_variable_id, attribute_value)
             SELECT e.id, v.id, ?3
             FROM entities e
             INNER JOIN attribute_variables v ON v.variable_id = e.variable_id
             WHERE e.id = ?1
               AND v.attribute_variable = ?2
             ON CONFLICT (entity_id, attribute_variable_id)
             DO UPDATE SET attribute_value = excluded.attribute_value;",
            params![entity_id, variable_name, value],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                table: "attribute_variables",
                key: format!("{entity_id}/{variable_name}"),
            });
        }
        Ok(())
    }

    fn repoint_dependents(
        &self,
        old_entity_id: EntityId,
        new_entity_id: EntityId,
    ) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "UPDATE statement_entities
             SET entity_id = ?2
             WHERE entity_id = ?1;",
            params![old_entity_id, new_entity_id],
        )?;
        Ok(changed)
    }

    fn count_dependents_referencing(&self, entity_id: EntityId) -> RepoResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM statement_entities WHERE entity_id = ?1;",
            [entity_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn count_entities(&self, category_id: CategoryId) -> RepoResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM entities WHERE variable_id = ?1;",
            [category_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn count_dependents_for_category(&self, category_id: CategoryId) -> RepoResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*)
             FROM statement_entities se
             INNER JOIN entities e ON e.id = se.entity_id
             WHERE e.variable_id = ?1;",
            [category_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn count_attribute_variables(&self, category_id: CategoryId) -> RepoResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM attribute_variables WHERE variable_id = ?1;",
            [category_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn parse_category_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        statement_type_id: row.get(1)?,
        name: row.get(2)?,
    })
}

fn parse_entity_row(row: &Row<'_>) -> RepoResult<EntityRecord> {
    let id: EntityId = row.get("id")?;
    let channel = |column: &'static str| -> RepoResult<u8> {
        let raw: i64 = row.get(column)?;
        u8::try_from(raw).map_err(|_| {
            RepoError::InvalidData(format!(
                "invalid color channel `{raw}` in entities.{column} for entity {id}"
            ))
        })
    };
    let color = Color::new(channel("red")?, channel("green")?, channel("blue")?);

    Ok(EntityRecord {
        id,
        value: row.get("value")?,
        color,
    })
}

fn entity_not_found(entity_id: EntityId) -> RepoError {
    RepoError::NotFound {
        table: "entities",
        key: entity_id.to_string(),
    }
}

fn ensure_catalog_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in REQUIRED_TABLES {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
