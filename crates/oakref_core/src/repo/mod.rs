//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for entries, sources
//!   and taxa.
//! - Isolate SQLite query details from service/merge orchestration.
//!
//! # Invariants
//! - Entry writes pass schema validation before a transaction opens.
//! - Every mutating call runs inside one `IMMEDIATE` transaction; dropping
//!   the transaction on an error path rolls it back.
//! - Repository APIs return semantic errors (`NotFound`, `AlreadyExists`,
//!   `Referential`) in addition to DB transport errors.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::field::Field;
use crate::model::source::SourceId;
use crate::model::taxon::TaxonLevel;
use crate::schema::validator::ValidationError;
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod entry_repo;
pub mod hybrid_sync;
pub mod source_repo;
pub mod taxon_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Key of one stored entity, used by `NotFound`/`AlreadyExists`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKey {
    Entry(String),
    Source(SourceId),
    Taxon { name: String, level: TaxonLevel },
}

impl Display for EntityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Entry(name) => write!(f, "entry `{name}`"),
            Self::Source(id) => write!(f, "source {id}"),
            Self::Taxon { name, level } => write!(f, "{level} `{name}`"),
        }
    }
}

/// Cross-table consistency failure. Aborts the enclosing transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferentialError {
    /// A data point (`field = Some`) or the preferred source (`field = None`)
    /// names a source that does not exist.
    UnknownSource {
        entry: String,
        field: Option<Field>,
        source_id: SourceId,
    },
    /// Source deletion blocked by existing references.
    SourceInUse {
        source_id: SourceId,
        data_points: i64,
        preferred_by: i64,
    },
}

impl Display for ReferentialError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownSource {
                entry,
                field: Some(field),
                source_id,
            } => write!(
                f,
                "entry `{entry}` field `{field}` references unknown source {source_id}"
            ),
            Self::UnknownSource {
                entry,
                field: None,
                source_id,
            } => write!(f, "entry `{entry}` prefers unknown source {source_id}"),
            Self::SourceInUse {
                source_id,
                data_points,
                preferred_by,
            } => write!(
                f,
                "source {source_id} is referenced by {data_points} data point(s) and preferred by {preferred_by} entr(ies)"
            ),
        }
    }
}

impl Error for ReferentialError {}

/// Repository error for entry, source and taxon persistence.
#[derive(Debug)]
pub enum RepoError {
    Validation(ValidationError),
    Db(DbError),
    NotFound(EntityKey),
    AlreadyExists(EntityKey),
    Referential(ReferentialError),
    /// Source/taxon metadata rejected before any SQL runs.
    InvalidInput(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(key) => write!(f, "{key} not found"),
            Self::AlreadyExists(key) => write!(f, "{key} already exists"),
            Self::Referential(err) => write!(f, "{err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Referential(err) => Some(err),
            Self::NotFound(_)
            | Self::AlreadyExists(_)
            | Self::InvalidInput(_)
            | Self::UninitializedConnection { .. }
            | Self::MissingRequiredTable(_)
            | Self::MissingRequiredColumn { .. }
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<ReferentialError> for RepoError {
    fn from(value: ReferentialError) -> Self {
        Self::Referential(value)
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

/// Table name plus the columns a repository reads or writes.
pub(crate) type RequiredTable = (&'static str, &'static [&'static str]);

/// Rejects connections that are not migrated or lack required schema.
pub(crate) fn ensure_connection_ready(
    conn: &Connection,
    tables: &[RequiredTable],
) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for &(table, columns) in tables {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(RepoError::MissingRequiredColumn { table, column });
            }
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

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Encodes a name set for a JSON text column.
pub(crate) fn encode_name_set(names: &BTreeSet<String>) -> RepoResult<String> {
    serde_json::to_string(names)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode name set: {err}")))
}

/// Decodes a name set from a JSON text column.
pub(crate) fn decode_name_set(column: &str, text: &str) -> RepoResult<BTreeSet<String>> {
    serde_json::from_str(text).map_err(|err| {
        RepoError::InvalidData(format!("invalid name set in {column}: {err}"))
    })
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) fn int_to_bool(column: &str, value: i64) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

/// Trims a user-supplied optional string; blank becomes `None`.
pub(crate) fn normalize_optional(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
