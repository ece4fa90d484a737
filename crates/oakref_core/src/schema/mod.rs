//! Entry schema document, validator and schema persistence.
//!
//! # Responsibility
//! - Validate candidate entries before any write transaction opens.
//! - Own the enumerated-value vocabulary and its persistence.
//!
//! # Invariants
//! - Validation never touches the store.
//! - Enumeration checks walk fields in `Field::ALL` order.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub mod document;
pub mod store;
pub mod validator;

/// Errors from schema parsing, enumeration maintenance and persistence.
#[derive(Debug)]
pub enum SchemaError {
    /// Field is not constrained by an enumeration.
    UnknownEnumeration(String),
    /// Value already allowed for the field.
    DuplicateValue { field: String, value: String },
    /// Blank enumeration value.
    EmptyValue(String),
    Parse(serde_json::Error),
    /// Document is not a valid JSON Schema.
    Compile(String),
    Io { path: PathBuf, error: std::io::Error },
    Db(DbError),
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownEnumeration(field) => {
                write!(f, "field `{field}` does not have enumeration validation")
            }
            Self::DuplicateValue { field, value } => {
                write!(f, "value `{value}` already exists for field `{field}`")
            }
            Self::EmptyValue(field) => write!(f, "empty enumeration value for field `{field}`"),
            Self::Parse(err) => write!(f, "invalid schema document: {err}"),
            Self::Compile(message) => write!(f, "schema does not compile: {message}"),
            Self::Io { path, error } => write!(f, "schema file `{}`: {error}", path.display()),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SchemaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Io { error, .. } => Some(error),
            Self::Db(err) => Some(err),
            Self::UnknownEnumeration(_)
            | Self::DuplicateValue { .. }
            | Self::EmptyValue(_)
            | Self::Compile(_) => None,
        }
    }
}

impl From<serde_json::Error> for SchemaError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

impl From<DbError> for SchemaError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SchemaError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
