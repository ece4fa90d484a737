//! Declarative schema document.
//!
//! Mirrors the JSON layout of the schema file: a JSON Schema document with an
//! extra `enumerations` map. Property constraints stay raw JSON and are
//! compiled by the validator; keys this module does not interpret are kept in
//! `extra` so a persisted document round-trips.

use super::SchemaError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const DEFAULT_SCHEMA: &str = include_str!("default_schema.json");

/// Parsed schema document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntrySchema {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    /// Allowed values keyed by field name.
    #[serde(default)]
    pub enumerations: BTreeMap<String, Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EntrySchema {
    /// Parses a schema document from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Renders the document as pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Document as a JSON value, the form handed to the schema compiler.
    pub fn to_json_value(&self) -> Result<Value, SchemaError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Built-in schema shipped with the crate.
    pub fn builtin() -> Result<Self, SchemaError> {
        Self::from_json_str(DEFAULT_SCHEMA)
    }
}
