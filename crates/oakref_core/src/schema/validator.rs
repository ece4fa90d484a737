//! Entry validation against the schema document.
//!
//! # Responsibility
//! - Check structure (the compiled JSON Schema plus built-in naming rules).
//! - Check enumerated field values and report every violation.
//! - Append allowed enumeration values and persist the updated schema.
//!
//! # Invariants
//! - Structural failures are reported before enumeration checks run.
//! - Violation order follows `Field::ALL`, never map iteration order.

use super::document::EntrySchema;
use super::store::SchemaStore;
use super::SchemaError;
use crate::model::entry::Entry;
use crate::model::field::Field;
use crate::model::source::SourceId;
use crate::model::taxon::{TaxonLevel, GENUS};
use jsonschema::error::ValidationErrorKind;
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// Field label for violations reported against the entry as a whole.
const ENTRY_FIELD: &str = "entry";

static GENUS_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i:quercus|q\.)\s+").expect("valid genus prefix regex"));

/// Why one field/value pair failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    MissingRequired,
    /// Any other JSON Schema keyword failure.
    Schema { message: String },
    NotAllowed,
    EmptyName,
    GenusPrefix,
    ParentOnNonHybrid,
    SelfParent,
    EmptyValue,
    DuplicateAttribution { source_id: SourceId },
    UnknownTaxon { level: TaxonLevel },
}

/// One violating `(field, value)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: String,
    pub value: Option<String>,
    pub kind: ViolationKind,
}

impl Violation {
    pub fn new(field: impl Into<String>, value: Option<&str>, kind: ViolationKind) -> Self {
        Self {
            field: field.into(),
            value: value.map(str::to_string),
            kind,
        }
    }
}

impl Display for Violation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "field `{}`", self.field)?;
        if let Some(value) = &self.value {
            write!(f, " value `{value}`")?;
        }
        match &self.kind {
            ViolationKind::MissingRequired => write!(f, ": required"),
            ViolationKind::Schema { message } => write!(f, ": {message}"),
            ViolationKind::NotAllowed => write!(f, ": not an allowed value"),
            ViolationKind::EmptyName => write!(f, ": name cannot be empty"),
            ViolationKind::GenusPrefix => {
                write!(f, ": name must not include the genus `{GENUS}`")
            }
            ViolationKind::ParentOnNonHybrid => write!(f, ": parents require is_hybrid"),
            ViolationKind::SelfParent => write!(f, ": entry cannot be its own parent"),
            ViolationKind::EmptyValue => write!(f, ": data point value cannot be empty"),
            ViolationKind::DuplicateAttribution { source_id } => {
                write!(f, ": more than one data point for source {source_id}")
            }
            ViolationKind::UnknownTaxon { level } => write!(f, ": unknown {level}"),
        }
    }
}

/// Entry failed validation; carries every violation found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub entry: String,
    pub violations: Vec<Violation>,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "entry `{}` failed validation", self.entry)?;
        for violation in &self.violations {
            write!(f, "; {violation}")?;
        }
        Ok(())
    }
}

impl Error for ValidationError {}

/// Compiled validator over one schema document.
#[derive(Clone)]
pub struct SchemaValidator {
    schema: EntrySchema,
    compiled: Arc<jsonschema::Validator>,
}

impl Debug for SchemaValidator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl SchemaValidator {
    /// Compiles `schema`.
    ///
    /// # Errors
    /// - `Compile` when the document is not a valid JSON Schema.
    pub fn new(schema: EntrySchema) -> Result<Self, SchemaError> {
        let document = schema.to_json_value()?;
        let compiled = jsonschema::validator_for(&document)
            .map_err(|error| SchemaError::Compile(error.to_string()))?;
        Ok(Self {
            schema,
            compiled: Arc::new(compiled),
        })
    }

    /// Validator over the built-in schema.
    pub fn builtin() -> Result<Self, SchemaError> {
        Self::new(EntrySchema::builtin()?)
    }

    pub fn schema(&self) -> &EntrySchema {
        &self.schema
    }

    /// Validates structure, then enumerated values.
    pub fn validate(&self, entry: &Entry) -> Result<(), ValidationError> {
        let mut violations = self.structural_violations(entry);
        if violations.is_empty() {
            violations = self.enumeration_violations(entry);
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                entry: entry.name.clone(),
                violations,
            })
        }
    }

    /// Allowed values for an enumerated field.
    pub fn allowed_values(&self, field: &str) -> Option<&[String]> {
        self.schema.enumerations.get(field).map(Vec::as_slice)
    }

    /// Names of every enumerated field, sorted.
    pub fn enumerated_fields(&self) -> Vec<&str> {
        self.schema.enumerations.keys().map(String::as_str).collect()
    }

    /// Appends one allowed value and persists the updated schema.
    ///
    /// The in-memory schema changes only after `store` accepted the update.
    ///
    /// # Errors
    /// - `UnknownEnumeration` when the schema does not constrain `field`.
    /// - `DuplicateValue` when `value` is already allowed.
    /// - Persistence errors from `store`.
    pub fn add_enum_value(
        &mut self,
        field: &str,
        value: &str,
        store: &dyn SchemaStore,
    ) -> Result<(), SchemaError> {
        let value = value.trim();
        let Some(allowed) = self.schema.enumerations.get(field) else {
            return Err(SchemaError::UnknownEnumeration(field.to_string()));
        };
        if value.is_empty() {
            return Err(SchemaError::EmptyValue(field.to_string()));
        }
        if allowed.iter().any(|existing| existing == value) {
            return Err(SchemaError::DuplicateValue {
                field: field.to_string(),
                value: value.to_string(),
            });
        }

        let mut updated = self.schema.clone();
        if let Some(values) = updated.enumerations.get_mut(field) {
            values.push(value.to_string());
            values.sort();
        }
        store.persist(&updated)?;
        self.schema = updated;

        info!("event=enum_add module=schema status=ok field={field}");
        Ok(())
    }

    fn structural_violations(&self, entry: &Entry) -> Vec<Violation> {
        let mut violations = Vec::new();

        match serde_json::to_value(entry) {
            Ok(instance) => {
                for error in self.compiled.iter_errors(&instance) {
                    violations.push(schema_violation(&error));
                }
            }
            Err(error) => violations.push(Violation::new(
                ENTRY_FIELD,
                None,
                ViolationKind::Schema {
                    message: error.to_string(),
                },
            )),
        }

        let name = entry.name.trim();
        if name.is_empty() {
            violations.push(Violation::new("name", None, ViolationKind::EmptyName));
        } else if GENUS_PREFIX_RE.is_match(name) {
            violations.push(Violation::new(
                "name",
                Some(entry.name.as_str()),
                ViolationKind::GenusPrefix,
            ));
        }

        for (key, parent) in [("parent1", &entry.parent1), ("parent2", &entry.parent2)] {
            let Some(parent) = parent.as_deref().filter(|value| !value.trim().is_empty()) else {
                continue;
            };
            if !entry.is_hybrid {
                violations.push(Violation::new(
                    key,
                    Some(parent),
                    ViolationKind::ParentOnNonHybrid,
                ));
            } else if parent.trim() == name {
                violations.push(Violation::new(key, Some(parent), ViolationKind::SelfParent));
            }
        }

        for field in Field::ALL {
            let mut seen = BTreeSet::new();
            for point in entry.data_points(field) {
                if point.value.trim().is_empty() {
                    violations.push(Violation::new(
                        field.as_str(),
                        Some(point.value.as_str()),
                        ViolationKind::EmptyValue,
                    ));
                }
                if !seen.insert(point.source_id) {
                    violations.push(Violation::new(
                        field.as_str(),
                        Some(point.value.as_str()),
                        ViolationKind::DuplicateAttribution {
                            source_id: point.source_id,
                        },
                    ));
                }
            }
        }

        violations
    }

    fn enumeration_violations(&self, entry: &Entry) -> Vec<Violation> {
        let mut violations = Vec::new();
        for field in Field::ALL {
            let Some(allowed) = self.schema.enumerations.get(field.as_str()) else {
                continue;
            };
            for point in entry.data_points(field) {
                if !allowed.contains(&point.value) {
                    violations.push(Violation::new(
                        field.as_str(),
                        Some(point.value.as_str()),
                        ViolationKind::NotAllowed,
                    ));
                }
            }
        }
        violations
    }
}

fn schema_violation(error: &jsonschema::ValidationError<'_>) -> Violation {
    if let ValidationErrorKind::Required { property } = &error.kind {
        let field = property.as_str().unwrap_or(ENTRY_FIELD);
        return Violation::new(field, None, ViolationKind::MissingRequired);
    }

    let path = error.instance_path.to_string();
    let field = path
        .trim_start_matches('/')
        .split('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or(ENTRY_FIELD);
    let value = match &*error.instance {
        Value::String(text) => Some(text.as_str()),
        _ => None,
    };
    Violation::new(
        field,
        value,
        ViolationKind::Schema {
            message: error.to_string(),
        },
    )
}
