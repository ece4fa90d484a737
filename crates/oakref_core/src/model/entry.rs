//! Entry (taxonomic record) and data point model.
//!
//! # Responsibility
//! - Define the canonical record persisted by the entry repository.
//! - Provide parent-set and data point helpers used by the synchronizer
//!   and the merge engine.
//!
//! # Invariants
//! - `name` is the global key and never carries the genus prefix.
//! - `parent1`/`parent2` are meaningful only when `is_hybrid` is set.
//! - `data` holds, per field, an order-irrelevant collection with at most one
//!   data point per source.

use crate::model::field::Field;
use crate::model::source::SourceId;
use crate::model::taxon::TaxonLevel;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One attributed value for one field of one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Attribute value, e.g. `lobed` or `green`.
    pub value: String,
    /// Source this value is attributed to.
    pub source_id: SourceId,
    /// Optional page or locator inside the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
}

impl DataPoint {
    pub fn new(value: impl Into<String>, source_id: SourceId) -> Self {
        Self {
            value: value.into(),
            source_id,
            page: None,
        }
    }

    /// Sets the page locator.
    pub fn with_page(mut self, page: impl Into<String>) -> Self {
        self.page = Some(page.into());
        self
    }
}

/// Canonical taxonomic record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Scientific name without genus prefix, e.g. `alba` or `×bebbiana`.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub is_hybrid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conservation_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgenus: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent2: Option<String>,
    /// Derived from children's parent pointers; maintained by the store.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub hybrids: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub closely_related_to: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub subspecies_varieties: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub synonyms: BTreeSet<String>,
    /// Source flagged as preferred in the public export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_source: Option<SourceId>,
    /// Source-attributed descriptive data keyed by field.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<Field, Vec<DataPoint>>,
}

impl Entry {
    /// Creates an empty, non-hybrid entry.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Creates a hybrid entry with the given parents.
    pub fn hybrid(
        name: impl Into<String>,
        parent1: Option<&str>,
        parent2: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            is_hybrid: true,
            parent1: parent1.map(str::to_string),
            parent2: parent2.map(str::to_string),
            ..Self::default()
        }
    }

    /// Returns `{parent1, parent2} \ {nil}`. Empty strings count as nil.
    pub fn parent_set(&self) -> BTreeSet<String> {
        [self.parent1.as_deref(), self.parent2.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Data points supplied for one field (empty when absent).
    pub fn data_points(&self, field: Field) -> &[DataPoint] {
        self.data.get(&field).map_or(&[], Vec::as_slice)
    }

    /// Data point attributed to `source_id` for one field, if any.
    pub fn data_point_for(&self, field: Field, source_id: SourceId) -> Option<&DataPoint> {
        self.data_points(field)
            .iter()
            .find(|point| point.source_id == source_id)
    }

    /// Inserts or replaces the data point attributed to `point.source_id`.
    pub fn upsert_data_point(&mut self, field: Field, point: DataPoint) {
        let points = self.data.entry(field).or_default();
        match points
            .iter_mut()
            .find(|existing| existing.source_id == point.source_id)
        {
            Some(existing) => *existing = point,
            None => points.push(point),
        }
    }

    /// Builder-style variant of [`Entry::upsert_data_point`].
    pub fn with_data_point(mut self, field: Field, point: DataPoint) -> Self {
        self.upsert_data_point(field, point);
        self
    }

    /// Total number of data points across all fields.
    pub fn data_point_count(&self) -> usize {
        self.data.values().map(Vec::len).sum()
    }

    /// Hierarchy placement as `(level, value)` pairs for present values.
    pub fn taxonomy_placement(&self) -> Vec<(TaxonLevel, &str)> {
        [
            (TaxonLevel::Subgenus, self.subgenus.as_deref()),
            (TaxonLevel::Section, self.section.as_deref()),
            (TaxonLevel::Subsection, self.subsection.as_deref()),
            (TaxonLevel::Complex, self.complex.as_deref()),
        ]
        .into_iter()
        .filter_map(|(level, value)| value.map(|value| (level, value)))
        .collect()
    }
}
