//! Denormalized public export.
//!
//! # Responsibility
//! - Flatten entries, sources and data points into one versioned document.
//!
//! # Invariants
//! - Read-only; never opens a write transaction.
//! - Species are ordered by name, sources by id.
//! - Per-species source blocks are ordered preferred-first, then by id.
//! - `build_export` versions strictly increase within one process, even when
//!   two builds share a millisecond or the wall clock steps back.

use crate::model::entry::Entry;
use crate::model::field::Field;
use crate::model::source::{Source, SourceId};
use crate::model::taxon::GENUS;
use crate::repo::entry_repo::{ensure_entry_connection_ready, load_all_entries};
use crate::repo::source_repo::load_all_sources;
use crate::repo::{RepoError, RepoResult};
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use log::info;
use once_cell::sync::Lazy;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Instant;

static LAST_VERSION: Lazy<Mutex<Option<DateTime<Utc>>>> = Lazy::new(|| Mutex::new(None));

/// Complete export artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportDocument {
    pub metadata: ExportMetadata,
    pub sources: Vec<Source>,
    pub species: Vec<ExportSpecies>,
}

/// Cache-invalidation metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportMetadata {
    /// UTC timestamp with millisecond precision.
    pub version: String,
    pub exported_at: String,
    pub species_count: usize,
    pub source_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportTaxonomy {
    pub genus: &'static str,
    pub subgenus: Option<String>,
    pub section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complex: Option<String>,
}

/// One attributed value inside a source block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributedValue {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
}

/// Data one source contributes to one species.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceBlock {
    pub source_id: SourceId,
    pub source_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_url: Option<String>,
    pub is_preferred: bool,
    pub data: BTreeMap<Field, AttributedValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSpecies {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub is_hybrid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conservation_status: Option<String>,
    pub taxonomy: ExportTaxonomy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent2: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hybrids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub closely_related_to: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subspecies_varieties: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceBlock>,
}

impl ExportDocument {
    pub fn species(&self, name: &str) -> Option<&ExportSpecies> {
        self.species.iter().find(|species| species.name == name)
    }

    pub fn to_json_pretty(&self) -> RepoResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| RepoError::InvalidData(format!("cannot encode export: {err}")))
    }
}

/// Builds the export stamped with the current UTC time.
pub fn build_export(conn: &Connection) -> RepoResult<ExportDocument> {
    build_export_at(conn, next_version(Utc::now()))
}

fn next_version(now: DateTime<Utc>) -> DateTime<Utc> {
    let mut last = LAST_VERSION
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let version = advance_version(*last, now);
    *last = Some(version);
    version
}

/// `now` at millisecond precision, bumped past `last` when not later.
fn advance_version(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
    match last {
        Some(last) if now <= last => last + TimeDelta::milliseconds(1),
        _ => now,
    }
}

/// Builds the export stamped with `now`.
pub fn build_export_at(conn: &Connection, now: DateTime<Utc>) -> RepoResult<ExportDocument> {
    let started_at = Instant::now();
    ensure_entry_connection_ready(conn)?;

    let sources = load_all_sources(conn)?;
    let by_id: BTreeMap<SourceId, &Source> =
        sources.iter().map(|source| (source.id, source)).collect();

    let species = load_all_entries(conn)?
        .into_iter()
        .map(|entry| export_species(entry, &by_id))
        .collect::<RepoResult<Vec<_>>>()?;

    let version = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    let document = ExportDocument {
        metadata: ExportMetadata {
            exported_at: version.clone(),
            version,
            species_count: species.len(),
            source_count: sources.len(),
        },
        species,
        sources,
    };

    info!(
        "event=export_build module=export status=ok species={} sources={} duration_ms={}",
        document.metadata.species_count,
        document.metadata.source_count,
        started_at.elapsed().as_millis()
    );
    Ok(document)
}

fn export_species(
    entry: Entry,
    sources: &BTreeMap<SourceId, &Source>,
) -> RepoResult<ExportSpecies> {
    let mut grouped: BTreeMap<SourceId, BTreeMap<Field, AttributedValue>> = BTreeMap::new();
    for (field, points) in &entry.data {
        for point in points {
            grouped.entry(point.source_id).or_default().insert(
                *field,
                AttributedValue {
                    value: point.value.clone(),
                    page: point.page.clone(),
                },
            );
        }
    }

    let mut blocks = grouped
        .into_iter()
        .map(|(source_id, data)| -> RepoResult<SourceBlock> {
            let source = sources.get(&source_id).ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "entry `{}` references missing source {source_id}",
                    entry.name
                ))
            })?;
            Ok(SourceBlock {
                source_id,
                source_name: source.name.clone(),
                source_url: source.url.clone(),
                license: source.license.clone(),
                license_url: source.license_url.clone(),
                is_preferred: entry.preferred_source == Some(source_id),
                data,
            })
        })
        .collect::<RepoResult<Vec<_>>>()?;
    blocks.sort_by_key(|block| (!block.is_preferred, block.source_id));

    Ok(ExportSpecies {
        taxonomy: ExportTaxonomy {
            genus: GENUS,
            subgenus: entry.subgenus,
            section: entry.section,
            subsection: entry.subsection,
            complex: entry.complex,
        },
        name: entry.name,
        author: entry.author,
        is_hybrid: entry.is_hybrid,
        conservation_status: entry.conservation_status,
        parent1: entry.parent1,
        parent2: entry.parent2,
        hybrids: entry.hybrids.into_iter().collect(),
        closely_related_to: entry.closely_related_to.into_iter().collect(),
        subspecies_varieties: entry.subspecies_varieties.into_iter().collect(),
        synonyms: entry.synonyms.into_iter().collect(),
        sources: blocks,
    })
}
