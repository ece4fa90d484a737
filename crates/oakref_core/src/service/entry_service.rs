//! Entry use-case service.
//!
//! # Responsibility
//! - Provide stable entry CRUD entry points for CLI/API callers.
//! - Check hierarchy fields against the taxon vocabulary before delegating
//!   to the entry repository.
//!
//! # Invariants
//! - Service APIs never bypass repository validation/persistence contracts.
//! - Taxonomy checks only read; no transaction is open while they run.

use crate::model::entry::Entry;
use crate::repo::entry_repo::EntryRepository;
use crate::repo::taxon_repo::TaxonRepository;
use crate::repo::RepoResult;
use crate::schema::validator::{ValidationError, Violation, ViolationKind};

/// Use-case service wrapper for entry operations.
pub struct EntryService<E: EntryRepository, T: TaxonRepository> {
    entries: E,
    taxa: T,
}

impl<E: EntryRepository, T: TaxonRepository> EntryService<E, T> {
    pub fn new(entries: E, taxa: T) -> Self {
        Self { entries, taxa }
    }

    pub fn create_entry(&self, entry: &Entry) -> RepoResult<()> {
        self.check_taxonomy(entry)?;
        self.entries.create_entry(entry)
    }

    pub fn update_entry(&self, entry: &Entry) -> RepoResult<()> {
        self.check_taxonomy(entry)?;
        self.entries.update_entry(entry)
    }

    pub fn save_entry(&self, entry: &Entry) -> RepoResult<()> {
        self.check_taxonomy(entry)?;
        self.entries.save_entry(entry)
    }

    pub fn get_entry(&self, name: &str) -> RepoResult<Option<Entry>> {
        self.entries.get_entry(name)
    }

    pub fn list_entries(&self) -> RepoResult<Vec<Entry>> {
        self.entries.list_entries()
    }

    pub fn search_entry_names(&self, fragment: &str) -> RepoResult<Vec<String>> {
        self.entries.search_entry_names(fragment)
    }

    pub fn delete_entry(&self, name: &str) -> RepoResult<()> {
        self.entries.delete_entry(name)
    }

    /// Reports every hierarchy field that names an unknown taxon.
    pub fn check_taxonomy(&self, entry: &Entry) -> RepoResult<()> {
        let violations = taxonomy_violations(&self.taxa, entry)?;
        if violations.is_empty() {
            return Ok(());
        }
        Err(ValidationError {
            entry: entry.name.clone(),
            violations,
        }
        .into())
    }
}

/// Hierarchy fields of `entry` that name no stored taxon at their level.
///
/// Read-only; shared by the entry service and the import engine.
pub fn taxonomy_violations<T: TaxonRepository + ?Sized>(
    taxa: &T,
    entry: &Entry,
) -> RepoResult<Vec<Violation>> {
    let mut violations = Vec::new();
    for (level, value) in entry.taxonomy_placement() {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if !taxa.taxon_exists(value, level)? {
            violations.push(Violation::new(
                level.as_str(),
                Some(value),
                ViolationKind::UnknownTaxon { level },
            ));
        }
    }
    Ok(violations)
}
