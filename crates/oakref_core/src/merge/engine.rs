//! Two-phase import engine.
//!
//! Phase 1 classifies every incoming entry and collects resolver decisions
//! without writing. Phase 2 opens one `IMMEDIATE` transaction and writes the
//! resolved, non-skipped entries; skipped and invalid entries never reach it.
//! Both the incoming and the planned entry must pass schema validation and
//! name only known taxa.

use super::classify::{attribute_to_source, classify_entry, incoming_point};
use super::{
    ConflictChoice, ConflictRecord, ConflictResolver, EntryOutcome, ImportError, ImportReport,
    Resolution,
};
use crate::model::entry::Entry;
use crate::model::source::SourceId;
use crate::repo::entry_repo::{ensure_entry_connection_ready, load_entry, write_entry};
use crate::repo::taxon_repo::SqliteTaxonRepository;
use crate::schema::validator::{SchemaValidator, ValidationError};
use crate::service::entry_service::taxonomy_violations;
use log::{error, info};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::collections::BTreeMap;
use std::time::Instant;

/// Bulk importer bound to one connection and validator.
pub struct ImportEngine<'a> {
    conn: &'a Connection,
    validator: &'a SchemaValidator,
    taxa: SqliteTaxonRepository<'a>,
}

/// Entry queued for the write phase.
struct PlannedWrite {
    entry: Entry,
    created: bool,
}

/// Result of planning one incoming entry.
enum Plan {
    Write(Entry),
    Unchanged,
    Skipped,
    Invalid(ValidationError),
}

impl<'a> ImportEngine<'a> {
    pub fn try_new(
        conn: &'a Connection,
        validator: &'a SchemaValidator,
    ) -> Result<Self, ImportError> {
        ensure_entry_connection_ready(conn)?;
        let taxa = SqliteTaxonRepository::try_new(conn)?;
        Ok(Self {
            conn,
            validator,
            taxa,
        })
    }

    /// Imports `entries` attributed to `source_id`.
    ///
    /// # Errors
    /// - `UnknownSource` before any classification when `source_id` is absent.
    /// - `Cancelled` when the resolver's checkpoint declines; nothing is kept.
    /// - Resolver and storage errors; nothing is kept.
    pub fn import(
        &self,
        source_id: SourceId,
        entries: Vec<Entry>,
        resolver: &mut dyn ConflictResolver,
    ) -> Result<ImportReport, ImportError> {
        let started_at = Instant::now();
        if !self.source_exists(source_id)? {
            error!("event=import module=merge status=error error_code=unknown_source");
            return Err(ImportError::UnknownSource(source_id));
        }

        let mut report = ImportReport {
            source_id,
            ..ImportReport::default()
        };
        let mut write_set: Vec<PlannedWrite> = Vec::new();
        let mut positions: BTreeMap<String, usize> = BTreeMap::new();

        for incoming in entries {
            let incoming = attribute_to_source(incoming, source_id);
            let name = incoming.name.clone();

            let queued = positions.get(&name).map(|&index| &write_set[index]);
            let (existing, created) = match queued {
                Some(planned) => (Some(planned.entry.clone()), planned.created),
                None => {
                    let stored = load_entry(self.conn, &name)?;
                    let created = stored.is_none();
                    (stored, created)
                }
            };

            let plan =
                self.plan_entry(existing.as_ref(), incoming, source_id, resolver, &mut report)?;
            let outcome = match plan {
                Plan::Write(entry) => {
                    let planned = PlannedWrite { entry, created };
                    match positions.get(&name) {
                        Some(&index) => write_set[index] = planned,
                        None => {
                            positions.insert(name.clone(), write_set.len());
                            write_set.push(planned);
                        }
                    }
                    if created {
                        EntryOutcome::Created
                    } else {
                        EntryOutcome::Updated
                    }
                }
                Plan::Unchanged => EntryOutcome::Unchanged,
                Plan::Skipped => EntryOutcome::Skipped,
                Plan::Invalid(err) => EntryOutcome::Invalid(err),
            };
            report.entries.push((name, outcome));
        }

        info!(
            "event=import_classify module=merge status=ok entries={} writes={} conflicts={} duration_ms={}",
            report.entries.len(),
            write_set.len(),
            report.conflicts.len(),
            started_at.elapsed().as_millis()
        );

        if let Err(err) = self.write_batch(&write_set, resolver) {
            error!(
                "event=import_write module=merge status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err);
        }

        info!(
            "event=import_write module=merge status=ok writes={} duration_ms={}",
            write_set.len(),
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }

    fn plan_entry(
        &self,
        existing: Option<&Entry>,
        incoming: Entry,
        source_id: SourceId,
        resolver: &mut dyn ConflictResolver,
        report: &mut ImportReport,
    ) -> Result<Plan, ImportError> {
        if let Some(err) = self.check(&incoming)? {
            return Ok(Plan::Invalid(err));
        }

        let classification = classify_entry(existing, &incoming, source_id);
        report.new_points += classification.new_points;
        report.unchanged_points += classification.unchanged_points;

        let mut planned = classification.planned;
        let mut conflicts = classification.conflicts.into_iter();
        let mut terminal = None;

        for conflict in conflicts.by_ref() {
            let resolution = match resolver.choose(&conflict)? {
                ConflictChoice::Keep => Resolution::Kept,
                ConflictChoice::Take => {
                    if let Some(point) = incoming_point(&incoming, &conflict) {
                        planned.upsert_data_point(conflict.field, point.clone());
                    }
                    Resolution::Taken
                }
                ConflictChoice::ManualMerge => {
                    let base = existing
                        .cloned()
                        .unwrap_or_else(|| Entry::new(incoming.name.clone()));
                    let merged = resolver.manual_merge(&base, &incoming)?;
                    if merged.name != incoming.name {
                        return Err(ImportError::Resolver(format!(
                            "manual merge renamed `{}` to `{}`",
                            incoming.name, merged.name
                        )));
                    }
                    planned = merged;
                    Resolution::Manual
                }
                ConflictChoice::Skip => Resolution::Skipped,
            };
            report.conflicts.push(ConflictRecord {
                conflict,
                resolution,
            });
            if matches!(resolution, Resolution::Manual | Resolution::Skipped) {
                terminal = Some(resolution);
                break;
            }
        }

        if let Some(resolution) = terminal {
            report
                .conflicts
                .extend(conflicts.map(|conflict| ConflictRecord { conflict, resolution }));
            if resolution == Resolution::Skipped {
                return Ok(Plan::Skipped);
            }
        }

        if let Some(err) = self.check(&planned)? {
            return Ok(Plan::Invalid(err));
        }
        if existing == Some(&planned) {
            return Ok(Plan::Unchanged);
        }
        Ok(Plan::Write(planned))
    }

    /// Schema violations, or failing that, unknown taxa.
    fn check(&self, entry: &Entry) -> Result<Option<ValidationError>, ImportError> {
        if let Err(err) = self.validator.validate(entry) {
            return Ok(Some(err));
        }
        let violations = taxonomy_violations(&self.taxa, entry)?;
        if violations.is_empty() {
            return Ok(None);
        }
        Ok(Some(ValidationError {
            entry: entry.name.clone(),
            violations,
        }))
    }

    fn write_batch(
        &self,
        write_set: &[PlannedWrite],
        resolver: &mut dyn ConflictResolver,
    ) -> Result<(), ImportError> {
        if write_set.is_empty() {
            return Ok(());
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        for planned in write_set {
            if !resolver.checkpoint(&planned.entry.name) {
                return Err(ImportError::Cancelled {
                    entry: planned.entry.name.clone(),
                });
            }
            write_entry(&tx, &planned.entry)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn source_exists(&self, source_id: SourceId) -> Result<bool, ImportError> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sources WHERE id = ?1);",
            [source_id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }
}
