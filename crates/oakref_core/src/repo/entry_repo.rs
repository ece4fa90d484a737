//! Entry repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist entries together with their per-field data point collections.
//! - Run hybrid link reconciliation inside the same transaction as the save.
//!
//! # Invariants
//! - Saving replaces each field's data points in full (delete then insert).
//! - At most one data point exists per `(entry, field, source)`.
//! - After every successful save, each stored parent's `hybrids` contains
//!   every stored hybrid naming it as `parent1` or `parent2`.
//! - Reads never require a transaction.

use super::hybrid_sync::{apply_parent_diff, backfill_hybrids, diff_parents, unlink_from_parents};
use super::{
    bool_to_int, decode_name_set, encode_name_set, ensure_connection_ready, int_to_bool,
    EntityKey, ReferentialError, RepoError, RepoResult, RequiredTable,
};
use crate::model::entry::{DataPoint, Entry};
use crate::model::field::Field;
use crate::model::source::SourceId;
use crate::schema::validator::SchemaValidator;
use log::{error, info};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use std::time::Instant;

const ENTRY_SELECT_SQL: &str = "SELECT
    name,
    author,
    is_hybrid,
    conservation_status,
    subgenus,
    section,
    subsection,
    complex,
    parent1,
    parent2,
    hybrids,
    closely_related_to,
    subspecies_varieties,
    synonyms,
    preferred_source
FROM entries";

const REQUIRED_TABLES: &[RequiredTable] = &[
    (
        "entries",
        &[
            "name",
            "author",
            "is_hybrid",
            "conservation_status",
            "subgenus",
            "section",
            "subsection",
            "complex",
            "parent1",
            "parent2",
            "hybrids",
            "closely_related_to",
            "subspecies_varieties",
            "synonyms",
            "preferred_source",
        ],
    ),
    (
        "data_points",
        &["entry_name", "field", "value", "source_id", "page"],
    ),
    ("sources", &["id"]),
];

/// Repository interface for entry persistence.
pub trait EntryRepository {
    /// Inserts a new entry; fails with `AlreadyExists` when the key is taken.
    fn create_entry(&self, entry: &Entry) -> RepoResult<()>;
    /// Replaces an existing entry; fails with `NotFound` when absent.
    fn update_entry(&self, entry: &Entry) -> RepoResult<()>;
    /// Inserts or replaces an entry with all of its data points.
    fn save_entry(&self, entry: &Entry) -> RepoResult<()>;
    /// Loads one entry, `None` when the key is absent.
    fn get_entry(&self, name: &str) -> RepoResult<Option<Entry>>;
    /// Lists every entry ordered by name.
    fn list_entries(&self) -> RepoResult<Vec<Entry>>;
    /// Case-insensitive substring match on entry names.
    fn search_entry_names(&self, fragment: &str) -> RepoResult<Vec<String>>;
    /// Deletes one entry and its data points.
    fn delete_entry(&self, name: &str) -> RepoResult<()>;
}

/// SQLite-backed entry repository.
pub struct SqliteEntryRepository<'a> {
    conn: &'a Connection,
    validator: &'a SchemaValidator,
}

impl<'a> SqliteEntryRepository<'a> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'a Connection, validator: &'a SchemaValidator) -> RepoResult<Self> {
        ensure_entry_connection_ready(conn)?;
        Ok(Self { conn, validator })
    }

    /// Validates, then writes inside one transaction after `precondition`.
    fn write(
        &self,
        operation: &'static str,
        entry: &Entry,
        precondition: impl FnOnce(&Connection) -> RepoResult<()>,
    ) -> RepoResult<()> {
        self.validator.validate(entry)?;

        let started_at = Instant::now();
        let result = (|| -> RepoResult<()> {
            let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
            precondition(&*tx)?;
            write_entry(&tx, entry)?;
            tx.commit()?;
            Ok(())
        })();

        match &result {
            Ok(()) => info!(
                "event=entry_{operation} module=repo status=ok duration_ms={} data_points={}",
                started_at.elapsed().as_millis(),
                entry.data_point_count()
            ),
            Err(err) => error!(
                "event=entry_{operation} module=repo status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }
}

impl EntryRepository for SqliteEntryRepository<'_> {
    fn create_entry(&self, entry: &Entry) -> RepoResult<()> {
        self.write("create", entry, |conn| {
            if entry_exists(conn, &entry.name)? {
                return Err(RepoError::AlreadyExists(EntityKey::Entry(entry.name.clone())));
            }
            Ok(())
        })
    }

    fn update_entry(&self, entry: &Entry) -> RepoResult<()> {
        self.write("update", entry, |conn| {
            if !entry_exists(conn, &entry.name)? {
                return Err(RepoError::NotFound(EntityKey::Entry(entry.name.clone())));
            }
            Ok(())
        })
    }

    fn save_entry(&self, entry: &Entry) -> RepoResult<()> {
        self.write("save", entry, |_| Ok(()))
    }

    fn get_entry(&self, name: &str) -> RepoResult<Option<Entry>> {
        load_entry(self.conn, name)
    }

    fn list_entries(&self) -> RepoResult<Vec<Entry>> {
        load_all_entries(self.conn)
    }

    fn search_entry_names(&self, fragment: &str) -> RepoResult<Vec<String>> {
        let pattern = format!("%{}%", escape_like(fragment.trim()));
        let mut stmt = self.conn.prepare(
            "SELECT name
             FROM entries
             WHERE name LIKE ?1 ESCAPE '\\'
             ORDER BY name ASC;",
        )?;
        let mut rows = stmt.query([pattern])?;
        let mut names = Vec::new();
        while let Some(row) = rows.next()? {
            names.push(row.get(0)?);
        }
        Ok(names)
    }

    fn delete_entry(&self, name: &str) -> RepoResult<()> {
        let started_at = Instant::now();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let Some(previous) = load_entry(&tx, name)? else {
            return Err(RepoError::NotFound(EntityKey::Entry(name.to_string())));
        };
        tx.execute("DELETE FROM entries WHERE name = ?1;", [name])?;
        unlink_from_parents(&tx, name, &previous.parent_set())?;
        tx.commit()?;

        info!(
            "event=entry_delete module=repo status=ok duration_ms={} data_points={}",
            started_at.elapsed().as_millis(),
            previous.data_point_count()
        );
        Ok(())
    }
}

/// Writes one already-validated entry on the caller's transaction.
///
/// Reads the stored version first, replaces the row and every field's data
/// points, then reconciles parent `hybrids` from the explicit diff.
///
/// # Errors
/// - `Referential` when a data point or the preferred source names a
///   missing source.
pub(crate) fn write_entry(conn: &Connection, entry: &Entry) -> RepoResult<()> {
    let previous = load_entry(conn, &entry.name)?;
    ensure_sources_exist(conn, entry)?;

    let mut hybrids = entry.hybrids.clone();
    hybrids.extend(backfill_hybrids(conn, &entry.name)?);

    conn.execute(
        "INSERT INTO entries (
            name,
            author,
            is_hybrid,
            conservation_status,
            subgenus,
            section,
            subsection,
            complex,
            parent1,
            parent2,
            hybrids,
            closely_related_to,
            subspecies_varieties,
            synonyms,
            preferred_source
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        ON CONFLICT(name) DO UPDATE SET
            author = excluded.author,
            is_hybrid = excluded.is_hybrid,
            conservation_status = excluded.conservation_status,
            subgenus = excluded.subgenus,
            section = excluded.section,
            subsection = excluded.subsection,
            complex = excluded.complex,
            parent1 = excluded.parent1,
            parent2 = excluded.parent2,
            hybrids = excluded.hybrids,
            closely_related_to = excluded.closely_related_to,
            subspecies_varieties = excluded.subspecies_varieties,
            synonyms = excluded.synonyms,
            preferred_source = excluded.preferred_source,
            updated_at = (strftime('%s', 'now') * 1000);",
        params![
            entry.name.as_str(),
            entry.author.as_deref(),
            bool_to_int(entry.is_hybrid),
            entry.conservation_status.as_deref(),
            entry.subgenus.as_deref(),
            entry.section.as_deref(),
            entry.subsection.as_deref(),
            entry.complex.as_deref(),
            entry.parent1.as_deref(),
            entry.parent2.as_deref(),
            encode_name_set(&hybrids)?,
            encode_name_set(&entry.closely_related_to)?,
            encode_name_set(&entry.subspecies_varieties)?,
            encode_name_set(&entry.synonyms)?,
            entry.preferred_source,
        ],
    )?;

    for field in Field::ALL {
        replace_field_data_points(conn, &entry.name, field, entry.data_points(field))?;
    }

    if let Some(diff) = diff_parents(previous.as_ref(), entry) {
        apply_parent_diff(conn, &entry.name, &diff)?;
    }

    Ok(())
}

/// Loads one entry with all data points.
pub(crate) fn load_entry(conn: &Connection, name: &str) -> RepoResult<Option<Entry>> {
    let mut stmt = conn.prepare(&format!("{ENTRY_SELECT_SQL} WHERE name = ?1;"))?;
    let mut rows = stmt.query([name])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };

    let mut entry = parse_entry_row(row)?;
    load_data_points(conn, &mut entry)?;
    Ok(Some(entry))
}

/// Loads every entry ordered by name.
pub(crate) fn load_all_entries(conn: &Connection) -> RepoResult<Vec<Entry>> {
    let mut stmt = conn.prepare(&format!("{ENTRY_SELECT_SQL} ORDER BY name ASC;"))?;
    let mut rows = stmt.query([])?;
    let mut entries = Vec::new();
    while let Some(row) = rows.next()? {
        entries.push(parse_entry_row(row)?);
    }
    for entry in &mut entries {
        load_data_points(conn, entry)?;
    }
    Ok(entries)
}

pub(crate) fn ensure_entry_connection_ready(conn: &Connection) -> RepoResult<()> {
    ensure_connection_ready(conn, REQUIRED_TABLES)
}

fn entry_exists(conn: &Connection, name: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM entries WHERE name = ?1);",
        [name],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn ensure_sources_exist(conn: &Connection, entry: &Entry) -> RepoResult<()> {
    let mut stmt = conn.prepare("SELECT EXISTS(SELECT 1 FROM sources WHERE id = ?1);")?;
    let mut source_exists = |source_id: SourceId| -> RepoResult<bool> {
        let exists: i64 = stmt.query_row([source_id], |row| row.get(0))?;
        Ok(exists == 1)
    };

    if let Some(source_id) = entry.preferred_source {
        if !source_exists(source_id)? {
            return Err(ReferentialError::UnknownSource {
                entry: entry.name.clone(),
                field: None,
                source_id,
            }
            .into());
        }
    }

    for field in Field::ALL {
        for point in entry.data_points(field) {
            if !source_exists(point.source_id)? {
                return Err(ReferentialError::UnknownSource {
                    entry: entry.name.clone(),
                    field: Some(field),
                    source_id: point.source_id,
                }
                .into());
            }
        }
    }

    Ok(())
}

fn replace_field_data_points(
    conn: &Connection,
    entry_name: &str,
    field: Field,
    points: &[DataPoint],
) -> RepoResult<()> {
    conn.execute(
        "DELETE FROM data_points WHERE entry_name = ?1 AND field = ?2;",
        params![entry_name, field.as_str()],
    )?;

    let mut insert = conn.prepare(
        "INSERT INTO data_points (entry_name, field, value, source_id, page)
         VALUES (?1, ?2, ?3, ?4, ?5);",
    )?;
    for point in points {
        insert.execute(params![
            entry_name,
            field.as_str(),
            point.value.as_str(),
            point.source_id,
            point.page.as_deref(),
        ])?;
    }
    Ok(())
}

fn load_data_points(conn: &Connection, entry: &mut Entry) -> RepoResult<()> {
    let mut stmt = conn.prepare(
        "SELECT field, value, source_id, page
         FROM data_points
         WHERE entry_name = ?1
         ORDER BY source_id ASC, id ASC;",
    )?;
    let mut rows = stmt.query([entry.name.as_str()])?;
    while let Some(row) = rows.next()? {
        let field_text: String = row.get(0)?;
        let field = Field::parse(&field_text).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid field `{field_text}` in data_points.field"
            ))
        })?;
        entry.data.entry(field).or_default().push(DataPoint {
            value: row.get(1)?,
            source_id: row.get(2)?,
            page: row.get(3)?,
        });
    }
    Ok(())
}

fn parse_entry_row(row: &Row<'_>) -> RepoResult<Entry> {
    let is_hybrid = int_to_bool("entries.is_hybrid", row.get("is_hybrid")?)?;

    Ok(Entry {
        name: row.get("name")?,
        author: row.get("author")?,
        is_hybrid,
        conservation_status: row.get("conservation_status")?,
        subgenus: row.get("subgenus")?,
        section: row.get("section")?,
        subsection: row.get("subsection")?,
        complex: row.get("complex")?,
        parent1: row.get("parent1")?,
        parent2: row.get("parent2")?,
        hybrids: decode_name_set("entries.hybrids", &row.get::<_, String>("hybrids")?)?,
        closely_related_to: decode_name_set(
            "entries.closely_related_to",
            &row.get::<_, String>("closely_related_to")?,
        )?,
        subspecies_varieties: decode_name_set(
            "entries.subspecies_varieties",
            &row.get::<_, String>("subspecies_varieties")?,
        )?,
        synonyms: decode_name_set("entries.synonyms", &row.get::<_, String>("synonyms")?)?,
        preferred_source: row.get("preferred_source")?,
        data: Default::default(),
    })
}

fn escape_like(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len());
    for ch in fragment.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
