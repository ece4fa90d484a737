//! Source repository contracts and SQLite implementation.
//!
//! # Invariants
//! - Source ids are assigned by the store and never change.
//! - A source referenced by any data point or preferred by any entry cannot
//!   be deleted.

use super::{
    ensure_connection_ready, normalize_optional, EntityKey, ReferentialError, RepoError,
    RepoResult, RequiredTable,
};
use crate::model::source::{Source, SourceId};
use log::{info, warn};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};

const SOURCE_SELECT_SQL: &str = "SELECT
    id,
    source_type,
    name,
    description,
    author,
    year,
    url,
    isbn,
    doi,
    notes,
    license,
    license_url
FROM sources";

const REQUIRED_TABLES: &[RequiredTable] = &[
    (
        "sources",
        &[
            "id",
            "source_type",
            "name",
            "description",
            "author",
            "year",
            "url",
            "isbn",
            "doi",
            "notes",
            "license",
            "license_url",
        ],
    ),
    ("data_points", &["source_id"]),
    ("entries", &["preferred_source"]),
];

/// Repository interface for source persistence.
pub trait SourceRepository {
    /// Inserts a source and returns the assigned id. `source.id` is ignored.
    fn create_source(&self, source: &Source) -> RepoResult<SourceId>;
    /// Replaces metadata of an existing source.
    fn update_source(&self, source: &Source) -> RepoResult<()>;
    fn get_source(&self, id: SourceId) -> RepoResult<Option<Source>>;
    /// Lists every source ordered by id.
    fn list_sources(&self) -> RepoResult<Vec<Source>>;
    fn source_exists(&self, id: SourceId) -> RepoResult<bool>;
    /// Deletes an unreferenced source.
    fn delete_source(&self, id: SourceId) -> RepoResult<()>;
}

/// SQLite-backed source repository.
pub struct SqliteSourceRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSourceRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, REQUIRED_TABLES)?;
        Ok(Self { conn })
    }
}

impl SourceRepository for SqliteSourceRepository<'_> {
    fn create_source(&self, source: &Source) -> RepoResult<SourceId> {
        validate_source(source)?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO sources (
                source_type,
                name,
                description,
                author,
                year,
                url,
                isbn,
                doi,
                notes,
                license,
                license_url
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
            params![
                source.source_type.trim(),
                source.name.trim(),
                normalize_optional(source.description.as_deref()),
                normalize_optional(source.author.as_deref()),
                source.year,
                normalize_optional(source.url.as_deref()),
                normalize_optional(source.isbn.as_deref()),
                normalize_optional(source.doi.as_deref()),
                normalize_optional(source.notes.as_deref()),
                normalize_optional(source.license.as_deref()),
                normalize_optional(source.license_url.as_deref()),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        info!("event=source_create module=repo status=ok source_id={id}");
        Ok(id)
    }

    fn update_source(&self, source: &Source) -> RepoResult<()> {
        validate_source(source)?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE sources
             SET
                source_type = ?1,
                name = ?2,
                description = ?3,
                author = ?4,
                year = ?5,
                url = ?6,
                isbn = ?7,
                doi = ?8,
                notes = ?9,
                license = ?10,
                license_url = ?11
             WHERE id = ?12;",
            params![
                source.source_type.trim(),
                source.name.trim(),
                normalize_optional(source.description.as_deref()),
                normalize_optional(source.author.as_deref()),
                source.year,
                normalize_optional(source.url.as_deref()),
                normalize_optional(source.isbn.as_deref()),
                normalize_optional(source.doi.as_deref()),
                normalize_optional(source.notes.as_deref()),
                normalize_optional(source.license.as_deref()),
                normalize_optional(source.license_url.as_deref()),
                source.id,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(EntityKey::Source(source.id)));
        }
        tx.commit()?;
        Ok(())
    }

    fn get_source(&self, id: SourceId) -> RepoResult<Option<Source>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SOURCE_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_source_row(row)?));
        }
        Ok(None)
    }

    fn list_sources(&self) -> RepoResult<Vec<Source>> {
        load_all_sources(self.conn)
    }

    fn source_exists(&self, id: SourceId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sources WHERE id = ?1);",
            [id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn delete_source(&self, id: SourceId) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let (data_points, preferred_by): (i64, i64) = tx.query_row(
            "SELECT
                (SELECT COUNT(*) FROM data_points WHERE source_id = ?1),
                (SELECT COUNT(*) FROM entries WHERE preferred_source = ?1);",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        if data_points > 0 || preferred_by > 0 {
            warn!(
                "event=source_delete module=repo status=rejected source_id={id} data_points={data_points} preferred_by={preferred_by}"
            );
            return Err(ReferentialError::SourceInUse {
                source_id: id,
                data_points,
                preferred_by,
            }
            .into());
        }

        let changed = tx.execute("DELETE FROM sources WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::NotFound(EntityKey::Source(id)));
        }
        tx.commit()?;

        info!("event=source_delete module=repo status=ok source_id={id}");
        Ok(())
    }
}

/// Loads every source ordered by id.
pub(crate) fn load_all_sources(conn: &Connection) -> RepoResult<Vec<Source>> {
    let mut stmt = conn.prepare(&format!("{SOURCE_SELECT_SQL} ORDER BY id ASC;"))?;
    let mut rows = stmt.query([])?;
    let mut sources = Vec::new();
    while let Some(row) = rows.next()? {
        sources.push(parse_source_row(row)?);
    }
    Ok(sources)
}

fn validate_source(source: &Source) -> RepoResult<()> {
    if source.name.trim().is_empty() {
        return Err(RepoError::InvalidInput("source name cannot be empty".to_string()));
    }
    if source.source_type.trim().is_empty() {
        return Err(RepoError::InvalidInput(
            "source type cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn parse_source_row(row: &Row<'_>) -> RepoResult<Source> {
    Ok(Source {
        id: row.get("id")?,
        source_type: row.get("source_type")?,
        name: row.get("name")?,
        description: row.get("description")?,
        author: row.get("author")?,
        year: row.get("year")?,
        url: row.get("url")?,
        isbn: row.get("isbn")?,
        doi: row.get("doi")?,
        notes: row.get("notes")?,
        license: row.get("license")?,
        license_url: row.get("license_url")?,
    })
}
