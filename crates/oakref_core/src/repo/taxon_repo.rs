//! Taxon repository: the controlled vocabulary for hierarchy fields.

use super::{
    ensure_connection_ready, normalize_optional, EntityKey, RepoError, RepoResult, RequiredTable,
};
use crate::model::taxon::{Taxon, TaxonLevel, TaxonLink};
use log::info;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};

const TAXON_SELECT_SQL: &str = "SELECT
    name,
    level,
    parent,
    author,
    notes,
    links
FROM taxa";

const REQUIRED_TABLES: &[RequiredTable] = &[(
    "taxa",
    &["name", "level", "parent", "author", "notes", "links"],
)];

/// Repository interface for taxon persistence.
pub trait TaxonRepository {
    fn create_taxon(&self, taxon: &Taxon) -> RepoResult<()>;
    fn update_taxon(&self, taxon: &Taxon) -> RepoResult<()>;
    fn get_taxon(&self, name: &str, level: TaxonLevel) -> RepoResult<Option<Taxon>>;
    /// Lists taxa ordered by level then name, optionally for one level.
    fn list_taxa(&self, level: Option<TaxonLevel>) -> RepoResult<Vec<Taxon>>;
    fn taxon_exists(&self, name: &str, level: TaxonLevel) -> RepoResult<bool>;
    fn delete_taxon(&self, name: &str, level: TaxonLevel) -> RepoResult<()>;
}

/// SQLite-backed taxon repository.
pub struct SqliteTaxonRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaxonRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, REQUIRED_TABLES)?;
        Ok(Self { conn })
    }
}

impl TaxonRepository for SqliteTaxonRepository<'_> {
    fn create_taxon(&self, taxon: &Taxon) -> RepoResult<()> {
        validate_taxon(taxon)?;
        let links = encode_links(&taxon.links)?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if taxon_exists(&tx, taxon.name.trim(), taxon.level)? {
            return Err(RepoError::AlreadyExists(taxon_key(taxon)));
        }
        tx.execute(
            "INSERT INTO taxa (name, level, parent, author, notes, links)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                taxon.name.trim(),
                taxon.level.as_str(),
                normalize_optional(taxon.parent.as_deref()),
                normalize_optional(taxon.author.as_deref()),
                normalize_optional(taxon.notes.as_deref()),
                links,
            ],
        )?;
        tx.commit()?;

        info!(
            "event=taxon_create module=repo status=ok level={}",
            taxon.level
        );
        Ok(())
    }

    fn update_taxon(&self, taxon: &Taxon) -> RepoResult<()> {
        validate_taxon(taxon)?;
        let links = encode_links(&taxon.links)?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE taxa
             SET
                parent = ?1,
                author = ?2,
                notes = ?3,
                links = ?4
             WHERE name = ?5 AND level = ?6;",
            params![
                normalize_optional(taxon.parent.as_deref()),
                normalize_optional(taxon.author.as_deref()),
                normalize_optional(taxon.notes.as_deref()),
                links,
                taxon.name.trim(),
                taxon.level.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(taxon_key(taxon)));
        }
        tx.commit()?;
        Ok(())
    }

    fn get_taxon(&self, name: &str, level: TaxonLevel) -> RepoResult<Option<Taxon>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TAXON_SELECT_SQL} WHERE name = ?1 AND level = ?2;"
        ))?;
        let mut rows = stmt.query(params![name, level.as_str()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_taxon_row(row)?));
        }
        Ok(None)
    }

    fn list_taxa(&self, level: Option<TaxonLevel>) -> RepoResult<Vec<Taxon>> {
        let mut sql = format!("{TAXON_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();
        if let Some(level) = level {
            sql.push_str(" AND level = ?");
            bind_values.push(Value::Text(level.as_str().to_string()));
        }
        sql.push_str(
            " ORDER BY CASE level
                WHEN 'subgenus' THEN 0
                WHEN 'section' THEN 1
                WHEN 'subsection' THEN 2
                ELSE 3
              END, name ASC",
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut taxa = Vec::new();
        while let Some(row) = rows.next()? {
            taxa.push(parse_taxon_row(row)?);
        }
        Ok(taxa)
    }

    fn taxon_exists(&self, name: &str, level: TaxonLevel) -> RepoResult<bool> {
        taxon_exists(self.conn, name, level)
    }

    fn delete_taxon(&self, name: &str, level: TaxonLevel) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "DELETE FROM taxa WHERE name = ?1 AND level = ?2;",
            params![name, level.as_str()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(EntityKey::Taxon {
                name: name.to_string(),
                level,
            }));
        }
        tx.commit()?;

        info!("event=taxon_delete module=repo status=ok level={level}");
        Ok(())
    }
}

fn taxon_exists(conn: &Connection, name: &str, level: TaxonLevel) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM taxa WHERE name = ?1 AND level = ?2);",
        params![name, level.as_str()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn taxon_key(taxon: &Taxon) -> EntityKey {
    EntityKey::Taxon {
        name: taxon.name.trim().to_string(),
        level: taxon.level,
    }
}

fn validate_taxon(taxon: &Taxon) -> RepoResult<()> {
    if taxon.name.trim().is_empty() {
        return Err(RepoError::InvalidInput("taxon name cannot be empty".to_string()));
    }
    if let Some(link) = taxon
        .links
        .iter()
        .find(|link| link.url.trim().is_empty())
    {
        return Err(RepoError::InvalidInput(format!(
            "taxon link `{}` has an empty url",
            link.label
        )));
    }
    Ok(())
}

fn encode_links(links: &[TaxonLink]) -> RepoResult<String> {
    serde_json::to_string(links)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode taxon links: {err}")))
}

fn parse_taxon_row(row: &Row<'_>) -> RepoResult<Taxon> {
    let level_text: String = row.get("level")?;
    let level = TaxonLevel::parse(&level_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid taxon level `{level_text}` in taxa.level"))
    })?;
    let links_text: String = row.get("links")?;
    let links = serde_json::from_str(&links_text)
        .map_err(|err| RepoError::InvalidData(format!("invalid links in taxa.links: {err}")))?;

    Ok(Taxon {
        name: row.get("name")?,
        level,
        parent: row.get("parent")?,
        author: row.get("author")?,
        notes: row.get("notes")?,
        links,
    })
}
