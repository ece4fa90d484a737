//! Schema document persistence.
//!
//! # Invariants
//! - `persist` either stores the full document or leaves the previous one.
//! - `load` returns `None` when nothing was persisted yet.

use super::document::EntrySchema;
use super::SchemaError;
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};

/// Storage backend for the schema document.
pub trait SchemaStore {
    /// Loads the persisted document, if any.
    fn load(&self) -> Result<Option<EntrySchema>, SchemaError>;
    /// Replaces the persisted document.
    fn persist(&self, schema: &EntrySchema) -> Result<(), SchemaError>;

    /// Loads the persisted document or falls back to the built-in one.
    fn load_or_builtin(&self) -> Result<EntrySchema, SchemaError> {
        match self.load()? {
            Some(schema) => Ok(schema),
            None => EntrySchema::builtin(),
        }
    }
}

/// JSON file store. Writes go to a sibling temp file, then rename.
#[derive(Debug, Clone)]
pub struct FileSchemaStore {
    path: PathBuf,
}

impl FileSchemaStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, error: std::io::Error) -> SchemaError {
        SchemaError::Io {
            path: self.path.clone(),
            error,
        }
    }
}

impl SchemaStore for FileSchemaStore {
    fn load(&self) -> Result<Option<EntrySchema>, SchemaError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => EntrySchema::from_json_str(&text).map(Some),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(self.io_error(error)),
        }
    }

    fn persist(&self, schema: &EntrySchema) -> Result<(), SchemaError> {
        let text = schema.to_json_pretty()?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|error| self.io_error(error))?;
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        std::fs::write(&tmp_path, text).map_err(|error| self.io_error(error))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|error| self.io_error(error))?;

        info!(
            "event=schema_persist module=schema status=ok backend=file path={}",
            self.path.display()
        );
        Ok(())
    }
}

/// Single-row store in the `schema_documents` table.
pub struct SqliteSchemaStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSchemaStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SchemaStore for SqliteSchemaStore<'_> {
    fn load(&self) -> Result<Option<EntrySchema>, SchemaError> {
        let text: Option<String> = self
            .conn
            .query_row(
                "SELECT document FROM schema_documents WHERE id = 1;",
                [],
                |row| row.get(0),
            )
            .optional()?;
        text.map(|text| EntrySchema::from_json_str(&text))
            .transpose()
    }

    fn persist(&self, schema: &EntrySchema) -> Result<(), SchemaError> {
        let text = schema.to_json_pretty()?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO schema_documents (id, document, updated_at)
             VALUES (1, ?1, (strftime('%s', 'now') * 1000))
             ON CONFLICT(id) DO UPDATE SET
                document = excluded.document,
                updated_at = excluded.updated_at;",
            params![text],
        )?;
        tx.commit()?;

        info!("event=schema_persist module=schema status=ok backend=sqlite");
        Ok(())
    }
}

/// File store when `schema_path` is set, otherwise the database row.
pub fn open_schema_store<'conn>(
    schema_path: Option<&Path>,
    conn: &'conn Connection,
) -> Box<dyn SchemaStore + 'conn> {
    match schema_path {
        Some(path) => Box::new(FileSchemaStore::new(path)),
        None => Box::new(SqliteSchemaStore::new(conn)),
    }
}

#[cfg(test)]
mod tests {
    use super::{FileSchemaStore, SchemaStore, SqliteSchemaStore};
    use crate::db::open_db_in_memory;
    use crate::schema::document::EntrySchema;

    #[test]
    fn file_store_returns_none_until_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSchemaStore::new(dir.path().join("nested").join("schema.json"));
        assert!(store.load().unwrap().is_none());

        let mut schema = EntrySchema::builtin().unwrap();
        schema
            .enumerations
            .insert("habitat".to_string(), vec!["dry".to_string()]);
        store.persist(&schema).unwrap();

        assert_eq!(store.load().unwrap(), Some(schema));
    }

    #[test]
    fn sqlite_store_overwrites_single_row() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteSchemaStore::new(&conn);
        assert_eq!(store.load_or_builtin().unwrap(), EntrySchema::builtin().unwrap());

        let mut schema = EntrySchema::builtin().unwrap();
        store.persist(&schema).unwrap();
        schema.required.push("author".to_string());
        store.persist(&schema).unwrap();

        assert_eq!(store.load().unwrap(), Some(schema));
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_documents;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }
}
