//! Core domain logic for the oak reference store.
//! This crate is the single source of truth for storage and merge invariants.

pub mod config;
pub mod db;
pub mod export;
pub mod logging;
pub mod merge;
pub mod model;
pub mod repo;
pub mod schema;
pub mod service;

pub use config::{load_config, ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, DbError};
pub use export::{build_export, ExportDocument};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use merge::{
    Conflict, ConflictChoice, ConflictResolver, EntryOutcome, ImportEngine, ImportError,
    ImportReport,
};
pub use model::entry::{DataPoint, Entry};
pub use model::field::Field;
pub use model::source::{Source, SourceId};
pub use model::taxon::{Taxon, TaxonLevel, TaxonLink};
pub use repo::entry_repo::{EntryRepository, SqliteEntryRepository};
pub use repo::source_repo::{SourceRepository, SqliteSourceRepository};
pub use repo::taxon_repo::{SqliteTaxonRepository, TaxonRepository};
pub use repo::{EntityKey, ReferentialError, RepoError, RepoResult};
pub use schema::document::EntrySchema;
pub use schema::store::{FileSchemaStore, SchemaStore, SqliteSchemaStore};
pub use schema::validator::{SchemaValidator, ValidationError, Violation, ViolationKind};
pub use schema::SchemaError;
pub use service::entry_service::EntryService;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
