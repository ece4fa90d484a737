//! Conflict-aware bulk import.
//!
//! # Responsibility
//! - Classify every incoming data point of the designated source as new,
//!   unchanged or conflicting, without touching storage.
//! - Route conflicts to a [`ConflictResolver`].
//! - Write the resolved, non-skipped entries in one batch transaction.
//!
//! # Invariants
//! - Only data points of the designated source are compared; other sources
//!   never produce conflicts.
//! - Cancellation or any error during the write phase rolls back the whole
//!   batch.

use crate::model::entry::Entry;
use crate::model::field::Field;
use crate::model::source::SourceId;
use crate::repo::RepoError;
use crate::schema::validator::ValidationError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod classify;
pub mod engine;

pub use engine::ImportEngine;

/// Same-source overwrite attempt for one `(entry, field)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub entry: String,
    pub field: Field,
    pub source_id: SourceId,
    pub existing: String,
    pub incoming: String,
}

impl Display for Conflict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "conflict on `{}`.{} for source {}: existing `{}`, imported `{}`",
            self.entry, self.field, self.source_id, self.existing, self.incoming
        )
    }
}

/// Resolver decision for one conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    /// Discard the imported value.
    Keep,
    /// Overwrite with the imported value.
    Take,
    /// Hand the whole entry to [`ConflictResolver::manual_merge`].
    ManualMerge,
    /// Exclude the whole incoming entry from the batch.
    Skip,
}

/// Terminal state of one conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Kept,
    Taken,
    Manual,
    Skipped,
}

/// Conflict plus the state it ended in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRecord {
    pub conflict: Conflict,
    pub resolution: Resolution,
}

/// Decision seam for conflicts, manual merges and cancellation.
pub trait ConflictResolver {
    /// Picks how one conflict is resolved.
    fn choose(&mut self, conflict: &Conflict) -> Result<ConflictChoice, ImportError>;

    /// Returns the merged entry for a manual merge.
    ///
    /// `existing` is the stored entry; `incoming` carries the imported
    /// values. The result is validated again before it is queued.
    fn manual_merge(&mut self, existing: &Entry, incoming: &Entry) -> Result<Entry, ImportError> {
        let _ = (existing, incoming);
        Err(ImportError::Resolver(
            "manual merge is not supported by this resolver".to_string(),
        ))
    }

    /// Called before each entry is written; `false` cancels the batch.
    fn checkpoint(&mut self, entry: &str) -> bool {
        let _ = entry;
        true
    }
}

/// Resolver answering every conflict with the same choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedChoice(pub ConflictChoice);

impl ConflictResolver for FixedChoice {
    fn choose(&mut self, _conflict: &Conflict) -> Result<ConflictChoice, ImportError> {
        Ok(self.0)
    }
}

/// Per-entry import result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    Created,
    Updated,
    Unchanged,
    Skipped,
    Invalid(ValidationError),
}

/// Import summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub source_id: SourceId,
    /// Outcomes in input order; repeated names report their last outcome.
    pub entries: Vec<(String, EntryOutcome)>,
    pub new_points: usize,
    pub unchanged_points: usize,
    pub conflicts: Vec<ConflictRecord>,
}

impl ImportReport {
    pub fn outcome(&self, name: &str) -> Option<&EntryOutcome> {
        self.entries
            .iter()
            .rev()
            .find(|(entry, _)| entry == name)
            .map(|(_, outcome)| outcome)
    }

    /// Number of entries written by the batch.
    pub fn written(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, outcome)| matches!(outcome, EntryOutcome::Created | EntryOutcome::Updated))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, outcome)| matches!(outcome, EntryOutcome::Skipped))
            .count()
    }

    pub fn invalid(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, outcome)| matches!(outcome, EntryOutcome::Invalid(_)))
            .count()
    }
}

/// Errors that abort an import. The batch is rolled back.
#[derive(Debug)]
pub enum ImportError {
    Repo(RepoError),
    /// Designated source does not exist.
    UnknownSource(SourceId),
    /// Resolver cancelled before `entry` was written.
    Cancelled { entry: String },
    /// Resolver failed (e.g. editor session aborted).
    Resolver(String),
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::UnknownSource(id) => write!(f, "import source {id} does not exist"),
            Self::Cancelled { entry } => write!(f, "import cancelled at entry `{entry}`"),
            Self::Resolver(message) => write!(f, "conflict resolver failed: {message}"),
        }
    }
}

impl Error for ImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::UnknownSource(_) | Self::Cancelled { .. } | Self::Resolver(_) => None,
        }
    }
}

impl From<RepoError> for ImportError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<rusqlite::Error> for ImportError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(value.into())
    }
}
