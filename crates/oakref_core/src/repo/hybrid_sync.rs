//! Hybrid <-> parent link reconciliation.
//!
//! # Responsibility
//! - Diff a hybrid's previously stored parent set against the incoming one.
//! - Apply the diff to the parents' `hybrids` name sets.
//!
//! # Invariants
//! - Runs on the caller's connection/transaction; never opens its own.
//! - Parents present in both sets are never touched.
//! - Adding a present name and removing an absent name are no-ops.
//! - A missing parent row is skipped; the link is restored by
//!   [`backfill_hybrids`] when that parent is saved later.

use super::{decode_name_set, encode_name_set, RepoResult};
use crate::model::entry::Entry;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;

/// Parent names to unlink from and link to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentDiff {
    pub removed: BTreeSet<String>,
    pub added: BTreeSet<String>,
}

impl ParentDiff {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Computes the parent diff between the stored and incoming entry.
///
/// Returns `None` when neither version is a hybrid: a plain entry never
/// reads or writes any parent's hybrids. Parents of a non-hybrid version
/// count as empty, so demoting a hybrid unlinks it from its parents.
pub fn diff_parents(previous: Option<&Entry>, incoming: &Entry) -> Option<ParentDiff> {
    let previous = previous.filter(|entry| entry.is_hybrid);
    if previous.is_none() && !incoming.is_hybrid {
        return None;
    }

    let old_parents = previous.map(Entry::parent_set).unwrap_or_default();
    let new_parents = if incoming.is_hybrid {
        incoming.parent_set()
    } else {
        BTreeSet::new()
    };

    Some(ParentDiff {
        removed: old_parents.difference(&new_parents).cloned().collect(),
        added: new_parents
            .difference(&old_parents)
            .filter(|parent| parent.as_str() != incoming.name)
            .cloned()
            .collect(),
    })
}

/// Applies `diff` for `child` on the given connection.
pub(crate) fn apply_parent_diff(conn: &Connection, child: &str, diff: &ParentDiff) -> RepoResult<()> {
    for parent in &diff.removed {
        update_hybrids(conn, parent, |hybrids| hybrids.remove(child))?;
    }
    for parent in &diff.added {
        update_hybrids(conn, parent, |hybrids| hybrids.insert(child.to_string()))?;
    }
    Ok(())
}

/// Removes `child` from every listed parent's hybrids.
pub(crate) fn unlink_from_parents(
    conn: &Connection,
    child: &str,
    parents: &BTreeSet<String>,
) -> RepoResult<()> {
    for parent in parents {
        update_hybrids(conn, parent, |hybrids| hybrids.remove(child))?;
    }
    Ok(())
}

/// Names of stored hybrids whose parent pointers name `parent`.
pub(crate) fn backfill_hybrids(conn: &Connection, parent: &str) -> RepoResult<BTreeSet<String>> {
    let mut stmt = conn.prepare(
        "SELECT name
         FROM entries
         WHERE is_hybrid = 1
           AND name <> ?1
           AND (TRIM(parent1) = ?1 OR TRIM(parent2) = ?1)
         ORDER BY name ASC;",
    )?;
    let mut rows = stmt.query([parent])?;
    let mut children = BTreeSet::new();
    while let Some(row) = rows.next()? {
        children.insert(row.get::<_, String>(0)?);
    }
    Ok(children)
}

fn update_hybrids(
    conn: &Connection,
    parent: &str,
    change: impl FnOnce(&mut BTreeSet<String>) -> bool,
) -> RepoResult<()> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT hybrids FROM entries WHERE name = ?1;",
            [parent],
            |row| row.get(0),
        )
        .optional()?;
    let Some(stored) = stored else {
        debug!("event=hybrid_sync module=repo status=skip reason=parent_missing");
        return Ok(());
    };

    let mut hybrids = decode_name_set("entries.hybrids", &stored)?;
    if !change(&mut hybrids) {
        return Ok(());
    }

    conn.execute(
        "UPDATE entries
         SET
            hybrids = ?1,
            updated_at = (strftime('%s', 'now') * 1000)
         WHERE name = ?2;",
        params![encode_name_set(&hybrids)?, parent],
    )?;
    Ok(())
}
