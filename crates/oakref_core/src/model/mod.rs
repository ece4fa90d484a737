//! Domain model for the oak reference store.
//!
//! # Responsibility
//! - Define entries, sources, taxa and source-attributed data points.
//! - Keep in-memory shapes free of storage encodings.
//!
//! # Invariants
//! - An entry key is its scientific name without genus prefix.
//! - At most one data point per (entry, field, source).
//! - A parent named by a hybrid lists that hybrid in its `hybrids` set.

pub mod entry;
pub mod field;
pub mod source;
pub mod taxon;
