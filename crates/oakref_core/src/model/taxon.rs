//! Reference taxonomy hierarchy.
//!
//! Taxa form a controlled vocabulary for an entry's hierarchy fields:
//! Genus (Quercus) -> Subgenus -> Section -> Subsection -> Complex -> Species.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Genus every stored entry belongs to.
pub const GENUS: &str = "Quercus";

/// Rank of a taxon inside the genus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxonLevel {
    Subgenus,
    Section,
    Subsection,
    Complex,
}

impl TaxonLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subgenus => "subgenus",
            Self::Section => "section",
            Self::Subsection => "subsection",
            Self::Complex => "complex",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "subgenus" => Some(Self::Subgenus),
            "section" => Some(Self::Section),
            "subsection" => Some(Self::Subsection),
            "complex" => Some(Self::Complex),
            _ => None,
        }
    }
}

impl Display for TaxonLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Labeled external link for a taxon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonLink {
    pub label: String,
    pub url: String,
}

/// Reference hierarchy row keyed by `(name, level)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxon {
    pub name: String,
    pub level: TaxonLevel,
    /// Name of the enclosing taxon, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<TaxonLink>,
}

impl Taxon {
    pub fn new(name: impl Into<String>, level: TaxonLevel) -> Self {
        Self {
            name: name.into(),
            level,
            parent: None,
            author: None,
            notes: None,
            links: Vec::new(),
        }
    }
}
