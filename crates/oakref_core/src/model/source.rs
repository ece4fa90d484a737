//! Source (reference) model.

use serde::{Deserialize, Serialize};

/// Store-assigned source identifier.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type SourceId = i64;

/// Bibliographic or observational reference that data points cite.
///
/// Identity (`id`) is immutable once assigned; metadata may be replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// `0` until the store assigns an id on create.
    #[serde(default)]
    pub id: SourceId,
    /// Book, Paper, Website, Observation, ...
    pub source_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_url: Option<String>,
}

impl Source {
    /// Creates an unsaved source with required metadata only.
    pub fn new(source_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source_type: source_type.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}
