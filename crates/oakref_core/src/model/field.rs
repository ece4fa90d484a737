//! Enumerated data point fields.
//!
//! The declared order of [`Field::ALL`] is the iteration order used by every
//! caller that walks fields (storage, validation, classification, export).

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Descriptive field that carries source-attributed data points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    CommonNames,
    LeafColor,
    BudShape,
    LeafShape,
    BarkTexture,
    Habitat,
    NativeRange,
    Height,
}

impl Field {
    /// Every field, in declared order.
    pub const ALL: [Field; 8] = [
        Field::CommonNames,
        Field::LeafColor,
        Field::BudShape,
        Field::LeafShape,
        Field::BarkTexture,
        Field::Habitat,
        Field::NativeRange,
        Field::Height,
    ];

    /// Stable storage/schema name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CommonNames => "common_names",
            Self::LeafColor => "leaf_color",
            Self::BudShape => "bud_shape",
            Self::LeafShape => "leaf_shape",
            Self::BarkTexture => "bark_texture",
            Self::Habitat => "habitat",
            Self::NativeRange => "native_range",
            Self::Height => "height",
        }
    }

    /// Parses a storage/schema name.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == value)
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::Field;

    #[test]
    fn parse_accepts_every_declared_name() {
        for field in Field::ALL {
            assert_eq!(Field::parse(field.as_str()), Some(field));
        }
        assert_eq!(Field::parse("leaf colour"), None);
    }

    #[test]
    fn ordering_follows_declaration() {
        let mut shuffled = vec![Field::Height, Field::CommonNames, Field::BarkTexture];
        shuffled.sort();
        assert_eq!(
            shuffled,
            vec![Field::CommonNames, Field::BarkTexture, Field::Height]
        );
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&Field::NativeRange).unwrap();
        assert_eq!(json, "\"native_range\"");
    }
}
