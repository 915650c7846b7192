//! Resource kinds addressable by bulk operations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A server resource that supports bulk creation.
///
/// Each kind maps to its own endpoint family under
/// `/projects/{project_id}/{segment}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Table, dimension, metric and relationship schemas.
    SchemaMetadata,
    /// Business rules and domain knowledge.
    Context,
    /// Natural-language question paired with reference SQL.
    GoldenExample,
}

impl ResourceKind {
    /// All supported kinds.
    pub const ALL: [ResourceKind; 3] =
        [ResourceKind::SchemaMetadata, ResourceKind::Context, ResourceKind::GoldenExample];

    /// Returns the URL path segment for this kind.
    #[must_use]
    pub const fn path_segment(&self) -> &'static str {
        match self {
            Self::SchemaMetadata => "schema-metadata",
            Self::Context => "contexts",
            Self::GoldenExample => "golden-examples",
        }
    }

    /// Returns true if the server may persist one input of this kind as several
    /// split records.
    #[must_use]
    pub const fn supports_split(&self) -> bool {
        matches!(self, Self::SchemaMetadata)
    }

    /// Returns the lowercase name used in logs and error messages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaMetadata => "schema_metadata",
            Self::Context => "context",
            Self::GoldenExample => "golden_example",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_segments_are_distinct() {
        let segments: std::collections::HashSet<_> =
            ResourceKind::ALL.iter().map(ResourceKind::path_segment).collect();
        assert_eq!(segments.len(), ResourceKind::ALL.len());
    }

    #[test]
    fn test_only_schema_metadata_splits() {
        assert!(ResourceKind::SchemaMetadata.supports_split());
        assert!(!ResourceKind::Context.supports_split());
        assert!(!ResourceKind::GoldenExample.supports_split());
    }

    #[test]
    fn test_display_matches_as_str() {
        assert_eq!(ResourceKind::GoldenExample.to_string(), "golden_example");
    }
}
