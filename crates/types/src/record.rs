//! Server records and split metadata.
//!
//! The server may persist one logical input as several physical records that
//! share a `split_group_id`. This module holds the wire shape of a record
//! ([`ServerRecord`]), the record-or-array response shape ([`OneOrMany`]), and
//! the client-side view of a persisted record ([`PhysicalRecord`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::{
    error::{ModelError, Result},
    schema::SchemaData,
};

/// Position of a record within its split group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SplitInfo {
    /// Identifier shared by every part of the group.
    pub group_id: String,
    /// 1-based position within the group.
    pub index: u32,
    /// Number of parts in the group.
    pub total: u32,
}

/// A record exactly as the server returns it.
///
/// Absent split fields mean the record is not split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRecord {
    /// Server-assigned identifier.
    pub id: String,
    /// Split group identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_group_id: Option<String>,
    /// 1-based position within the split group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_index: Option<u32>,
    /// Number of parts in the split group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_splits: Option<u32>,
    /// Domain fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ServerRecord {
    /// Returns true if any of the three split fields is present.
    #[must_use]
    pub fn has_split_fields(&self) -> bool {
        self.split_group_id.is_some() || self.split_index.is_some() || self.total_splits.is_some()
    }
}

/// Either a single value or an array of values.
///
/// Bulk responses carry one entry per submitted input; an entry is an array
/// when the server split that input into several records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    /// Array of values.
    Many(Vec<T>),
    /// Single value.
    One(T),
}

impl<T> OneOrMany<T> {
    /// Returns the number of contained values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(items) => items.len(),
        }
    }

    /// Returns true if this is an empty array.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattens into a vector.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }
}

/// Kind of data-integrity problem found while normalizing a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegrityIssue {
    /// A split entry carried no `split_group_id`; one was derived.
    SynthesizedGroupId,
    /// A split entry lacked `split_index`/`total_splits`; positions were derived.
    SynthesizedSplitIndex,
    /// A split entry's indices were not exactly `1..=parts`, or a part's
    /// `total_splits` disagreed with the number of parts returned. The
    /// server's values are kept as received.
    InconsistentSplitPositions,
}

/// Non-fatal warning attached to records whose split metadata was synthesized
/// or found inconsistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataIntegrityWarning {
    /// What was synthesized or found wrong.
    pub issue: IntegrityIssue,
    /// Input whose response entry was affected.
    pub origin_sequence_index: usize,
    /// Group identifier the affected records ended up with.
    pub group_id: String,
    /// Human-readable description.
    pub message: String,
}

/// Client-side read-only copy of one persisted record.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalRecord {
    /// Server-assigned identifier.
    pub id: String,
    /// Position of the input that produced this record; `None` for records
    /// obtained from a listing rather than a create call.
    pub origin_sequence_index: Option<usize>,
    /// Split metadata; `None` if the record is not split.
    pub split: Option<SplitInfo>,
    /// Domain fields.
    pub fields: Map<String, Value>,
    /// Warnings raised while normalizing this record.
    pub warnings: Vec<DataIntegrityWarning>,
}

impl PhysicalRecord {
    /// Converts a server record as-is.
    ///
    /// A record with a `split_group_id` but missing index or total keeps the
    /// group with zeroes in the missing positions, so group validation can flag it.
    #[must_use]
    pub fn from_server(record: ServerRecord, origin_sequence_index: Option<usize>) -> Self {
        let split = record.split_group_id.map(|group_id| SplitInfo {
            group_id,
            index: record.split_index.unwrap_or(0),
            total: record.total_splits.unwrap_or(0),
        });
        Self {
            id: record.id,
            origin_sequence_index,
            split,
            fields: record.fields,
            warnings: Vec::new(),
        }
    }

    /// Returns the split group identifier.
    #[must_use]
    pub fn split_group_id(&self) -> Option<&str> {
        self.split.as_ref().map(|s| s.group_id.as_str())
    }

    /// Returns the 1-based split index.
    #[must_use]
    pub fn split_index(&self) -> Option<u32> {
        self.split.as_ref().map(|s| s.index)
    }

    /// Returns the group size.
    #[must_use]
    pub fn total_splits(&self) -> Option<u32> {
        self.split.as_ref().map(|s| s.total)
    }

    /// Returns true if this record is one part of a split group.
    #[must_use]
    pub fn is_split(&self) -> bool {
        self.split.is_some()
    }

    /// Returns a domain field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Rebuilds the wire shape, including split fields.
    #[must_use]
    pub fn to_server_record(&self) -> ServerRecord {
        ServerRecord {
            id: self.id.clone(),
            split_group_id: self.split.as_ref().map(|s| s.group_id.clone()),
            split_index: self.split_index(),
            total_splits: self.total_splits(),
            fields: self.fields.clone(),
        }
    }

    /// Decodes the record into a typed model.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Decode`] if the fields do not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let decode_error = |e: serde_json::Error| ModelError::Decode {
            what: format!("record {}", self.id),
            message: e.to_string(),
        };
        let value = serde_json::to_value(self.to_server_record()).map_err(decode_error)?;
        serde_json::from_value(value).map_err(decode_error)
    }
}

/// Persisted schema metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    /// Record identifier.
    pub id: String,
    /// Owning project.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Schema body (for split parts, this part's slice of the body).
    pub schema_data: SchemaData,
    /// Included in every prompt.
    #[serde(default)]
    pub is_always_displayed: bool,
    /// Split group identifier.
    #[serde(default)]
    pub split_group_id: Option<String>,
    /// 1-based split index.
    #[serde(default)]
    pub split_index: Option<u32>,
    /// Group size.
    #[serde(default)]
    pub total_splits: Option<u32>,
    /// Retrieval collection the schema was indexed into.
    #[serde(default)]
    pub collection_id: Option<String>,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update time.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Persisted context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Record identifier.
    pub id: String,
    /// Owning project.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Display name.
    pub name: String,
    /// Context text.
    pub content: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Included in every prompt.
    #[serde(default)]
    pub is_always_displayed: bool,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update time.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Persisted golden example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldenExample {
    /// Record identifier.
    pub id: String,
    /// Owning project.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Natural-language question.
    pub user_query: String,
    /// Reference SQL.
    pub sql_query: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Included in every prompt.
    #[serde(default)]
    pub is_always_displayed: bool,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update time.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}
