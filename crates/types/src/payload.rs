//! Create payloads submitted by callers.
//!
//! Each resource kind has its own create payload. [`LogicalPayload`] is the
//! closed union of all of them, and [`LogicalInput`] pairs a payload with the
//! position it held in the caller's list.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{ModelError, Result},
    resource::ResourceKind,
    schema::SchemaData,
};

/// Payload for creating schema metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bon::Builder)]
#[builder(on(String, into))]
pub struct SchemaMetadataCreate {
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// The schema body.
    pub schema_data: SchemaData,
    /// Include this schema in every prompt.
    #[serde(default)]
    #[builder(default)]
    pub is_always_displayed: bool,
}

/// Payload for creating a context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[builder(on(String, into))]
pub struct ContextCreate {
    /// Display name.
    pub name: String,
    /// Business rules or domain knowledge text.
    pub content: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Include this context in every prompt.
    #[serde(default)]
    #[builder(default)]
    pub is_always_displayed: bool,
}

/// Payload for creating a golden example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[builder(on(String, into))]
pub struct GoldenExampleCreate {
    /// Natural-language question.
    pub user_query: String,
    /// Reference SQL answering the question.
    pub sql_query: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Include this example in every prompt.
    #[serde(default)]
    #[builder(default)]
    pub is_always_displayed: bool,
}

/// Closed union of create payloads, one variant per [`ResourceKind`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LogicalPayload {
    /// Schema metadata payload.
    SchemaMetadata(SchemaMetadataCreate),
    /// Context payload.
    Context(ContextCreate),
    /// Golden example payload.
    GoldenExample(GoldenExampleCreate),
}

impl LogicalPayload {
    /// Returns the resource kind this payload creates.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::SchemaMetadata(_) => ResourceKind::SchemaMetadata,
            Self::Context(_) => ResourceKind::Context,
            Self::GoldenExample(_) => ResourceKind::GoldenExample,
        }
    }

    /// Returns a short human-readable label for logs and error messages.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::SchemaMetadata(p) => &p.name,
            Self::Context(p) => &p.name,
            Self::GoldenExample(p) => &p.user_query,
        }
    }

    /// Checks the payload against the client-side rules for its kind.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidField`] for the first violated rule.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::SchemaMetadata(p) => {
                require_non_blank("name", &p.name)?;
                if let SchemaData::Table(table) = &p.schema_data
                    && let Some(position) = table.columns.iter().position(|c| c.name.trim().is_empty())
                {
                    return Err(ModelError::invalid_field(
                        format!("schema_data.table.columns[{position}].name"),
                        "must not be empty",
                    ));
                }
                Ok(())
            },
            Self::Context(p) => {
                require_non_blank("name", &p.name)?;
                require_non_blank("content", &p.content)
            },
            Self::GoldenExample(p) => {
                require_non_blank("user_query", &p.user_query)?;
                require_non_blank("sql_query", &p.sql_query)
            },
        }
    }

    /// Decodes a `kind` payload from a record's fields.
    ///
    /// Server-managed fields such as `id`, `created_at` and the split
    /// metadata are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Decode`] if a required field is missing or has
    /// the wrong type, or if `schema_data` is malformed.
    pub fn from_fields(kind: ResourceKind, fields: Value) -> Result<Self> {
        fn decode<T: serde::de::DeserializeOwned>(kind: ResourceKind, fields: Value) -> Result<T> {
            serde_json::from_value(fields).map_err(|e| ModelError::Decode {
                what: format!("{kind} payload"),
                message: e.to_string(),
            })
        }

        Ok(match kind {
            ResourceKind::SchemaMetadata => Self::SchemaMetadata(decode(kind, fields)?),
            ResourceKind::Context => Self::Context(decode(kind, fields)?),
            ResourceKind::GoldenExample => Self::GoldenExample(decode(kind, fields)?),
        })
    }

    /// Encodes the payload as the JSON request body.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Decode`] if serialization fails.
    pub fn to_body(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| ModelError::Decode {
            what: format!("{} payload", self.kind()),
            message: e.to_string(),
        })
    }
}

fn require_non_blank(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ModelError::invalid_field(field, "must not be empty"));
    }
    Ok(())
}

impl From<SchemaMetadataCreate> for LogicalPayload {
    fn from(payload: SchemaMetadataCreate) -> Self {
        Self::SchemaMetadata(payload)
    }
}

impl From<ContextCreate> for LogicalPayload {
    fn from(payload: ContextCreate) -> Self {
        Self::Context(payload)
    }
}

impl From<GoldenExampleCreate> for LogicalPayload {
    fn from(payload: GoldenExampleCreate) -> Self {
        Self::GoldenExample(payload)
    }
}

/// One caller-supplied record, tagged with its position in the caller's list.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalInput {
    /// 0-based position in the caller's input list.
    pub sequence_index: usize,
    /// The payload to create.
    pub payload: LogicalPayload,
}

impl LogicalInput {
    /// Tags each payload with its position.
    pub fn enumerate<I, P>(payloads: I) -> Vec<LogicalInput>
    where
        I: IntoIterator<Item = P>,
        P: Into<LogicalPayload>,
    {
        payloads
            .into_iter()
            .enumerate()
            .map(|(sequence_index, p)| LogicalInput { sequence_index, payload: p.into() })
            .collect()
    }

    /// Returns the resource kind of the payload.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.payload.kind()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::Column;

    fn users_table() -> SchemaMetadataCreate {
        SchemaMetadataCreate::builder()
            .name("users_table")
            .schema_data(SchemaData::table(
                "users",
                [Column::new("id", "integer"), Column::new("email", "string")],
            ))
            .build()
    }

    #[test]
    fn test_builder_defaults() {
        let payload = users_table();
        assert!(!payload.is_always_displayed);
        assert!(payload.description.is_none());
    }

    #[test]
    fn test_schema_metadata_body_shape() {
        let body = LogicalPayload::from(users_table()).to_body().unwrap();
        assert_eq!(
            body,
            json!({
                "name": "users_table",
                "description": null,
                "schema_data": {
                    "table": {
                        "name": "users",
                        "columns": [
                            {"name": "id", "type": "integer"},
                            {"name": "email", "type": "string"}
                        ]
                    }
                },
                "is_always_displayed": false
            })
        );
    }

    #[test]
    fn test_context_body_omits_missing_description() {
        let payload = ContextCreate::builder().name("Rules").content("status = 'active'").build();
        let body = LogicalPayload::from(payload).to_body().unwrap();
        assert!(body.get("description").is_none());
        assert_eq!(body["content"], "status = 'active'");
    }

    #[test]
    fn test_validate_rejects_blank_context_content() {
        let payload = ContextCreate::builder().name("Rules").content("   ").build();
        let err = LogicalPayload::from(payload).validate().unwrap_err();
        assert_eq!(err, ModelError::invalid_field("content", "must not be empty"));
    }

    #[test]
    fn test_validate_rejects_blank_column_name() {
        let mut payload = users_table();
        if let SchemaData::Table(table) = &mut payload.schema_data {
            table.columns.push(Column::new(" ", "string"));
        }
        let err = LogicalPayload::from(payload).validate().unwrap_err();
        assert_eq!(
            err,
            ModelError::invalid_field("schema_data.table.columns[2].name", "must not be empty")
        );
    }

    #[test]
    fn test_validate_golden_example() {
        let ok = GoldenExampleCreate::builder()
            .user_query("How many users?")
            .sql_query("SELECT COUNT(*) FROM users")
            .build();
        assert!(LogicalPayload::from(ok).validate().is_ok());

        let missing_sql =
            GoldenExampleCreate::builder().user_query("How many users?").sql_query("").build();
        assert!(LogicalPayload::from(missing_sql).validate().is_err());
    }

    #[test]
    fn test_from_fields_ignores_server_fields() {
        let fields = json!({
            "id": "ctx-1",
            "project_id": "p",
            "created_at": "2024-01-01T00:00:00Z",
            "name": "Rules",
            "content": "status = 'active'",
            "is_always_displayed": true
        });
        let payload = LogicalPayload::from_fields(ResourceKind::Context, fields).unwrap();
        assert_eq!(
            payload,
            LogicalPayload::Context(
                ContextCreate::builder()
                    .name("Rules")
                    .content("status = 'active'")
                    .is_always_displayed(true)
                    .build()
            )
        );

        let body = LogicalPayload::from(users_table()).to_body().unwrap();
        let schema = LogicalPayload::from_fields(ResourceKind::SchemaMetadata, body).unwrap();
        assert_eq!(schema, LogicalPayload::from(users_table()));
    }

    #[test]
    fn test_from_fields_requires_kind_fields() {
        let err = LogicalPayload::from_fields(ResourceKind::GoldenExample, json!({"name": "Rules"}))
            .unwrap_err();
        assert!(matches!(err, ModelError::Decode { ref what, .. } if what == "golden_example payload"));
    }

    #[test]
    fn test_enumerate_assigns_positions() {
        let inputs = LogicalInput::enumerate([
            ContextCreate::builder().name("a").content("x").build(),
            ContextCreate::builder().name("b").content("y").build(),
        ]);
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[1].sequence_index, 1);
        assert_eq!(inputs[1].payload.label(), "b");
        assert_eq!(inputs[0].kind(), ResourceKind::Context);
    }
}
