//! Schema metadata payloads.
//!
//! Schema metadata comes in four shapes, all carried in a `schema_data` object:
//!
//! | Type           | Wire shape                                              |
//! |----------------|---------------------------------------------------------|
//! | `table`        | `{"table": {"name": .., "columns": [..]}}`              |
//! | `dimension`    | `{"table": {"dimension": {"content": {..}}}}`           |
//! | `metric`       | `{"table": {"metric": {"content": {..}}}}`              |
//! | `relationship` | `{"relationship": {..}}`                                |
//!
//! [`SchemaData`] closes these shapes into one enum so callers and validators
//! can match exhaustively. Structural validation of untyped JSON goes through
//! [`validate_schema_value`], which reports every problem rather than the first.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
use serde_json::{Map, Value};
use snafu::ensure;

use crate::error::{InvalidSchemaSnafu, ModelError, Result};

/// Discriminant of a [`SchemaData`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    /// Physical table with columns.
    Table,
    /// Categorical dimension defined on a table.
    Dimension,
    /// Aggregate metric defined on a table.
    Metric,
    /// Join relationship between tables.
    Relationship,
}

impl SchemaType {
    /// Returns the lowercase wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Dimension => "dimension",
            Self::Metric => "metric",
            Self::Relationship => "relationship",
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A table column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Declared column type (e.g. `integer`, `string`).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    /// Any further column attributes (description, nullability, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Column {
    /// Creates a column with a name and declared type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self { name: name.into(), data_type: Some(data_type.into()), extra: Map::new() }
    }
}

/// Table schema body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Physical table name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Table columns, in declaration order.
    pub columns: Vec<Column>,
    /// Any further table attributes.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Dimension or metric definition body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticDefinition {
    /// Definition name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Definition content (values, formula, aggregation, ...).
    pub content: Map<String, Value>,
    /// Any further attributes.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A dimension or metric together with the attributes of the table it lives on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableMember {
    /// The dimension or metric definition.
    pub definition: SemanticDefinition,
    /// Sibling keys of the enclosing `table` object (e.g. the table name).
    pub table: Map<String, Value>,
}

/// Closed union over the supported schema metadata shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaData {
    /// `{"table": {..., "columns": [...]}}`
    Table(TableSchema),
    /// `{"table": {"dimension": {...}}}`
    Dimension(TableMember),
    /// `{"table": {"metric": {...}}}`
    Metric(TableMember),
    /// `{"relationship": {...}}`
    Relationship(Map<String, Value>),
}

impl SchemaData {
    /// Builds a table schema from a name and columns.
    pub fn table(name: impl Into<String>, columns: impl IntoIterator<Item = Column>) -> Self {
        Self::Table(TableSchema {
            name: Some(name.into()),
            columns: columns.into_iter().collect(),
            extra: Map::new(),
        })
    }

    /// Returns the discriminant.
    #[must_use]
    pub fn schema_type(&self) -> SchemaType {
        match self {
            Self::Table(_) => SchemaType::Table,
            Self::Dimension(_) => SchemaType::Dimension,
            Self::Metric(_) => SchemaType::Metric,
            Self::Relationship(_) => SchemaType::Relationship,
        }
    }

    /// Returns the number of columns for table schemas, zero otherwise.
    #[must_use]
    pub fn column_count(&self) -> usize {
        match self {
            Self::Table(table) => table.columns.len(),
            _ => 0,
        }
    }

    /// Decodes untyped `schema_data`, validating its structure first.
    ///
    /// When `expected` is `None` the type is detected from the structure.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidSchema`] listing every structural problem,
    /// or [`ModelError::Decode`] if a nested body has the wrong field types.
    pub fn from_value(value: Value, expected: Option<SchemaType>) -> Result<Self> {
        let problems = validate_schema_value(&value, expected);
        ensure!(problems.is_empty(), InvalidSchemaSnafu { problems });

        let schema_type = expected.or_else(|| detect_schema_type(&value)).ok_or_else(|| {
            ModelError::InvalidSchema {
                problems: vec!["Unable to determine schema type from schema_data structure".into()],
            }
        })?;

        let Value::Object(mut root) = value else {
            return InvalidSchemaSnafu { problems: vec!["Field schema_data must be an object".to_owned()] }
                .fail();
        };

        match schema_type {
            SchemaType::Table => {
                let table = root.remove("table").unwrap_or(Value::Null);
                Ok(Self::Table(decode(table, "schema_data.table")?))
            },
            SchemaType::Dimension | SchemaType::Metric => {
                let key = schema_type.as_str();
                let Some(Value::Object(mut table)) = root.remove("table") else {
                    return InvalidSchemaSnafu {
                        problems: vec!["Field schema_data.table must be an object".to_owned()],
                    }
                    .fail();
                };
                let body = table.remove(key).unwrap_or(Value::Null);
                let definition = decode(body, &format!("schema_data.table.{key}"))?;
                let member = TableMember { definition, table };
                Ok(if schema_type == SchemaType::Dimension {
                    Self::Dimension(member)
                } else {
                    Self::Metric(member)
                })
            },
            SchemaType::Relationship => match root.remove("relationship") {
                Some(Value::Object(map)) => Ok(Self::Relationship(map)),
                _ => InvalidSchemaSnafu {
                    problems: vec!["Field schema_data.relationship must be an object".to_owned()],
                }
                .fail(),
            },
        }
    }

    fn wire(&self) -> SchemaWire<'_> {
        match self {
            Self::Table(table) => SchemaWire::Table { table },
            Self::Dimension(member) => SchemaWire::Member {
                table: MemberWire {
                    dimension: Some(&member.definition),
                    metric: None,
                    rest: &member.table,
                },
            },
            Self::Metric(member) => SchemaWire::Member {
                table: MemberWire {
                    dimension: None,
                    metric: Some(&member.definition),
                    rest: &member.table,
                },
            },
            Self::Relationship(relationship) => SchemaWire::Relationship { relationship },
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum SchemaWire<'a> {
    Table { table: &'a TableSchema },
    Member { table: MemberWire<'a> },
    Relationship { relationship: &'a Map<String, Value> },
}

#[derive(Serialize)]
struct MemberWire<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    dimension: Option<&'a SemanticDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metric: Option<&'a SemanticDefinition>,
    #[serde(flatten)]
    rest: &'a Map<String, Value>,
}

impl Serialize for SchemaData {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.wire().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SchemaData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        SchemaData::from_value(value, None).map_err(D::Error::custom)
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| ModelError::Decode { what: what.to_owned(), message: e.to_string() })
}

/// Detects the schema type of untyped `schema_data`.
///
/// Dimension wins over metric, which wins over a plain table; a value with
/// neither `table` nor `relationship` has no type.
#[must_use]
pub fn detect_schema_type(schema_data: &Value) -> Option<SchemaType> {
    if let Some(table) = schema_data.get("table") {
        let table = table.as_object()?;
        if table.contains_key("dimension") {
            Some(SchemaType::Dimension)
        } else if table.contains_key("metric") {
            Some(SchemaType::Metric)
        } else if table.contains_key("columns") {
            Some(SchemaType::Table)
        } else {
            None
        }
    } else if schema_data.get("relationship").is_some() {
        Some(SchemaType::Relationship)
    } else {
        None
    }
}

/// Validates untyped `schema_data` against the rules for its type.
///
/// Returns every problem found; an empty vector means the value is valid.
#[must_use]
pub fn validate_schema_value(schema_data: &Value, expected: Option<SchemaType>) -> Vec<String> {
    if !schema_data.is_object() {
        return vec!["Field schema_data must be an object".to_owned()];
    }

    let Some(schema_type) = expected.or_else(|| detect_schema_type(schema_data)) else {
        return vec!["Unable to determine schema type from schema_data structure".to_owned()];
    };

    match schema_type {
        SchemaType::Table => validate_table(schema_data),
        SchemaType::Dimension | SchemaType::Metric => {
            validate_member(schema_data, schema_type.as_str())
        },
        SchemaType::Relationship => match schema_data.get("relationship") {
            None => vec!["Missing required field: schema_data.relationship".to_owned()],
            Some(v) if !v.is_object() => {
                vec!["Field schema_data.relationship must be an object".to_owned()]
            },
            Some(_) => Vec::new(),
        },
    }
}

fn table_object(schema_data: &Value) -> std::result::Result<&Map<String, Value>, String> {
    match schema_data.get("table") {
        None => Err("Missing required field: schema_data.table".to_owned()),
        Some(Value::Object(table)) => Ok(table),
        Some(_) => Err("Field schema_data.table must be an object".to_owned()),
    }
}

fn validate_table(schema_data: &Value) -> Vec<String> {
    let table = match table_object(schema_data) {
        Ok(table) => table,
        Err(problem) => return vec![problem],
    };
    match table.get("columns") {
        None => vec!["Missing required field: schema_data.table.columns".to_owned()],
        Some(Value::Array(_)) => Vec::new(),
        Some(_) => vec!["Field schema_data.table.columns must be an array".to_owned()],
    }
}

fn validate_member(schema_data: &Value, key: &str) -> Vec<String> {
    let table = match table_object(schema_data) {
        Ok(table) => table,
        Err(problem) => return vec![problem],
    };
    let member = match table.get(key) {
        None => return vec![format!("Missing required field: schema_data.table.{key}")],
        Some(Value::Object(member)) => member,
        Some(_) => return vec![format!("Field schema_data.table.{key} must be an object")],
    };
    match member.get("content") {
        None => vec![format!("Missing required field: schema_data.table.{key}.content")],
        Some(Value::Object(_)) => Vec::new(),
        Some(_) => vec![format!("Field schema_data.table.{key}.content must be an object")],
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_detect_schema_types() {
        assert_eq!(
            detect_schema_type(&json!({"table": {"columns": []}})),
            Some(SchemaType::Table)
        );
        assert_eq!(
            detect_schema_type(&json!({"table": {"dimension": {"content": {}}}})),
            Some(SchemaType::Dimension)
        );
        assert_eq!(
            detect_schema_type(&json!({"table": {"metric": {"content": {}}}})),
            Some(SchemaType::Metric)
        );
        assert_eq!(
            detect_schema_type(&json!({"relationship": {"from": "a"}})),
            Some(SchemaType::Relationship)
        );
        assert_eq!(detect_schema_type(&json!({"view": {}})), None);
        assert_eq!(detect_schema_type(&json!({"table": []})), None);
    }

    #[test]
    fn test_dimension_takes_precedence_over_columns() {
        let value = json!({"table": {"columns": [], "dimension": {"content": {}}}});
        assert_eq!(detect_schema_type(&value), Some(SchemaType::Dimension));
    }

    #[test]
    fn test_validate_reports_missing_columns_for_expected_table() {
        let problems = validate_schema_value(&json!({"table": {"name": "users"}}), Some(SchemaType::Table));
        assert_eq!(problems, vec!["Missing required field: schema_data.table.columns"]);
    }

    #[test]
    fn test_validate_metric_content_must_be_object() {
        let problems =
            validate_schema_value(&json!({"table": {"metric": {"content": "sum"}}}), None);
        assert_eq!(problems, vec!["Field schema_data.table.metric.content must be an object"]);
    }

    #[test]
    fn test_validate_non_object() {
        assert_eq!(
            validate_schema_value(&json!([1, 2]), None),
            vec!["Field schema_data must be an object"]
        );
    }

    #[test]
    fn test_validate_unknown_shape() {
        assert_eq!(
            validate_schema_value(&json!({"view": {}}), None),
            vec!["Unable to determine schema type from schema_data structure"]
        );
    }

    #[test]
    fn test_from_value_table() {
        let data = SchemaData::from_value(
            json!({"table": {"name": "users", "columns": [{"name": "id", "type": "integer"}]}}),
            None,
        )
        .unwrap();

        let SchemaData::Table(table) = &data else { panic!("expected table") };
        assert_eq!(table.name.as_deref(), Some("users"));
        assert_eq!(table.columns[0], Column::new("id", "integer"));
        assert_eq!(data.column_count(), 1);
    }

    #[test]
    fn test_from_value_rejects_invalid_with_all_problems() {
        let err = SchemaData::from_value(json!({"table": {}}), Some(SchemaType::Metric)).unwrap_err();
        assert_eq!(
            err,
            ModelError::InvalidSchema {
                problems: vec!["Missing required field: schema_data.table.metric".into()]
            }
        );
    }

    #[test]
    fn test_dimension_serializes_back_to_nested_shape() {
        let value = json!({
            "table": {
                "name": "orders",
                "dimension": {"name": "status", "content": {"values": ["open", "closed"]}}
            }
        });
        let data: SchemaData = serde_json::from_value(value.clone()).unwrap();

        assert_eq!(data.schema_type(), SchemaType::Dimension);
        let SchemaData::Dimension(member) = &data else { panic!("expected dimension") };
        assert_eq!(member.table.get("name"), Some(&json!("orders")));
        assert_eq!(serde_json::to_value(&data).unwrap(), value);
    }

    #[test]
    fn test_deserialize_invalid_schema_fails() {
        let result: std::result::Result<SchemaData, _> =
            serde_json::from_value(json!({"relationship": "a->b"}));
        assert!(result.is_err());
    }
}
