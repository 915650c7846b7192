//! Canned payloads and server records.
//!
//! Centralizes the shapes tests build over and over, so a change to a
//! payload's required fields touches one place.

use serde_json::{Map, Value, json};
use text2everything_types::{
    Column, ContextCreate, GoldenExampleCreate, SchemaData, SchemaMetadataCreate, ServerRecord,
};

/// Schema metadata for a table with `columns` integer columns named `c0..`.
#[must_use]
pub fn wide_table(name: &str, columns: usize) -> SchemaMetadataCreate {
    SchemaMetadataCreate::builder()
        .name(name)
        .schema_data(SchemaData::table(name, (0..columns).map(|i| Column::new(format!("c{i}"), "int"))))
        .build()
}

/// A context named `name` with fixed content.
#[must_use]
pub fn context(name: &str) -> ContextCreate {
    ContextCreate::builder().name(name).content(format!("business rule for {name}")).build()
}

/// A golden example for `user_query`.
#[must_use]
pub fn golden_example(user_query: &str) -> GoldenExampleCreate {
    GoldenExampleCreate::builder().user_query(user_query).sql_query("SELECT 1").build()
}

/// An unsplit server record carrying a `name` field.
#[must_use]
pub fn record(id: &str) -> ServerRecord {
    let mut fields = Map::new();
    fields.insert("name".to_owned(), json!(id));
    ServerRecord { id: id.to_owned(), split_group_id: None, split_index: None, total_splits: None, fields }
}

/// One part of a split group.
///
/// Pass `None` to leave a split field out, as a misbehaving server would.
#[must_use]
pub fn split_part(id: &str, group_id: Option<&str>, index: Option<u32>, total: Option<u32>) -> ServerRecord {
    ServerRecord {
        split_group_id: group_id.map(str::to_owned),
        split_index: index,
        total_splits: total,
        ..record(id)
    }
}

/// A complete split group `{prefix}-1..=total`, listed in split order.
#[must_use]
pub fn split_group(prefix: &str, group_id: &str, total: u32) -> Vec<ServerRecord> {
    (1..=total)
        .map(|i| split_part(&format!("{prefix}-{i}"), Some(group_id), Some(i), Some(total)))
        .collect()
}

/// Serializes records as a JSON array, as the server would return them.
#[must_use]
pub fn as_json(records: &[ServerRecord]) -> Value {
    Value::Array(
        records
            .iter()
            .map(|r| serde_json::to_value(r).unwrap_or(Value::Null))
            .collect(),
    )
}
