//! Proptest strategies for Text2Everything domain types.
//!
//! Reusable generators for property-based testing across crates. Strategies
//! produce well-formed payloads and response entries while exploring edge
//! cases through random variation: split groups arrive shuffled, and may
//! lose their split metadata.
//!
//! # Usage
//!
//! ```no_run
//! use text2everything_test_utils::strategies;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn my_property(entries in strategies::arb_response_entries(8)) {
//!         // test invariant with randomly generated bulk response entries
//!     }
//! }
//! ```

use proptest::prelude::*;
use text2everything_types::{
    Column, ContextCreate, GoldenExampleCreate, LogicalPayload, OneOrMany, ResourceKind,
    SchemaData, SchemaMetadataCreate, ServerRecord,
};

use crate::fixtures::{record, split_part};

/// Generates a label of 1-16 characters matching `[a-z][a-z0-9_]{0,15}`.
pub fn arb_label() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}"
}

/// Generates a column with a name and one of a few SQL types.
pub fn arb_column() -> impl Strategy<Value = Column> {
    (arb_label(), prop::sample::select(vec!["int", "bigint", "varchar", "date", "decimal"]))
        .prop_map(|(name, data_type)| Column::new(name, data_type))
}

/// Generates table schema metadata with 1 to `max_columns` columns.
pub fn arb_table(max_columns: usize) -> impl Strategy<Value = SchemaMetadataCreate> {
    (arb_label(), prop::collection::vec(arb_column(), 1..=max_columns.max(1)), any::<bool>())
        .prop_map(|(name, columns, pinned)| {
            SchemaMetadataCreate::builder()
                .schema_data(SchemaData::table(name.clone(), columns))
                .name(name)
                .is_always_displayed(pinned)
                .build()
        })
}

/// Generates a context with non-blank content.
pub fn arb_context() -> impl Strategy<Value = ContextCreate> {
    (arb_label(), "[A-Za-z][A-Za-z0-9 ]{0,63}")
        .prop_map(|(name, content)| ContextCreate::builder().name(name).content(content).build())
}

/// Generates a golden example.
pub fn arb_golden_example() -> impl Strategy<Value = GoldenExampleCreate> {
    (arb_label(), arb_label()).prop_map(|(query, table)| {
        GoldenExampleCreate::builder()
            .user_query(format!("how many {query}"))
            .sql_query(format!("SELECT COUNT(*) FROM {table}"))
            .build()
    })
}

/// Generates a payload of `kind`; schema metadata gets up to 24 columns.
pub fn arb_payload(kind: ResourceKind) -> BoxedStrategy<LogicalPayload> {
    match kind {
        ResourceKind::SchemaMetadata => arb_table(24).prop_map(LogicalPayload::from).boxed(),
        ResourceKind::Context => arb_context().prop_map(LogicalPayload::from).boxed(),
        ResourceKind::GoldenExample => arb_golden_example().prop_map(LogicalPayload::from).boxed(),
    }
}

/// Generates 1 to `max_len` payloads of one randomly chosen kind.
pub fn arb_payload_batch(max_len: usize) -> impl Strategy<Value = (ResourceKind, Vec<LogicalPayload>)> {
    prop::sample::select(ResourceKind::ALL.to_vec()).prop_flat_map(move |kind| {
        (Just(kind), prop::collection::vec(arb_payload(kind), 1..=max_len.max(1)))
    })
}

/// Generates the parts of one well-formed split group of 2 to `max_parts`
/// records, in shuffled order.
///
/// Part ids are `{tag}-{i}` and the group id is `grp-{tag}`.
pub fn arb_split_group(tag: usize, max_parts: u32) -> impl Strategy<Value = Vec<ServerRecord>> {
    (2..=max_parts.max(2))
        .prop_flat_map(|total| Just((1..=total).collect::<Vec<u32>>()).prop_shuffle())
        .prop_map(move |order| {
            let total = order.len() as u32;
            let group_id = format!("grp-{tag}");
            order
                .into_iter()
                .map(|i| split_part(&format!("{tag}-{i}"), Some(&group_id), Some(i), Some(total)))
                .collect()
        })
}

/// Generates one bulk response entry: a lone record or a shuffled split group.
pub fn arb_response_entry(tag: usize) -> impl Strategy<Value = OneOrMany<ServerRecord>> {
    prop_oneof![
        Just(OneOrMany::One(record(&format!("{tag}-solo")))),
        arb_split_group(tag, 5).prop_map(OneOrMany::Many),
    ]
}

/// Generates 1 to `max_entries` response entries with distinct ids.
pub fn arb_response_entries(max_entries: usize) -> impl Strategy<Value = Vec<OneOrMany<ServerRecord>>> {
    (1..=max_entries.max(1)).prop_flat_map(|n| (0..n).map(arb_response_entry).collect::<Vec<_>>())
}

/// Removes split metadata from parts of a group the way a misbehaving server
/// might: each flag drops that field from every part.
pub fn strip_split_fields(parts: &mut [ServerRecord], drop_group_id: bool, drop_positions: bool) {
    for part in parts {
        if drop_group_id {
            part.split_group_id = None;
        }
        if drop_positions {
            part.split_index = None;
            part.total_splits = None;
        }
    }
}
