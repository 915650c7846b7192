//! Shared test utilities for the Text2Everything crates.
//!
//! This crate provides common test helpers to reduce boilerplate across test modules:
//!
//! - [`assert_eventually`] - Wait for state updated by spawned tasks
//! - [`fixtures`] - Canned payloads, server records and split groups
//! - [`strategies`] - Proptest generators for payloads and bulk response entries

#![deny(unsafe_code)]
// Test utilities are allowed to use unwrap for simplicity
#![cfg_attr(test, allow(clippy::disallowed_methods))]

mod assertions;
pub use assertions::assert_eventually;

pub mod fixtures;
pub use fixtures::{context, golden_example, split_group, split_part, wide_table};

pub mod strategies;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::{
        collections::HashSet,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use proptest::prelude::*;
    use text2everything_types::{LogicalPayload, OneOrMany, SchemaData};

    use super::*;

    // ============================================
    // assert_eventually tests
    // ============================================

    #[tokio::test]
    async fn test_assert_eventually_sees_spawned_update() {
        let done = Arc::new(AtomicUsize::new(0));
        let worker = Arc::clone(&done);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            worker.store(1, Ordering::SeqCst);
        });

        assert!(assert_eventually(Duration::from_millis(500), || done.load(Ordering::SeqCst) == 1).await);
    }

    #[tokio::test]
    async fn test_assert_eventually_checks_before_waiting() {
        let checks = AtomicUsize::new(0);
        let held = assert_eventually(Duration::ZERO, || checks.fetch_add(1, Ordering::SeqCst) == 0).await;
        assert!(held);
    }

    #[tokio::test]
    async fn test_assert_eventually_gives_up() {
        assert!(!assert_eventually(Duration::from_millis(40), || false).await);
    }

    // ============================================
    // Fixture tests
    // ============================================

    #[test]
    fn test_wide_table_has_requested_columns() {
        let table = wide_table("orders", 10);
        assert_eq!(table.name, "orders");
        let SchemaData::Table(schema) = &table.schema_data else {
            panic!("expected a table");
        };
        assert_eq!(schema.columns.len(), 10);
        assert_eq!(schema.columns[9].name, "c9");
    }

    #[test]
    fn test_payload_fixtures_validate() {
        LogicalPayload::from(context("fiscal")).validate().unwrap();
        LogicalPayload::from(golden_example("how many users")).validate().unwrap();
        LogicalPayload::from(wide_table("t", 1)).validate().unwrap();
    }

    #[test]
    fn test_split_group_is_consistent() {
        let parts = split_group("sm", "grp-1", 3);
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.split_group_id.as_deref() == Some("grp-1")));
        assert_eq!(parts.iter().filter_map(|p| p.split_index).collect::<Vec<_>>(), [1, 2, 3]);
        assert!(parts.iter().all(|p| p.total_splits == Some(3)));
    }

    #[test]
    fn test_split_part_can_omit_fields() {
        let part = split_part("x", None, Some(2), None);
        assert!(part.split_group_id.is_none());
        assert_eq!(part.split_index, Some(2));
        assert!(part.has_split_fields());
    }

    // ============================================
    // Strategy sanity checks
    // ============================================

    proptest! {
        #[test]
        fn prop_payload_batches_are_valid_and_uniform((kind, batch) in strategies::arb_payload_batch(6)) {
            prop_assert!(!batch.is_empty());
            for payload in &batch {
                prop_assert_eq!(payload.kind(), kind);
                prop_assert!(payload.validate().is_ok());
            }
        }

        #[test]
        fn prop_split_groups_are_permutations(parts in strategies::arb_split_group(0, 6)) {
            let total = parts.len() as u32;
            let indices: HashSet<u32> = parts.iter().filter_map(|p| p.split_index).collect();
            prop_assert_eq!(indices, (1..=total).collect::<HashSet<_>>());
        }

        #[test]
        fn prop_response_entry_ids_are_distinct(entries in strategies::arb_response_entries(6)) {
            let ids: Vec<String> = entries
                .into_iter()
                .flat_map(OneOrMany::into_vec)
                .map(|r| r.id)
                .collect();
            let unique: HashSet<&String> = ids.iter().collect();
            prop_assert_eq!(unique.len(), ids.len());
        }
    }
}
