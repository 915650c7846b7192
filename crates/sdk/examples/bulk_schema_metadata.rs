//! Bulk schema metadata example demonstrating split reconciliation.
//!
//! Run against a live service:
//! `cargo run --example bulk_schema_metadata -- --base-url https://... --project <id>`
//! with `T2E_ACCESS_TOKEN` and `T2E_WORKSPACE_NAME` set. Without `--base-url`
//! the example runs against the in-memory mock server.
//!
//! This example shows:
//! - Bulk creation of narrow and wide tables
//! - Tracing split parts back to the input that produced them
//! - Reporting per-input failures after a per-item fallback
//! - Deleting a split record with its siblings

// Examples are allowed to use expect/unwrap for brevity
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::disallowed_methods)]

use std::sync::Arc;

use text2everything_sdk::{ClientConfig, Result, Text2EverythingClient, mock::MockTransport};
use text2everything_types::{Column, SchemaData, SchemaMetadataCreate};

fn table(name: &str, columns: usize) -> SchemaMetadataCreate {
    SchemaMetadataCreate::builder()
        .name(name)
        .description(format!("{name} with {columns} columns"))
        .schema_data(SchemaData::table(name, (0..columns).map(|i| Column::new(format!("col_{i}"), "varchar"))))
        .build()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let arg = |flag: &str| args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1)).cloned();
    let project = arg("--project").unwrap_or_else(|| "demo-project".to_owned());

    // -------------------------------------------------------------------------
    // 1. Create the client
    // -------------------------------------------------------------------------
    let builder = ClientConfig::builder()
        .with_access_token(std::env::var("T2E_ACCESS_TOKEN").unwrap_or_else(|_| "demo-token".to_owned()))
        .with_workspace_name(
            std::env::var("T2E_WORKSPACE_NAME").unwrap_or_else(|_| "workspaces/demo".to_owned()),
        );

    let client = match arg("--base-url") {
        Some(base_url) => {
            println!("Connecting to Text2Everything at {base_url}");
            Text2EverythingClient::new(builder.with_base_url(base_url).build()?)?
        },
        None => {
            println!("No --base-url given; using the in-memory mock server");
            let mock = MockTransport::new();
            mock.fail_next_bulk(1);
            mock.reject_label("broken_table");
            Text2EverythingClient::with_transport(builder.build()?, Arc::new(mock))
        },
    };
    let schemas = client.schema_metadata(project);

    // -------------------------------------------------------------------------
    // 2. Bulk create: one narrow table, one wide table, one the server rejects
    // -------------------------------------------------------------------------
    println!("\n=== Bulk create ===");
    let outcome = schemas
        .bulk_create([table("customers", 4), table("events", 40), table("broken_table", 2)])
        .await?;

    println!("mode: {:?}", outcome.mode_used);
    for record in &outcome.results {
        match &record.split {
            Some(split) => println!(
                "  input {:?} -> {} (part {}/{} of {})",
                record.origin_sequence_index, record.id, split.index, split.total, split.group_id
            ),
            None => println!("  input {:?} -> {}", record.origin_sequence_index, record.id),
        }
    }
    for failed in &outcome.failed_inputs {
        println!("  input {} ({}) failed: {}", failed.sequence_index, failed.label, failed.error);
    }
    for warning in &outcome.warnings {
        println!("  warning: {}", warning.message);
    }

    // -------------------------------------------------------------------------
    // 3. Delete one part of the wide table; its siblings go with it
    // -------------------------------------------------------------------------
    println!("\n=== Cascade delete ===");
    let index = outcome.group_index();
    if let Some(part) = outcome.records_for(1).last() {
        let result = schemas.delete_with_index(&part.id, &index).await?;
        println!("deleted {:?} (group {:?})", result.deleted_ids(), result.split_group_id);
        if let Some(partial) = result.partial_failure() {
            println!("group {} left with {:?}", partial.group_id, partial.remaining);
        }
    }

    Ok(())
}
