//! Rust SDK for the Text2Everything service.
//!
//! This SDK creates, lists and deletes the knowledge records behind
//! Text2Everything's SQL generation: schema metadata, contexts and golden
//! examples. Its core is bulk submission that reconciles the server's
//! response with the caller's inputs, even when the server splits one input
//! into several physical records.
//!
//! # Features
//!
//! - **Bulk with fallback**: one bulk call first; if it fails, one call per
//!   input with bounded concurrency and per-input failure reporting
//! - **Split-aware results**: split parts are grouped, ordered and traced back
//!   to the input that produced them
//! - **Integrity warnings**: missing split metadata is synthesized
//!   deterministically and reported, never silently dropped
//! - **Cascading deletes**: deleting any part of a split record deletes the
//!   whole group
//! - **Resilient calls**: exponential backoff that honors `Retry-After`
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use text2everything_sdk::{ClientConfig, Text2EverythingClient};
//! use text2everything_types::ContextCreate;
//!
//! #[tokio::main]
//! async fn main() -> text2everything_sdk::Result<()> {
//!     let config = ClientConfig::builder()
//!         .with_base_url("https://text2everything.example.com")
//!         .with_access_token(std::env::var("T2E_TOKEN").unwrap_or_default())
//!         .with_workspace_name("workspaces/analytics")
//!         .build()?;
//!     let client = Text2EverythingClient::new(config)?;
//!
//!     let outcome = client
//!         .contexts("project-1")
//!         .bulk_create([ContextCreate::builder().name("fiscal year").content("Starts in April").build()])
//!         .await?;
//!     for failed in &outcome.failed_inputs {
//!         eprintln!("input {} failed: {}", failed.sequence_index, failed.error);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │            Text2EverythingClient / Resource (API)           │
//! │ .create() │ .bulk_create() │ .update() │ .list() │ .delete() │
//! ├─────────────────────────────────────────────────────────────┤
//! │  FallbackCoordinator        │  DeletionCascadeResolver      │
//! │  bulk → per-item fallback   │  split group → N deletes      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Response normalization     │  SplitGroupIndex              │
//! │  OneOrMany → PhysicalRecord │  group lookup & validation    │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   ItemSubmitter + Retry (backon)            │
//! ├─────────────────────────────────────────────────────────────┤
//! │          Transport: HttpTransport (reqwest) │ MockTransport │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cascade;
mod client;
mod config;
mod error;
mod fallback;
mod group_index;
pub mod mock;
mod normalize;
mod retry;
mod submitter;
mod transport;

// Public API exports
pub use cascade::{
    DeletionCascadeResolver, DeletionOutcome, DeletionResult, DeletionStatus, PartialCascadeFailure,
};
pub use client::{Resource, Text2EverythingClient};
pub use config::{
    BulkConfig, BulkStrategy, ClientConfig, ClientConfigBuilder, DEFAULT_BASE_URL,
    DEFAULT_MAX_CONCURRENT_REQUESTS, RetryPolicy, RetryPolicyBuilder,
};
pub use error::{Result, SdkError};
pub use fallback::{BulkMode, BulkOutcome, FailedInput, FallbackCoordinator};
pub use group_index::{GroupValidation, MAX_LISTED_MISSING, SplitGroup, SplitGroupIndex};
pub use normalize::{Normalized, normalize, normalize_entry, parse_bulk_response, parse_entry};
pub use retry::{with_retry, with_retry_cancellable};
pub use submitter::{DEFAULT_PAGE_SIZE, ItemSubmitter, check_inputs};
pub use transport::{ApiRequest, HttpTransport, Method, Transport, WORKSPACE_HEADER};

// Re-export commonly used types from text2everything-types
pub use text2everything_types::{
    ContextCreate, DataIntegrityWarning, GoldenExampleCreate, IntegrityIssue, LogicalInput,
    LogicalPayload, OneOrMany, PhysicalRecord, ResourceKind, SchemaMetadataCreate, ServerRecord,
    SplitInfo,
};
