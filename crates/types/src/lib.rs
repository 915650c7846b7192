//! Domain types for the Text2Everything SDK.
//!
//! This crate provides the models shared by the SDK and its test utilities:
//! - Resource kinds and their endpoint segments
//! - Create payloads for schema metadata, contexts and golden examples
//! - The closed [`SchemaData`] union (table, dimension, metric, relationship)
//! - Server records, split metadata and the [`OneOrMany`] response shape
//! - Error types using snafu

pub mod error;
pub mod payload;
pub mod record;
pub mod resource;
pub mod schema;

// Re-export commonly used types at crate root
pub use error::{ModelError, Result};
pub use payload::{
    ContextCreate, GoldenExampleCreate, LogicalInput, LogicalPayload, SchemaMetadataCreate,
};
pub use record::{
    Context, DataIntegrityWarning, GoldenExample, IntegrityIssue, OneOrMany, PhysicalRecord,
    SchemaMetadata, ServerRecord, SplitInfo,
};
pub use resource::ResourceKind;
pub use schema::{
    Column, SchemaData, SchemaType, SemanticDefinition, TableMember, TableSchema,
    detect_schema_type, validate_schema_value,
};
