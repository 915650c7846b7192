//! Main `Text2EverythingClient` implementation.
//!
//! The client owns the transport, the validated configuration and the
//! shutdown token. Per-project, per-kind work goes through a [`Resource`]
//! handle, which wires the submitter, the fallback coordinator and the
//! deletion resolver together.

use std::sync::Arc;

use serde_json::{Map, Value};
use text2everything_types::{
    LogicalInput, LogicalPayload, OneOrMany, PhysicalRecord, ResourceKind, SchemaType,
    detect_schema_type,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    cascade::{DeletionCascadeResolver, DeletionResult},
    config::{BulkConfig, ClientConfig},
    error::{Result, SdkError},
    fallback::{BulkOutcome, FallbackCoordinator},
    group_index::SplitGroupIndex,
    normalize::normalize_entry,
    submitter::{DEFAULT_PAGE_SIZE, ItemSubmitter},
    transport::{HttpTransport, Transport},
};

/// Client for the Text2Everything API.
///
/// Cheap to clone; clones share the transport and the shutdown token.
///
/// # Example
///
/// ```no_run
/// use text2everything_sdk::{ClientConfig, Text2EverythingClient};
/// use text2everything_types::{Column, SchemaData, SchemaMetadataCreate};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ClientConfig::builder()
///     .with_base_url("https://text2everything.example.com")
///     .with_access_token("token")
///     .with_workspace_name("workspaces/analytics")
///     .build()?;
/// let client = Text2EverythingClient::new(config)?;
///
/// let table = SchemaMetadataCreate::builder()
///     .name("orders")
///     .schema_data(SchemaData::table("orders", [Column::new("id", "bigint")]))
///     .build();
/// let outcome = client.schema_metadata("project-1").bulk_create([table]).await?;
/// println!("created {} records", outcome.results.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Text2EverythingClient {
    transport: Arc<dyn Transport>,
    config: Arc<ClientConfig>,
    /// Cancellation token for coordinated shutdown.
    shutdown: CancellationToken,
}

impl Text2EverythingClient {
    /// Creates a client that talks HTTP to the configured base URL.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Config`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Creates a client over a caller-supplied transport.
    #[must_use]
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self { transport, config: Arc::new(config), shutdown: CancellationToken::new() }
    }

    /// Returns the client's configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the shutdown token.
    ///
    /// Child tokens can be passed to
    /// [`Resource::bulk_create_with_cancellation`] to cancel a single call.
    #[inline]
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Shuts the client down.
    ///
    /// Pending reads and deletes return [`SdkError::Cancelled`], per-item
    /// fallback stops dispatching, and new calls fail immediately.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        debug!("client shutdown initiated");
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Schema metadata of `project_id`.
    #[must_use]
    pub fn schema_metadata(&self, project_id: impl Into<String>) -> Resource {
        self.resource(project_id, ResourceKind::SchemaMetadata)
    }

    /// Contexts of `project_id`.
    #[must_use]
    pub fn contexts(&self, project_id: impl Into<String>) -> Resource {
        self.resource(project_id, ResourceKind::Context)
    }

    /// Golden examples of `project_id`.
    #[must_use]
    pub fn golden_examples(&self, project_id: impl Into<String>) -> Resource {
        self.resource(project_id, ResourceKind::GoldenExample)
    }

    /// Records of `kind` in `project_id`.
    #[must_use]
    pub fn resource(&self, project_id: impl Into<String>, kind: ResourceKind) -> Resource {
        let submitter = ItemSubmitter::new(
            Arc::clone(&self.transport),
            project_id,
            self.config.retry_policy().clone(),
            self.shutdown.clone(),
        );
        Resource { kind, submitter, bulk: self.config.bulk().clone(), shutdown: self.shutdown.clone() }
    }
}

/// Handle on one resource kind within one project.
#[derive(Debug, Clone)]
pub struct Resource {
    kind: ResourceKind,
    submitter: ItemSubmitter,
    bulk: BulkConfig,
    shutdown: CancellationToken,
}

impl Resource {
    /// Returns the resource kind this handle operates on.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Returns the project this handle operates on.
    #[must_use]
    pub fn project_id(&self) -> &str {
        self.submitter.project_id()
    }

    /// Overrides the client's bulk settings for calls made through this handle.
    #[must_use]
    pub fn with_bulk_config(mut self, bulk: BulkConfig) -> Self {
        self.bulk = bulk;
        self
    }

    /// Creates one record.
    ///
    /// Returns every physical record the server stored for it: one, or
    /// several parts if it was split.
    ///
    /// # Errors
    ///
    /// - [`SdkError::ResourceKindMismatch`] for a payload of another kind.
    /// - [`SdkError::Model`] if local validation is enabled and rejects it.
    /// - The call's error after retries.
    pub async fn create(&self, payload: impl Into<LogicalPayload>) -> Result<Vec<PhysicalRecord>> {
        let input = LogicalInput { sequence_index: 0, payload: payload.into() };
        if self.bulk.validate {
            input.payload.validate()?;
        }
        let entry = self.submitter.submit_single(&input, self.kind).await?;
        Ok(normalize_entry(entry, input.sequence_index)?.records)
    }

    /// Creates many records, falling back to one call per record if the bulk
    /// endpoint fails.
    ///
    /// # Errors
    ///
    /// See [`FallbackCoordinator::execute`].
    pub async fn bulk_create<I, P>(&self, payloads: I) -> Result<BulkOutcome>
    where
        I: IntoIterator<Item = P>,
        P: Into<LogicalPayload>,
    {
        self.bulk_create_with_cancellation(payloads, &self.shutdown).await
    }

    /// Like [`bulk_create`](Self::bulk_create), but per-item fallback stops
    /// dispatching once `cancel` fires.
    ///
    /// # Errors
    ///
    /// See [`FallbackCoordinator::execute`].
    pub async fn bulk_create_with_cancellation<I, P>(
        &self,
        payloads: I,
        cancel: &CancellationToken,
    ) -> Result<BulkOutcome>
    where
        I: IntoIterator<Item = P>,
        P: Into<LogicalPayload>,
    {
        let inputs = LogicalInput::enumerate(payloads);
        FallbackCoordinator::new(self.submitter.clone(), self.bulk.clone())
            .execute_with_cancellation(&inputs, self.kind, cancel)
            .await
    }

    /// Fetches one physical record.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::NotFound`] for an unknown id.
    pub async fn get(&self, record_id: &str) -> Result<PhysicalRecord> {
        let record = self.submitter.get(self.kind, record_id).await?;
        Ok(PhysicalRecord::from_server(record, None))
    }

    /// Applies `changes` on top of a record's stored fields and replaces it.
    ///
    /// Updating one part of a split record changes that part only. The
    /// returned records keep their split metadata as the server sent it.
    ///
    /// # Errors
    ///
    /// - [`SdkError::NotFound`] for an unknown id.
    /// - [`SdkError::Model`] if the merged fields do not form a valid payload;
    ///   no update is sent in that case.
    /// - The update call's error.
    pub async fn update(&self, record_id: &str, changes: Map<String, Value>) -> Result<Vec<PhysicalRecord>> {
        let mut fields = self.get(record_id).await?.fields;
        fields.extend(changes);

        let payload = LogicalPayload::from_fields(self.kind, Value::Object(fields))?;
        let input = LogicalInput { sequence_index: 0, payload };
        if self.bulk.validate {
            input.payload.validate()?;
        }

        match self.submitter.update(self.kind, record_id, &input).await? {
            OneOrMany::One(record) => Ok(vec![PhysicalRecord::from_server(record, None)]),
            OneOrMany::Many(records) if records.len() == 1 => {
                Ok(records.into_iter().map(|r| PhysicalRecord::from_server(r, None)).collect())
            },
            entry => Ok(normalize_entry(entry, input.sequence_index)?.records),
        }
    }

    /// Lists every physical record, following pagination.
    ///
    /// # Errors
    ///
    /// Returns the first failing page's error.
    pub async fn list(&self) -> Result<Vec<PhysicalRecord>> {
        let records = self.submitter.list(self.kind, DEFAULT_PAGE_SIZE).await?;
        Ok(records.into_iter().map(|r| PhysicalRecord::from_server(r, None)).collect())
    }

    /// Lists schema metadata whose `schema_data` is of `schema_type`.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::UnsupportedOperation`] on a handle for another
    /// kind, or the listing error.
    pub async fn list_by_type(&self, schema_type: SchemaType) -> Result<Vec<PhysicalRecord>> {
        if self.kind != ResourceKind::SchemaMetadata {
            return Err(SdkError::UnsupportedOperation { operation: "list_by_type", kind: self.kind });
        }
        let mut records = self.list().await?;
        records.retain(|r| {
            r.field("schema_data").and_then(detect_schema_type) == Some(schema_type)
        });
        Ok(records)
    }

    /// Finds the first record whose `name` equals `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::UnsupportedOperation`] for golden examples, which
    /// have no name, or the listing error.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<PhysicalRecord>> {
        if self.kind == ResourceKind::GoldenExample {
            return Err(SdkError::UnsupportedOperation { operation: "get_by_name", kind: self.kind });
        }
        let records = self.list().await?;
        Ok(records.into_iter().find(|r| r.field("name").and_then(Value::as_str) == Some(name)))
    }

    /// Lists golden examples whose question contains `term`, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::UnsupportedOperation`] on a handle for another
    /// kind, or the listing error.
    pub async fn search_by_query(&self, term: &str) -> Result<Vec<PhysicalRecord>> {
        if self.kind != ResourceKind::GoldenExample {
            return Err(SdkError::UnsupportedOperation { operation: "search_by_query", kind: self.kind });
        }
        let term = term.to_lowercase();
        let mut records = self.list().await?;
        records.retain(|r| {
            r.field("user_query")
                .and_then(Value::as_str)
                .is_some_and(|query| query.to_lowercase().contains(&term))
        });
        Ok(records)
    }

    /// Lists the records flagged `is_always_displayed`.
    ///
    /// # Errors
    ///
    /// Returns the listing error.
    pub async fn list_always_displayed(&self) -> Result<Vec<PhysicalRecord>> {
        let mut records = self.list().await?;
        records.retain(|r| {
            r.field("is_always_displayed").and_then(Value::as_bool).unwrap_or(false)
        });
        Ok(records)
    }

    /// Deletes a record and, if it was split, every sibling part.
    ///
    /// The group is resolved from a fresh listing.
    ///
    /// # Errors
    ///
    /// Returns the listing error; no delete is issued in that case.
    pub async fn delete(&self, record_id: &str) -> Result<DeletionResult> {
        self.resolver().delete(record_id, None).await
    }

    /// Like [`delete`](Self::delete), but resolves the group from `index`
    /// when it holds the record's complete group.
    ///
    /// # Errors
    ///
    /// See [`delete`](Self::delete).
    pub async fn delete_with_index(
        &self,
        record_id: &str,
        index: &SplitGroupIndex<'_>,
    ) -> Result<DeletionResult> {
        self.resolver().delete(record_id, Some(index)).await
    }

    fn resolver(&self) -> DeletionCascadeResolver {
        DeletionCascadeResolver::new(self.submitter.clone(), self.kind)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::disallowed_methods)]
mod tests {
    use serde_json::json;
    use text2everything_types::{
        Column, ContextCreate, GoldenExampleCreate, SchemaData, SchemaMetadataCreate,
    };

    use super::*;
    use crate::{config::RetryPolicy, mock::MockTransport};

    fn client(mock: &MockTransport) -> Text2EverythingClient {
        let config = ClientConfig::builder()
            .with_access_token("test-token")
            .with_workspace_name("workspaces/test")
            .with_retry_policy(RetryPolicy::no_retry())
            .build()
            .expect("valid config");
        Text2EverythingClient::with_transport(config, Arc::new(mock.clone()))
    }

    fn wide_table(name: &str, columns: usize) -> SchemaMetadataCreate {
        SchemaMetadataCreate::builder()
            .name(name)
            .schema_data(SchemaData::table(
                name,
                (0..columns).map(|i| Column::new(format!("c{i}"), "int")),
            ))
            .build()
    }

    #[test]
    fn test_resource_handles_carry_kind_and_project() {
        let mock = MockTransport::new();
        let client = client(&mock);
        assert_eq!(client.schema_metadata("p").kind(), ResourceKind::SchemaMetadata);
        assert_eq!(client.contexts("p").kind(), ResourceKind::Context);
        assert_eq!(client.golden_examples("p").project_id(), "p");
    }

    #[tokio::test]
    async fn test_create_returns_all_parts() {
        let mock = MockTransport::new();
        let records = client(&mock).schema_metadata("p").create(wide_table("wide", 10)).await.unwrap();

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.origin_sequence_index == Some(0)));
        assert_eq!(records[0].split_index(), Some(1));
        assert_eq!(records[0].split_group_id(), records[1].split_group_id());
    }

    #[tokio::test]
    async fn test_create_validates_locally() {
        let mock = MockTransport::new();
        let err = client(&mock)
            .contexts("p")
            .create(ContextCreate::builder().name("n").content("  ").build())
            .await
            .unwrap_err();

        assert!(matches!(err, SdkError::Model { .. }));
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_create_rejects_wrong_kind() {
        let mock = MockTransport::new();
        let err = client(&mock)
            .contexts("p")
            .create(wide_table("t", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::ResourceKindMismatch { .. }));
    }

    #[tokio::test]
    async fn test_get_and_list() {
        let mock = MockTransport::new();
        let contexts = client(&mock).contexts("p");
        let created = contexts.create(ContextCreate::builder().name("a").content("b").build()).await.unwrap();

        let fetched = contexts.get(&created[0].id).await.unwrap();
        assert_eq!(fetched.id, created[0].id);
        assert_eq!(fetched.origin_sequence_index, None);

        assert_eq!(contexts.list().await.unwrap().len(), 1);
        assert!(matches!(contexts.get("missing").await, Err(SdkError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_filters() {
        let mock = MockTransport::new();
        let schemas = client(&mock).schema_metadata("p");
        let mut pinned = wide_table("pinned", 2);
        pinned.is_always_displayed = true;
        schemas.bulk_create([pinned, wide_table("plain", 2)]).await.unwrap();

        assert_eq!(schemas.list_by_type(SchemaType::Table).await.unwrap().len(), 2);
        assert!(schemas.list_by_type(SchemaType::Metric).await.unwrap().is_empty());

        let always = schemas.list_always_displayed().await.unwrap();
        assert_eq!(always.len(), 1);
        assert_eq!(always[0].field("name").and_then(|v| v.as_str()), Some("pinned"));

        let listings = mock.list_request_count();
        let err = client(&mock).contexts("p").list_by_type(SchemaType::Table).await.unwrap_err();
        assert!(matches!(
            err,
            SdkError::UnsupportedOperation { operation: "list_by_type", kind: ResourceKind::Context }
        ));
        assert_eq!(mock.list_request_count(), listings);
    }

    fn changes(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_update_merges_changes() {
        let mock = MockTransport::new();
        let contexts = client(&mock).contexts("p");
        let created = contexts
            .create(ContextCreate::builder().name("rules").content("old").build())
            .await
            .unwrap();
        let id = &created[0].id;

        let updated = contexts.update(id, changes(json!({"content": "new"}))).await.unwrap();

        assert_eq!(updated.len(), 1);
        assert_eq!(&updated[0].id, id);
        assert_eq!(updated[0].field("name").and_then(Value::as_str), Some("rules"));
        assert_eq!(updated[0].field("content").and_then(Value::as_str), Some("new"));
        assert_eq!(mock.update_requests(), [id.clone()]);

        let fetched = contexts.get(id).await.unwrap();
        assert_eq!(fetched.field("content").and_then(Value::as_str), Some("new"));
    }

    #[tokio::test]
    async fn test_update_split_part_keeps_its_position() {
        let mock = MockTransport::new();
        let schemas = client(&mock).schema_metadata("p");
        let parts = schemas.create(wide_table("wide", 10)).await.unwrap();

        let updated = schemas
            .update(&parts[1].id, changes(json!({"description": "second half"})))
            .await
            .unwrap();

        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].split_group_id(), parts[1].split_group_id());
        assert_eq!(updated[0].split_index(), Some(2));
        assert_eq!(updated[0].total_splits(), Some(2));
        assert!(updated[0].warnings.is_empty());
        assert_eq!(updated[0].field("description").and_then(Value::as_str), Some("second half"));
        assert_eq!(mock.stored(ResourceKind::SchemaMetadata).len(), 2);
    }

    #[tokio::test]
    async fn test_update_failures() {
        let mock = MockTransport::new();
        let contexts = client(&mock).contexts("p");
        let created = contexts
            .create(ContextCreate::builder().name("rules").content("old").build())
            .await
            .unwrap();
        let id = &created[0].id;

        let err = contexts.update(id, changes(json!({"content": "  "}))).await.unwrap_err();
        assert!(matches!(err, SdkError::Model { .. }), "got {err:?}");

        let err = contexts.update(id, changes(json!({"content": 7}))).await.unwrap_err();
        assert!(matches!(err, SdkError::Model { .. }), "got {err:?}");
        assert!(mock.update_requests().is_empty());

        mock.reject_label("blocked");
        let err = contexts.update(id, changes(json!({"name": "blocked"}))).await.unwrap_err();
        assert!(matches!(err, SdkError::Validation { .. }), "got {err:?}");

        let err = contexts.update("ctx-404", Map::new()).await.unwrap_err();
        assert!(matches!(err, SdkError::NotFound { .. }), "got {err:?}");
        assert_eq!(mock.update_requests(), [id.clone()]);
    }

    #[tokio::test]
    async fn test_lookup_by_name_and_query() {
        let mock = MockTransport::new();
        let client = client(&mock);
        let contexts = client.contexts("p");
        contexts
            .bulk_create([
                ContextCreate::builder().name("fiscal year").content("April").build(),
                ContextCreate::builder().name("regions").content("EMEA").build(),
            ])
            .await
            .unwrap();

        let found = contexts.get_by_name("regions").await.unwrap().unwrap();
        assert_eq!(found.field("content").and_then(Value::as_str), Some("EMEA"));
        assert!(contexts.get_by_name("nope").await.unwrap().is_none());

        let examples = client.golden_examples("p");
        examples
            .bulk_create([
                GoldenExampleCreate::builder().user_query("How many Users?").sql_query("SELECT 1").build(),
                GoldenExampleCreate::builder().user_query("Revenue by region").sql_query("SELECT 2").build(),
            ])
            .await
            .unwrap();

        let hits = examples.search_by_query("users").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].field("sql_query").and_then(Value::as_str), Some("SELECT 1"));

        let err = examples.get_by_name("x").await.unwrap_err();
        assert!(matches!(err, SdkError::UnsupportedOperation { operation: "get_by_name", .. }));
        let err = contexts.search_by_query("x").await.unwrap_err();
        assert!(matches!(err, SdkError::UnsupportedOperation { operation: "search_by_query", .. }));
    }

    #[tokio::test]
    async fn test_delete_context_is_single_call() {
        let mock = MockTransport::new();
        let contexts = client(&mock).contexts("p");
        let created = contexts.create(ContextCreate::builder().name("a").content("b").build()).await.unwrap();

        let result = contexts.delete(&created[0].id).await.unwrap();
        assert!(result.is_complete());
        assert_eq!(mock.list_request_count(), 0);
        assert_eq!(mock.delete_requests(), [created[0].id.clone()]);
    }

    #[tokio::test]
    async fn test_delete_with_index_uses_outcome() {
        let mock = MockTransport::new();
        let schemas = client(&mock).schema_metadata("p");
        let outcome = schemas.bulk_create([wide_table("wide", 10)]).await.unwrap();
        let index = outcome.group_index();

        let result = schemas.delete_with_index(&outcome.results[1].id, &index).await.unwrap();
        assert!(result.is_complete());
        assert_eq!(result.outcomes.len(), 2);
        assert_eq!(mock.list_request_count(), 0);
        assert!(mock.stored(ResourceKind::SchemaMetadata).is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_calls() {
        let mock = MockTransport::new();
        let client = client(&mock);
        client.shutdown();
        assert!(client.is_shutdown());

        let err = client.contexts("p").list().await.unwrap_err();
        assert!(matches!(err, SdkError::Cancelled));
        assert_eq!(mock.request_count(), 0);
    }
}
