//! In-memory mock server for SDK integration testing.
//!
//! [`MockTransport`] implements [`Transport`] against an in-memory copy of the
//! Text2Everything REST API, so bulk, fallback and cascade behavior can be
//! exercised without a running service.
//!
//! # Features
//!
//! - **Record storage**: created records are kept per project and kind and
//!   can be listed, fetched, updated and deleted
//! - **Server-side splitting**: schema metadata with more than
//!   [`DEFAULT_SPLIT_THRESHOLD`] table columns is stored as several parts
//! - **Failure injection**: bulk failures, validation rejections by label,
//!   transient unavailability, failing deletes, malformed responses
//! - **Request recording**: every request is kept for verification, along
//!   with the peak number of concurrent requests
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use text2everything_sdk::{ClientConfig, Text2EverythingClient, mock::MockTransport};
//! use text2everything_types::ContextCreate;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mock = MockTransport::new();
//! mock.fail_next_bulk(1);
//!
//! let config = ClientConfig::builder()
//!     .with_access_token("test-token")
//!     .with_workspace_name("workspaces/test")
//!     .build()?;
//! let client = Text2EverythingClient::with_transport(config, Arc::new(mock.clone()));
//!
//! let _outcome = client
//!     .contexts("project-1")
//!     .bulk_create([ContextCreate::builder().name("rules").content("...").build()])
//!     .await?;
//! assert_eq!(mock.single_create_count(), 1);
//! # Ok(())
//! # }
//! ```

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value, json};
use text2everything_types::{ResourceKind, ServerRecord};

use crate::{
    error::{Result, SdkError},
    transport::{ApiRequest, Method, Transport},
};

/// Column count above which the mock splits a table schema.
pub const DEFAULT_SPLIT_THRESHOLD: usize = 8;

/// Timestamp stamped on every created record.
const CREATED_AT: &str = "2025-01-01T00:00:00Z";

/// Timestamp stamped on every updated record.
const UPDATED_AT: &str = "2025-01-02T00:00:00Z";

/// Fields an update never overwrites.
const SERVER_FIELDS: [&str; 6] =
    ["id", "project_id", "created_at", "split_group_id", "split_index", "total_splits"];

/// A request as received by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// HTTP method.
    pub method: Method,
    /// Request path below `/api/`.
    pub path: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
}

/// One stored record.
#[derive(Debug, Clone)]
struct StoredRecord {
    project_id: String,
    kind: ResourceKind,
    fields: Map<String, Value>,
}

impl StoredRecord {
    fn id(&self) -> &str {
        self.fields.get("id").and_then(Value::as_str).unwrap_or_default()
    }

    fn group_id(&self) -> Option<&str> {
        self.fields.get("split_group_id").and_then(Value::as_str)
    }
}

/// Shared state for the mock server.
#[derive(Debug)]
struct MockState {
    /// Stored records in creation order.
    records: RwLock<Vec<StoredRecord>>,

    /// Next record number to assign.
    next_id: AtomicU64,

    /// Next split group number to assign.
    next_group: AtomicU64,

    /// Maximum columns per stored part.
    split_threshold: AtomicUsize,

    /// Number of upcoming bulk requests to fail with HTTP 500.
    bulk_failures: AtomicUsize,

    /// Number of upcoming requests to fail with HTTP 503.
    unavailable_count: AtomicUsize,

    /// Labels rejected with HTTP 400; a bulk containing one is rejected whole.
    rejected_labels: RwLock<HashSet<String>>,

    /// Strip `split_group_id` from create responses.
    omit_split_group_ids: AtomicBool,

    /// Strip `split_index`/`total_splits` from create responses.
    omit_split_positions: AtomicBool,

    /// Drop the last entry of every bulk response.
    truncate_bulk: AtomicBool,

    /// Delete whole split groups when one part is deleted.
    cascade_deletes: AtomicBool,

    /// Record ids whose delete fails with HTTP 409.
    failing_deletes: RwLock<HashSet<String>>,

    /// Delay applied to each request (milliseconds).
    delay_ms: AtomicU64,

    /// Requests currently being handled.
    in_flight: AtomicUsize,

    /// Highest value `in_flight` reached.
    max_in_flight: AtomicUsize,

    /// Every request received.
    requests: RwLock<Vec<RecordedRequest>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            next_group: AtomicU64::new(1),
            split_threshold: AtomicUsize::new(DEFAULT_SPLIT_THRESHOLD),
            bulk_failures: AtomicUsize::new(0),
            unavailable_count: AtomicUsize::new(0),
            rejected_labels: RwLock::new(HashSet::new()),
            omit_split_group_ids: AtomicBool::new(false),
            omit_split_positions: AtomicBool::new(false),
            truncate_bulk: AtomicBool::new(false),
            cascade_deletes: AtomicBool::new(false),
            failing_deletes: RwLock::new(HashSet::new()),
            delay_ms: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            requests: RwLock::new(Vec::new()),
        }
    }
}

/// Decrements a counter if it is positive; returns true if it did.
fn take_one(counter: &AtomicUsize) -> bool {
    counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
}

/// Tracks one in-flight request.
struct InFlightGuard<'a>(&'a MockState);

impl<'a> InFlightGuard<'a> {
    fn enter(state: &'a MockState) -> Self {
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(state)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn label_of(body: &Map<String, Value>) -> &str {
    body.get("name")
        .or_else(|| body.get("user_query"))
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn id_prefix(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::SchemaMetadata => "sm",
        ResourceKind::Context => "ctx",
        ResourceKind::GoldenExample => "ge",
    }
}

impl MockState {
    async fn maybe_delay(&self) {
        let delay_ms = self.delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }

    fn check_rejected(&self, body: &Map<String, Value>) -> Result<()> {
        let label = label_of(body);
        if self.rejected_labels.read().contains(label) {
            return Err(SdkError::from_status(400, format!("'{label}' failed server validation"), None));
        }
        Ok(())
    }

    /// Strips split fields according to the omission toggles.
    fn present(&self, fields: &Map<String, Value>) -> Value {
        let mut fields = fields.clone();
        if self.omit_split_group_ids.load(Ordering::SeqCst) {
            fields.remove("split_group_id");
        }
        if self.omit_split_positions.load(Ordering::SeqCst) {
            fields.remove("split_index");
            fields.remove("total_splits");
        }
        Value::Object(fields)
    }

    fn new_record(&self, project_id: &str, kind: ResourceKind, body: &Map<String, Value>) -> Map<String, Value> {
        let number = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut fields = body.clone();
        fields.insert("id".to_owned(), json!(format!("{}-{number}", id_prefix(kind))));
        fields.insert("project_id".to_owned(), json!(project_id));
        fields.insert("created_at".to_owned(), json!(CREATED_AT));
        fields.insert("updated_at".to_owned(), json!(CREATED_AT));
        fields
    }

    /// Stores one payload, splitting wide tables, and returns the create response entry.
    fn persist(&self, project_id: &str, kind: ResourceKind, body: &Value) -> Result<Value> {
        let Value::Object(body) = body else {
            return Err(SdkError::from_status(400, "payload must be an object", None));
        };

        let threshold = self.split_threshold.load(Ordering::SeqCst).max(1);
        let columns = body
            .get("schema_data")
            .and_then(|s| s.get("table"))
            .and_then(|t| t.get("columns"))
            .and_then(Value::as_array)
            .filter(|columns| kind.supports_split() && columns.len() > threshold);

        let Some(columns) = columns else {
            let record = self.new_record(project_id, kind, body);
            let response = self.present(&record);
            self.records.write().push(StoredRecord {
                project_id: project_id.to_owned(),
                kind,
                fields: record,
            });
            return Ok(response);
        };

        let chunks: Vec<&[Value]> = columns.chunks(threshold).collect();
        let total = chunks.len();
        let group_id = format!("grp-{}", self.next_group.fetch_add(1, Ordering::SeqCst));

        let mut parts = Vec::with_capacity(total);
        for (position, chunk) in chunks.into_iter().enumerate() {
            let mut record = self.new_record(project_id, kind, body);
            if let Some(table) = record
                .get_mut("schema_data")
                .and_then(|s| s.get_mut("table"))
                .and_then(Value::as_object_mut)
            {
                table.insert("columns".to_owned(), Value::Array(chunk.to_vec()));
            }
            record.insert("split_group_id".to_owned(), json!(group_id));
            record.insert("split_index".to_owned(), json!(position + 1));
            record.insert("total_splits".to_owned(), json!(total));
            parts.push(record);
        }

        let response = parts.iter().map(|p| self.present(p)).collect();
        self.records.write().extend(parts.into_iter().map(|fields| StoredRecord {
            project_id: project_id.to_owned(),
            kind,
            fields,
        }));
        Ok(Value::Array(response))
    }

    fn bulk_create(&self, project_id: &str, kind: ResourceKind, body: Option<&Value>) -> Result<Value> {
        let Some(Value::Array(items)) = body else {
            return Err(SdkError::from_status(400, "bulk body must be an array", None));
        };
        if take_one(&self.bulk_failures) {
            return Err(SdkError::from_status(500, "Injected bulk failure", None));
        }
        for item in items {
            if let Value::Object(fields) = item {
                self.check_rejected(fields)?;
            }
        }

        let mut entries =
            items.iter().map(|item| self.persist(project_id, kind, item)).collect::<Result<Vec<_>>>()?;
        if self.truncate_bulk.load(Ordering::SeqCst) {
            entries.pop();
        }
        Ok(Value::Array(entries))
    }

    fn create(&self, project_id: &str, kind: ResourceKind, body: Option<&Value>) -> Result<Value> {
        let Some(body) = body else {
            return Err(SdkError::from_status(400, "missing body", None));
        };
        if let Value::Object(fields) = body {
            self.check_rejected(fields)?;
        }
        self.persist(project_id, kind, body)
    }

    fn list(&self, project_id: &str, kind: ResourceKind, request: &ApiRequest) -> Value {
        let page = request.query_param("page").and_then(|p| p.parse::<usize>().ok()).unwrap_or(1).max(1);
        let per_page =
            request.query_param("per_page").and_then(|p| p.parse::<usize>().ok()).unwrap_or(50).max(1);

        let records = self.records.read();
        let matching: Vec<&StoredRecord> =
            records.iter().filter(|r| r.project_id == project_id && r.kind == kind).collect();
        let total = matching.len();
        let items: Vec<Value> = matching
            .iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .map(|r| Value::Object(r.fields.clone()))
            .collect();

        json!({
            "items": items,
            "total": total,
            "page": page,
            "page_size": per_page,
            "has_next": page * per_page < total,
        })
    }

    fn get(&self, project_id: &str, kind: ResourceKind, id: &str) -> Result<Value> {
        self.records
            .read()
            .iter()
            .find(|r| r.project_id == project_id && r.kind == kind && r.id() == id)
            .map(|r| Value::Object(r.fields.clone()))
            .ok_or_else(|| SdkError::from_status(404, format!("{kind} {id} not found"), None))
    }

    /// Overlays the body onto a stored record. Split parts answer with a
    /// one-element array, like their create response.
    fn update(&self, project_id: &str, kind: ResourceKind, id: &str, body: Option<&Value>) -> Result<Value> {
        let Some(Value::Object(body)) = body else {
            return Err(SdkError::from_status(400, "payload must be an object", None));
        };
        self.check_rejected(body)?;

        let mut records = self.records.write();
        let record = records
            .iter_mut()
            .find(|r| r.project_id == project_id && r.kind == kind && r.id() == id)
            .ok_or_else(|| SdkError::from_status(404, format!("{kind} {id} not found"), None))?;

        for (key, value) in body.iter().filter(|(key, _)| !SERVER_FIELDS.contains(&key.as_str())) {
            record.fields.insert(key.clone(), value.clone());
        }
        record.fields.insert("updated_at".to_owned(), json!(UPDATED_AT));

        let response = self.present(&record.fields);
        Ok(if record.group_id().is_some() { Value::Array(vec![response]) } else { response })
    }

    fn delete(&self, project_id: &str, kind: ResourceKind, id: &str) -> Result<Value> {
        if self.failing_deletes.read().contains(id) {
            return Err(SdkError::from_status(409, format!("{kind} {id} is locked"), None));
        }

        let mut records = self.records.write();
        let Some(position) =
            records.iter().position(|r| r.project_id == project_id && r.kind == kind && r.id() == id)
        else {
            return Err(SdkError::from_status(404, format!("{kind} {id} not found"), None));
        };

        let group = records[position].group_id().map(str::to_owned);
        match group {
            Some(group) if self.cascade_deletes.load(Ordering::SeqCst) => {
                records.retain(|r| r.group_id() != Some(group.as_str()));
            },
            _ => {
                records.remove(position);
            },
        }
        Ok(Value::Null)
    }
}

/// Mock [`Transport`] backed by in-memory state.
///
/// Clones share state, so a test can keep one handle for assertions and
/// hand another to the client.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    /// Creates an empty mock server.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of columns stored per schema part.
    pub fn set_split_threshold(&self, columns: usize) {
        self.state.split_threshold.store(columns, Ordering::SeqCst);
    }

    /// Fails the next `count` bulk requests with HTTP 500.
    pub fn fail_next_bulk(&self, count: usize) {
        self.state.bulk_failures.store(count, Ordering::SeqCst);
    }

    /// Injects HTTP 503 for the next `count` requests of any kind.
    pub fn inject_unavailable(&self, count: usize) {
        self.state.unavailable_count.store(count, Ordering::SeqCst);
    }

    /// Rejects payloads with this name or question with HTTP 400.
    ///
    /// A bulk request containing such a payload is rejected as a whole.
    pub fn reject_label(&self, label: impl Into<String>) {
        self.state.rejected_labels.write().insert(label.into());
    }

    /// Omits `split_group_id` from create responses.
    pub fn omit_split_group_ids(&self, omit: bool) {
        self.state.omit_split_group_ids.store(omit, Ordering::SeqCst);
    }

    /// Omits `split_index` and `total_splits` from create responses.
    pub fn omit_split_positions(&self, omit: bool) {
        self.state.omit_split_positions.store(omit, Ordering::SeqCst);
    }

    /// Drops the last entry of every bulk response.
    pub fn truncate_bulk_responses(&self, truncate: bool) {
        self.state.truncate_bulk.store(truncate, Ordering::SeqCst);
    }

    /// Makes deleting one split part delete the whole group server-side.
    pub fn cascade_deletes(&self, cascade: bool) {
        self.state.cascade_deletes.store(cascade, Ordering::SeqCst);
    }

    /// Fails every delete of `record_id` with HTTP 409.
    pub fn fail_delete(&self, record_id: impl Into<String>) {
        self.state.failing_deletes.write().insert(record_id.into());
    }

    /// Injects a delay for all subsequent requests.
    ///
    /// Set to zero to disable.
    pub fn inject_delay(&self, delay: Duration) {
        self.state.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Stores a record directly, bypassing the create endpoints.
    pub fn insert_record(&self, project_id: &str, kind: ResourceKind, record: &ServerRecord) {
        if let Ok(Value::Object(fields)) = serde_json::to_value(record) {
            self.state.records.write().push(StoredRecord {
                project_id: project_id.to_owned(),
                kind,
                fields,
            });
        }
    }

    /// Returns every stored record of `kind`, in creation order.
    #[must_use]
    pub fn stored(&self, kind: ResourceKind) -> Vec<ServerRecord> {
        self.state
            .records
            .read()
            .iter()
            .filter(|r| r.kind == kind)
            .filter_map(|r| serde_json::from_value(Value::Object(r.fields.clone())).ok())
            .collect()
    }

    /// Returns every request received, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.read().clone()
    }

    /// Total number of requests received.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.state.requests.read().len()
    }

    /// Number of requests to bulk endpoints.
    #[must_use]
    pub fn bulk_request_count(&self) -> usize {
        self.count_requests(|r| r.method == Method::Post && r.path.ends_with("/bulk"))
    }

    /// Number of requests to single-create endpoints.
    #[must_use]
    pub fn single_create_count(&self) -> usize {
        self.count_requests(|r| r.method == Method::Post && !r.path.ends_with("/bulk"))
    }

    /// Number of listing requests.
    #[must_use]
    pub fn list_request_count(&self) -> usize {
        self.count_requests(|r| r.method == Method::Get && r.query.iter().any(|(k, _)| k == "page"))
    }

    /// Record ids of every update request, in arrival order.
    #[must_use]
    pub fn update_requests(&self) -> Vec<String> {
        self.requests_for(Method::Put)
    }

    /// Record ids of every delete request, in arrival order.
    #[must_use]
    pub fn delete_requests(&self) -> Vec<String> {
        self.requests_for(Method::Delete)
    }

    fn requests_for(&self, method: Method) -> Vec<String> {
        self.state
            .requests
            .read()
            .iter()
            .filter(|r| r.method == method)
            .filter_map(|r| r.path.rsplit('/').next().map(str::to_owned))
            .collect()
    }

    /// Highest number of requests handled at the same time.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    fn count_requests(&self, predicate: impl Fn(&RecordedRequest) -> bool) -> usize {
        self.state.requests.read().iter().filter(|r| predicate(r)).count()
    }

    /// Resets all state to initial values.
    pub fn reset(&self) {
        let state = &self.state;
        state.records.write().clear();
        state.rejected_labels.write().clear();
        state.failing_deletes.write().clear();
        state.requests.write().clear();
        state.next_id.store(1, Ordering::SeqCst);
        state.next_group.store(1, Ordering::SeqCst);
        state.split_threshold.store(DEFAULT_SPLIT_THRESHOLD, Ordering::SeqCst);
        state.bulk_failures.store(0, Ordering::SeqCst);
        state.unavailable_count.store(0, Ordering::SeqCst);
        state.omit_split_group_ids.store(false, Ordering::SeqCst);
        state.omit_split_positions.store(false, Ordering::SeqCst);
        state.truncate_bulk.store(false, Ordering::SeqCst);
        state.cascade_deletes.store(false, Ordering::SeqCst);
        state.delay_ms.store(0, Ordering::SeqCst);
        state.max_in_flight.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value> {
        let state = &*self.state;
        state.requests.write().push(RecordedRequest {
            method: request.method,
            path: request.path.clone(),
            query: request.query.clone(),
        });

        let _guard = InFlightGuard::enter(state);
        state.maybe_delay().await;
        if take_one(&state.unavailable_count) {
            return Err(SdkError::from_status(503, "Injected unavailable", None));
        }

        let not_found =
            || SdkError::from_status(404, format!("no route for {} {}", request.method, request.path), None);
        let segments: Vec<&str> = request.path.trim_matches('/').split('/').collect();
        let ["projects", project_id, segment, rest @ ..] = segments.as_slice() else {
            return Err(not_found());
        };
        let kind = ResourceKind::ALL
            .into_iter()
            .find(|k| k.path_segment() == *segment)
            .ok_or_else(not_found)?;

        match (request.method, rest) {
            (Method::Post, ["bulk"]) => state.bulk_create(project_id, kind, request.body.as_ref()),
            (Method::Post, []) => state.create(project_id, kind, request.body.as_ref()),
            (Method::Get, []) => Ok(state.list(project_id, kind, &request)),
            (Method::Get, [id]) => state.get(project_id, kind, id),
            (Method::Put, [id]) => state.update(project_id, kind, id, request.body.as_ref()),
            (Method::Delete, [id]) => state.delete(project_id, kind, id),
            _ => Err(SdkError::from_status(405, format!("{} not allowed", request.method), None)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn table(columns: usize) -> Value {
        let columns: Vec<Value> =
            (0..columns).map(|i| json!({"name": format!("c{i}"), "type": "string"})).collect();
        json!({"name": "wide", "schema_data": {"table": {"name": "wide", "columns": columns}}})
    }

    #[tokio::test]
    async fn test_splits_wide_tables() {
        let mock = MockTransport::new();
        let body = mock
            .send(ApiRequest::post("projects/p1/schema-metadata", table(10)))
            .await
            .unwrap();

        let parts = body.as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["split_index"], 1);
        assert_eq!(parts[1]["total_splits"], 2);
        assert_eq!(parts[0]["schema_data"]["table"]["columns"].as_array().unwrap().len(), 8);
        assert_eq!(parts[1]["schema_data"]["table"]["columns"].as_array().unwrap().len(), 2);
        assert_eq!(parts[0]["split_group_id"], parts[1]["split_group_id"]);
        assert_eq!(mock.stored(ResourceKind::SchemaMetadata).len(), 2);
    }

    #[tokio::test]
    async fn test_update_keeps_server_fields() {
        let mock = MockTransport::new();
        mock.send(ApiRequest::post("projects/p1/schema-metadata", table(10))).await.unwrap();

        let mut body = table(3);
        body["split_index"] = json!(9);
        body["description"] = json!("narrowed");
        let updated =
            mock.send(ApiRequest::put("projects/p1/schema-metadata/sm-1", body)).await.unwrap();

        let part = &updated.as_array().unwrap()[0];
        assert_eq!(part["id"], "sm-1");
        assert_eq!(part["split_index"], 1);
        assert_eq!(part["description"], "narrowed");
        assert_eq!(part["updated_at"], UPDATED_AT);
        assert_eq!(part["schema_data"]["table"]["columns"].as_array().unwrap().len(), 3);
        assert_eq!(mock.update_requests(), ["sm-1"]);

        let err = mock
            .send(ApiRequest::put("projects/p1/contexts/ctx-9", json!({"name": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_narrow_table_is_single_record() {
        let mock = MockTransport::new();
        let body = mock
            .send(ApiRequest::post("projects/p1/schema-metadata", table(8)))
            .await
            .unwrap();
        assert!(body.is_object());
        assert!(body.get("split_group_id").is_none());
    }

    #[tokio::test]
    async fn test_rejected_label_fails_whole_bulk() {
        let mock = MockTransport::new();
        mock.reject_label("bad");
        let body = json!([{"name": "good", "content": "x"}, {"name": "bad", "content": "y"}]);

        let err = mock.send(ApiRequest::post("projects/p1/contexts/bulk", body)).await.unwrap_err();
        assert!(matches!(err, SdkError::Validation { .. }));
        assert!(mock.stored(ResourceKind::Context).is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let mock = MockTransport::new();
        mock.inject_unavailable(1);
        let request = ApiRequest::get("projects/p1/contexts").with_query("page", 1);

        assert!(mock.send(request.clone()).await.unwrap_err().is_retryable());
        assert!(mock.send(request).await.is_ok());
        assert_eq!(mock.list_request_count(), 2);
    }

    #[tokio::test]
    async fn test_delete_and_unknown_routes() {
        let mock = MockTransport::new();
        let created = mock
            .send(ApiRequest::post("projects/p1/contexts", json!({"name": "a", "content": "b"})))
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap().to_owned();

        mock.send(ApiRequest::delete(format!("projects/p1/contexts/{id}"))).await.unwrap();
        let err = mock.send(ApiRequest::delete(format!("projects/p1/contexts/{id}"))).await.unwrap_err();
        assert!(matches!(err, SdkError::NotFound { .. }));
        assert_eq!(mock.delete_requests(), [id.clone(), id]);

        let err = mock.send(ApiRequest::get("elsewhere")).await.unwrap_err();
        assert!(matches!(err, SdkError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_paginates() {
        let mock = MockTransport::new();
        for i in 0..3 {
            mock.send(ApiRequest::post(
                "projects/p1/contexts",
                json!({"name": format!("c{i}"), "content": "x"}),
            ))
            .await
            .unwrap();
        }

        let page = mock
            .send(ApiRequest::get("projects/p1/contexts").with_query("page", 2).with_query("per_page", 2))
            .await
            .unwrap();
        assert_eq!(page["items"].as_array().unwrap().len(), 1);
        assert_eq!(page["has_next"], false);
        assert_eq!(page["total"], 3);
    }
}
