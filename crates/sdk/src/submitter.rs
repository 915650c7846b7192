//! Item submitter.
//!
//! Issues the create, read, update and delete calls for one project. Bulk and
//! single creates are retried on transient failures; reads, updates and
//! deletes are also raced against the client's shutdown token.

use std::sync::Arc;

use serde_json::Value;
use text2everything_types::{LogicalInput, OneOrMany, ResourceKind, ServerRecord};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    config::RetryPolicy,
    error::{Result, SdkError},
    normalize::{parse_bulk_response, parse_entry},
    retry::{with_retry, with_retry_cancellable},
    transport::{ApiRequest, Transport},
};

/// Default page size for listings.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Checks the bulk preconditions: at least one input, all of `kind`.
///
/// # Errors
///
/// Returns [`SdkError::EmptyInput`] or [`SdkError::ResourceKindMismatch`].
pub fn check_inputs(inputs: &[LogicalInput], kind: ResourceKind) -> Result<()> {
    if inputs.is_empty() {
        return Err(SdkError::EmptyInput { kind });
    }
    if let Some(input) = inputs.iter().find(|i| i.kind() != kind) {
        return Err(SdkError::ResourceKindMismatch {
            sequence_index: input.sequence_index,
            expected: kind,
            found: input.kind(),
        });
    }
    Ok(())
}

/// Sends create, read and delete calls for the resources of one project.
#[derive(Debug, Clone)]
pub struct ItemSubmitter {
    transport: Arc<dyn Transport>,
    project_id: String,
    retry_policy: RetryPolicy,
    shutdown: CancellationToken,
}

impl ItemSubmitter {
    /// Creates a submitter for `project_id`.
    pub fn new(
        transport: Arc<dyn Transport>,
        project_id: impl Into<String>,
        retry_policy: RetryPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        Self { transport, project_id: project_id.into(), retry_policy, shutdown }
    }

    /// Returns the project this submitter acts on.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Returns true once the owning client has shut down.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn collection_path(&self, kind: ResourceKind) -> String {
        format!("projects/{}/{}", self.project_id, kind.path_segment())
    }

    fn record_path(&self, kind: ResourceKind, record_id: &str) -> String {
        format!("{}/{record_id}", self.collection_path(kind))
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(SdkError::Cancelled);
        }
        Ok(())
    }

    /// Submits every input in one call to the bulk endpoint.
    ///
    /// Returns one slot per input, in input order. A slot holds
    /// [`SdkError::ResponseShape`] when the body had no usable entry for that
    /// input; see [`parse_bulk_response`].
    ///
    /// # Errors
    ///
    /// - [`SdkError::EmptyInput`] / [`SdkError::ResourceKindMismatch`] before any call.
    /// - [`SdkError::BulkSubmissionFailed`] if the call fails, after retries.
    pub async fn submit_bulk(
        &self,
        inputs: &[LogicalInput],
        kind: ResourceKind,
    ) -> Result<Vec<Result<OneOrMany<ServerRecord>>>> {
        check_inputs(inputs, kind)?;
        self.ensure_running()?;

        let bodies = inputs
            .iter()
            .map(|input| input.payload.to_body())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let request =
            ApiRequest::post(format!("{}/bulk", self.collection_path(kind)), Value::Array(bodies));

        debug!(kind = %kind, count = inputs.len(), project_id = %self.project_id, "submitting bulk");
        let body = with_retry(&self.retry_policy, || self.transport.send(request.clone()))
            .await
            .map_err(|source| SdkError::BulkSubmissionFailed {
                kind,
                count: inputs.len(),
                source: Box::new(source),
            })?;

        Ok(parse_bulk_response(body, inputs.len()))
    }

    /// Submits one input to the single-create endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::ResourceKindMismatch`] for a payload of another
    /// kind, the call's error after retries, or [`SdkError::ResponseShape`].
    pub async fn submit_single(
        &self,
        input: &LogicalInput,
        kind: ResourceKind,
    ) -> Result<OneOrMany<ServerRecord>> {
        check_inputs(std::slice::from_ref(input), kind)?;
        self.ensure_running()?;

        let request = ApiRequest::post(self.collection_path(kind), input.payload.to_body()?);
        debug!(
            kind = %kind,
            sequence_index = input.sequence_index,
            label = input.payload.label(),
            "submitting item"
        );
        let body = with_retry(&self.retry_policy, || self.transport.send(request.clone())).await?;
        parse_entry(body)
    }

    /// Fetches one record by id.
    ///
    /// An array response yields its first element.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::NotFound`] for an unknown id, [`SdkError::Cancelled`]
    /// after shutdown, or [`SdkError::ResponseShape`] for an empty array.
    pub async fn get(&self, kind: ResourceKind, record_id: &str) -> Result<ServerRecord> {
        let request = ApiRequest::get(self.record_path(kind, record_id));
        let body = with_retry_cancellable(&self.retry_policy, &self.shutdown, "get", || {
            self.transport.send(request.clone())
        })
        .await?;

        parse_entry(body)?.into_vec().into_iter().next().ok_or_else(|| SdkError::ResponseShape {
            message: format!("empty response for {kind} {record_id}"),
        })
    }

    /// Lists every record of `kind` in the project, following pagination.
    ///
    /// # Errors
    ///
    /// Returns the first page error, [`SdkError::Cancelled`] after shutdown,
    /// or [`SdkError::ResponseShape`] for an unrecognized page body.
    pub async fn list(&self, kind: ResourceKind, per_page: u32) -> Result<Vec<ServerRecord>> {
        let per_page = per_page.max(1);
        let mut records = Vec::new();
        let mut page: u32 = 1;

        loop {
            let request = ApiRequest::get(self.collection_path(kind))
                .with_query("page", page)
                .with_query("per_page", per_page);
            let body = with_retry_cancellable(&self.retry_policy, &self.shutdown, "list", || {
                self.transport.send(request.clone())
            })
            .await?;

            let (items, has_more) = parse_page(body, page, per_page)?;
            let fetched = items.len();
            records.extend(items);
            debug!(kind = %kind, page, fetched, has_more, "listed page");

            if !has_more || fetched == 0 {
                return Ok(records);
            }
            page += 1;
        }
    }

    /// Replaces the stored payload of one record.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::ResourceKindMismatch`] for a payload of another
    /// kind, [`SdkError::NotFound`] for an unknown id, [`SdkError::Cancelled`]
    /// after shutdown, or [`SdkError::ResponseShape`].
    pub async fn update(
        &self,
        kind: ResourceKind,
        record_id: &str,
        input: &LogicalInput,
    ) -> Result<OneOrMany<ServerRecord>> {
        check_inputs(std::slice::from_ref(input), kind)?;

        let request = ApiRequest::put(self.record_path(kind, record_id), input.payload.to_body()?);
        debug!(kind = %kind, record_id, label = input.payload.label(), "updating record");
        let body = with_retry_cancellable(&self.retry_policy, &self.shutdown, "update", || {
            self.transport.send(request.clone())
        })
        .await?;
        parse_entry(body)
    }

    /// Deletes one physical record.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::NotFound`] if the record does not exist, or
    /// [`SdkError::Cancelled`] after shutdown.
    pub async fn delete(&self, kind: ResourceKind, record_id: &str) -> Result<()> {
        let request = ApiRequest::delete(self.record_path(kind, record_id));
        with_retry_cancellable(&self.retry_policy, &self.shutdown, "delete", || {
            self.transport.send(request.clone())
        })
        .await?;
        debug!(kind = %kind, record_id, "deleted record");
        Ok(())
    }
}

/// Decodes one listing page.
///
/// Accepts a bare array (more pages while it is full), an
/// `{items, has_next}` envelope, an `{items, total, page, page_size}`
/// envelope, or a lone record.
fn parse_page(body: Value, page: u32, per_page: u32) -> Result<(Vec<ServerRecord>, bool)> {
    let decode = |value: Value| -> Result<Vec<ServerRecord>> {
        serde_json::from_value(value).map_err(|e| SdkError::ResponseShape {
            message: format!("page {page} is not a list of records: {e}"),
        })
    };

    match body {
        Value::Array(_) => {
            let items = decode(body)?;
            let has_more = items.len() == per_page as usize;
            Ok((items, has_more))
        },
        Value::Object(mut envelope) if envelope.contains_key("items") => {
            let items = decode(envelope.remove("items").unwrap_or(Value::Null))?;
            let has_more = match envelope.get("has_next") {
                Some(has_next) => has_next.as_bool().unwrap_or(false),
                None => {
                    let total = envelope.get("total").and_then(Value::as_u64).unwrap_or(0);
                    let page_value = envelope
                        .get("page")
                        .and_then(Value::as_u64)
                        .filter(|&p| p > 0)
                        .unwrap_or(u64::from(page));
                    let page_size = envelope
                        .get("page_size")
                        .and_then(Value::as_u64)
                        .filter(|&s| s > 0)
                        .unwrap_or(u64::from(per_page));
                    page_value * page_size < total
                },
            };
            Ok((items, has_more))
        },
        Value::Null => Ok((Vec::new(), false)),
        Value::Object(_) => {
            let record = serde_json::from_value(body).map_err(|e| SdkError::ResponseShape {
                message: format!("page {page} is not a record: {e}"),
            })?;
            Ok((vec![record], false))
        },
        other => Err(SdkError::ResponseShape {
            message: format!("page {page} has unexpected body {other}"),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::disallowed_methods)]
mod tests {
    use serde_json::json;
    use text2everything_types::{ContextCreate, GoldenExampleCreate};

    use super::*;

    #[test]
    fn test_check_inputs_rejects_empty() {
        let err = check_inputs(&[], ResourceKind::Context).unwrap_err();
        assert!(matches!(err, SdkError::EmptyInput { kind: ResourceKind::Context }));
    }

    #[test]
    fn test_check_inputs_rejects_mixed_kinds() {
        let mut inputs =
            LogicalInput::enumerate([ContextCreate::builder().name("a").content("b").build()]);
        inputs.push(LogicalInput {
            sequence_index: 1,
            payload: GoldenExampleCreate::builder().user_query("q").sql_query("s").build().into(),
        });

        let err = check_inputs(&inputs, ResourceKind::Context).unwrap_err();
        assert!(matches!(
            err,
            SdkError::ResourceKindMismatch {
                sequence_index: 1,
                expected: ResourceKind::Context,
                found: ResourceKind::GoldenExample,
            }
        ));
    }

    #[test]
    fn test_parse_page_bare_array() {
        let (items, more) = parse_page(json!([{"id": "a"}, {"id": "b"}]), 1, 2).unwrap();
        assert_eq!(items.len(), 2);
        assert!(more);

        let (_, more) = parse_page(json!([{"id": "a"}]), 1, 2).unwrap();
        assert!(!more);
    }

    #[test]
    fn test_parse_page_envelopes() {
        let (items, more) =
            parse_page(json!({"items": [{"id": "a"}], "has_next": true}), 1, 50).unwrap();
        assert_eq!(items[0].id, "a");
        assert!(more);

        let body = json!({"items": [{"id": "a"}], "total": 3, "page": 1, "page_size": 1});
        let (_, more) = parse_page(body, 1, 50).unwrap();
        assert!(more);

        let body = json!({"items": [{"id": "c"}], "total": 3, "page": 3, "page_size": 1});
        let (_, more) = parse_page(body, 3, 50).unwrap();
        assert!(!more);
    }

    #[test]
    fn test_parse_page_single_record_and_errors() {
        let (items, more) = parse_page(json!({"id": "only"}), 1, 50).unwrap();
        assert_eq!(items.len(), 1);
        assert!(!more);

        assert!(parse_page(json!("nope"), 1, 50).is_err());
        assert!(parse_page(json!({"items": "nope"}), 1, 50).is_err());
    }
}
