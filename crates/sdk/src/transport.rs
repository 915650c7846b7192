//! Request transport.
//!
//! [`Transport`] is the seam between the SDK's bulk logic and the wire. The
//! production implementation, [`HttpTransport`], speaks JSON over HTTP with
//! `reqwest`. Tests substitute [`MockTransport`](crate::mock::MockTransport).
//!
//! A transport performs exactly one attempt per call. Retrying is the
//! caller's job, so every failure is mapped onto an [`SdkError`] whose
//! [`is_retryable`](SdkError::is_retryable) answer drives the retry layer.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde_json::Value;
use tracing::debug;

use crate::{
    config::ClientConfig,
    error::{ConfigSnafu, Result, SdkError},
};

/// Header naming the workspace a request acts on.
pub const WORKSPACE_HEADER: &str = "X-Workspace-Name";

/// HTTP method of an [`ApiRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
}

impl Method {
    /// Returns the method name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A single API call, relative to the service's `/api/` root.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path below `/api/`, without a leading slash.
    pub path: String,
    /// Query string parameters.
    pub query: Vec<(String, String)>,
    /// JSON body, if any.
    pub body: Option<Value>,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), query: Vec::new(), body: None }
    }

    /// Builds a `GET` request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// Builds a `POST` request carrying `body`.
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self { body: Some(body), ..Self::new(Method::Post, path) }
    }

    /// Builds a `PUT` request carrying `body`.
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self { body: Some(body), ..Self::new(Method::Put, path) }
    }

    /// Builds a `DELETE` request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Returns the value of the first query parameter named `key`.
    #[must_use]
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

/// Sends API requests and returns decoded JSON bodies.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Performs one attempt of `request`.
    ///
    /// Returns the decoded success body, or `Value::Null` for an empty one.
    ///
    /// # Errors
    ///
    /// Returns the [`SdkError`] matching the failure: a transport error for
    /// connection problems and timeouts, or the status-specific variant from
    /// [`SdkError::from_status`] for a non-success response.
    async fn send(&self, request: ApiRequest) -> Result<Value>;
}

/// [`Transport`] over HTTP using `reqwest`.
///
/// Every request carries a bearer token, the workspace header and the
/// configured `User-Agent`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    api_root: String,
    access_token: String,
    workspace_name: String,
}

impl HttpTransport {
    /// Creates a transport from client configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.timeout())
            .user_agent(config.user_agent())
            .build()
            .map_err(|e| {
                ConfigSnafu { message: format!("failed to create HTTP client: {e}") }.build()
            })?;

        Ok(Self {
            client,
            api_root: format!("{}/api/", config.base_url()),
            access_token: config.access_token().to_owned(),
            workspace_name: config.workspace_name().to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_root, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value> {
        let url = self.url(&request.path);
        debug!(method = %request.method, url = %url, "sending request");

        let mut builder = self
            .client
            .request(request.method.into(), &url)
            .bearer_auth(&self.access_token)
            .header(WORKSPACE_HEADER, &self.workspace_name);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let bytes = response.bytes().await.map_err(map_transport_error)?;

        if status.is_success() {
            if bytes.iter().all(u8::is_ascii_whitespace) {
                return Ok(Value::Null);
            }
            return serde_json::from_slice(&bytes).map_err(|e| SdkError::ResponseShape {
                message: format!("invalid JSON from {} {url}: {e}", request.method),
            });
        }

        let body: Option<Value> = serde_json::from_slice(&bytes).ok();
        let message = error_message(body.as_ref(), status);
        debug!(status = status.as_u16(), url = %url, message = %message, "request failed");
        Err(SdkError::from_status(status.as_u16(), message, retry_after))
    }
}

fn map_transport_error(error: reqwest::Error) -> SdkError {
    if error.is_timeout() {
        SdkError::Timeout { message: error.to_string() }
    } else if error.is_decode() {
        SdkError::ResponseShape { message: error.to_string() }
    } else {
        crate::error::ConnectionSnafu { message: error.to_string() }.build()
    }
}

/// Reads `Retry-After` given in whole seconds.
fn parse_retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Extracts the server's error description from a failure body.
fn error_message(body: Option<&Value>, status: StatusCode) -> String {
    let from_body = body.and_then(|b| {
        ["error", "detail", "message"].iter().find_map(|key| match b.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
    });
    from_body.unwrap_or_else(|| match status.canonical_reason() {
        Some(reason) => format!("HTTP {} {reason}", status.as_u16()),
        None => format!("HTTP {}", status.as_u16()),
    })
}
