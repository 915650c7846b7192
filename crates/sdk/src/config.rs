//! Client configuration with builder pattern.
//!
//! Provides type-safe configuration for SDK clients including:
//! - Service base URL and workspace credentials
//! - Timeouts and retry policies
//! - Bulk submission settings

use std::{fmt, time::Duration};

use snafu::ensure;

use crate::error::{ConfigSnafu, InvalidUrlSnafu, Result, SdkError};

/// Default service URL inside the cluster.
pub const DEFAULT_BASE_URL: &str = "http://text2everything.text2everything.svc.cluster.local:8000";

/// Default request timeout (180 seconds). Large schema uploads are slow.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Default connection timeout (30 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on concurrent per-item requests.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 8;

/// Workspace names are fully qualified resource names.
const WORKSPACE_PREFIX: &str = "workspaces/";

/// Configuration for the Text2Everything client.
#[derive(Clone)]
pub struct ClientConfig {
    /// Service base URL (e.g., `https://t2e.example.com`).
    pub(crate) base_url: String,

    /// Bearer token sent on every request.
    pub(crate) access_token: String,

    /// Workspace the requests act on (`workspaces/<name>`).
    pub(crate) workspace_name: String,

    /// Request timeout.
    pub(crate) timeout: Duration,

    /// Connection timeout.
    pub(crate) connect_timeout: Duration,

    /// Retry policy for transient failures.
    pub(crate) retry_policy: RetryPolicy,

    /// Bulk submission defaults.
    pub(crate) bulk: BulkConfig,

    /// Value of the `User-Agent` header.
    pub(crate) user_agent: String,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("access_token", &"<redacted>")
            .field("workspace_name", &self.workspace_name)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("retry_policy", &self.retry_policy)
            .field("bulk", &self.bulk)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl ClientConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Returns the service base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the bearer token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the workspace name.
    #[must_use]
    pub fn workspace_name(&self) -> &str {
        &self.workspace_name
    }

    /// Returns the request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the connection timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Returns the bulk submission defaults.
    #[must_use]
    pub fn bulk(&self) -> &BulkConfig {
        &self.bulk
    }

    /// Returns the `User-Agent` header value.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    base_url: Option<String>,
    access_token: Option<String>,
    workspace_name: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    retry_policy: Option<RetryPolicy>,
    bulk: Option<BulkConfig>,
    user_agent: Option<String>,
}

impl ClientConfigBuilder {
    /// Sets the service base URL.
    ///
    /// Default: [`DEFAULT_BASE_URL`].
    #[must_use]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_access_token<S: Into<String>>(mut self, token: S) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Sets the workspace name. Must start with `workspaces/`.
    #[must_use]
    pub fn with_workspace_name<S: Into<String>>(mut self, workspace_name: S) -> Self {
        self.workspace_name = Some(workspace_name.into());
        self
    }

    /// Sets the request timeout.
    ///
    /// Default: 180 seconds.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the connection timeout.
    ///
    /// Default: 30 seconds.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the retry policy.
    ///
    /// Default: [`RetryPolicy::default()`].
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Sets the bulk submission defaults.
    ///
    /// Default: [`BulkConfig::default()`].
    #[must_use]
    pub fn with_bulk(mut self, bulk: BulkConfig) -> Self {
        self.bulk = Some(bulk);
        self
    }

    /// Overrides the `User-Agent` header.
    #[must_use]
    pub fn with_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Builds the configuration, validating all settings.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The base URL is invalid
    /// - The access token is missing or empty
    /// - The workspace name is missing or lacks the `workspaces/` prefix
    /// - Either timeout is zero
    /// - The retry policy allows zero attempts
    pub fn build(self) -> Result<ClientConfig> {
        let base_url = self.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        validate_url(&base_url)?;

        let access_token = self
            .access_token
            .ok_or_else(|| ConfigSnafu { message: "access_token is required" }.build())?;
        ensure!(
            !access_token.trim().is_empty(),
            ConfigSnafu { message: "access_token cannot be empty" }
        );

        let workspace_name = self
            .workspace_name
            .ok_or_else(|| ConfigSnafu { message: "workspace_name is required" }.build())?;
        ensure!(
            workspace_name.starts_with(WORKSPACE_PREFIX)
                && workspace_name.len() > WORKSPACE_PREFIX.len(),
            ConfigSnafu {
                message: format!(
                    "workspace_name must start with '{WORKSPACE_PREFIX}', got '{workspace_name}'"
                )
            }
        );

        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        ensure!(!timeout.is_zero(), ConfigSnafu { message: "timeout cannot be zero" });

        let connect_timeout = self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        ensure!(
            !connect_timeout.is_zero(),
            ConfigSnafu { message: "connect_timeout cannot be zero" }
        );

        let retry_policy = self.retry_policy.unwrap_or_default();
        ensure!(
            retry_policy.max_attempts > 0,
            ConfigSnafu { message: "retry_policy.max_attempts must be at least 1" }
        );

        Ok(ClientConfig {
            base_url: base_url.trim_end_matches('/').to_owned(),
            access_token,
            workspace_name,
            timeout,
            connect_timeout,
            retry_policy,
            bulk: self.bulk.unwrap_or_default(),
            user_agent: self.user_agent.unwrap_or_else(default_user_agent),
        })
    }
}

fn default_user_agent() -> String {
    format!("text2everything-sdk-rust/{}", env!("CARGO_PKG_VERSION"))
}

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    pub max_attempts: u32,

    /// Initial backoff duration before first retry.
    pub initial_backoff: Duration,

    /// Maximum backoff duration.
    pub max_backoff: Duration,

    /// Backoff multiplier for exponential increase.
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0) for randomizing backoff.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy builder.
    #[must_use]
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// Creates a policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, ..Default::default() }
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Default)]
pub struct RetryPolicyBuilder {
    max_attempts: Option<u32>,
    initial_backoff: Option<Duration>,
    max_backoff: Option<Duration>,
    multiplier: Option<f64>,
    jitter: Option<f64>,
}

impl RetryPolicyBuilder {
    /// Sets the maximum number of attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Sets the number of retries after the first attempt.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_attempts = Some(retries.saturating_add(1));
        self
    }

    /// Sets the initial backoff duration.
    #[must_use]
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = Some(backoff);
        self
    }

    /// Sets the maximum backoff duration.
    #[must_use]
    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = Some(backoff);
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Sets the jitter factor (0.0 to 1.0).
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Builds the retry policy.
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            initial_backoff: self.initial_backoff.unwrap_or(defaults.initial_backoff),
            max_backoff: self.max_backoff.unwrap_or(defaults.max_backoff),
            multiplier: self.multiplier.unwrap_or(defaults.multiplier),
            jitter: self.jitter.unwrap_or(defaults.jitter),
        }
    }
}

/// How a bulk call reaches the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BulkStrategy {
    /// One request to the bulk endpoint, falling back to per-item requests
    /// when the whole submission fails.
    #[default]
    BulkEndpoint,
    /// Skip the bulk endpoint and submit each input on its own.
    PerItem,
}

/// Settings for bulk create operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkConfig {
    /// Cap on simultaneous per-item requests.
    pub max_concurrent_requests: usize,

    /// Submission strategy.
    pub strategy: BulkStrategy,

    /// Validate inputs locally before any request is sent.
    pub validate: bool,

    /// Submit the first per-item input alone before dispatching the rest.
    pub warm_first_item: bool,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            strategy: BulkStrategy::default(),
            validate: true,
            warm_first_item: false,
        }
    }
}

#[bon::bon]
impl BulkConfig {
    /// Creates a bulk configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Config`] if `max_concurrent_requests` is zero.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_MAX_CONCURRENT_REQUESTS)] max_concurrent_requests: usize,
        #[builder(default)] strategy: BulkStrategy,
        #[builder(default = true)] validate: bool,
        #[builder(default = false)] warm_first_item: bool,
    ) -> std::result::Result<Self, SdkError> {
        ensure!(
            max_concurrent_requests > 0,
            ConfigSnafu { message: "max_concurrent_requests must be at least 1" }
        );
        Ok(Self { max_concurrent_requests, strategy, validate, warm_first_item })
    }
}

/// Validates that a URL is well-formed HTTP(S).
fn validate_url(url: &str) -> Result<()> {
    let Some(rest) = url.strip_prefix("http://").or_else(|| url.strip_prefix("https://")) else {
        return InvalidUrlSnafu { url, message: "URL must start with http:// or https://" }.fail();
    };

    if rest.trim_end_matches('/').is_empty() {
        return InvalidUrlSnafu { url, message: "URL must have a host" }.fail();
    }

    if rest.contains(char::is_whitespace) {
        return InvalidUrlSnafu { url, message: "URL cannot contain whitespace" }.fail();
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn base() -> ClientConfigBuilder {
        ClientConfig::builder()
            .with_base_url("https://t2e.example.com/")
            .with_access_token("token-123")
            .with_workspace_name("workspaces/dev")
    }

    #[test]
    fn test_valid_config() {
        let config = base().build().unwrap();
        assert_eq!(config.base_url(), "https://t2e.example.com");
        assert_eq!(config.workspace_name(), "workspaces/dev");
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(config.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.bulk(), &BulkConfig::default());
        assert!(config.user_agent().starts_with("text2everything-sdk-rust/"));
    }

    #[test]
    fn test_default_base_url() {
        let config = ClientConfig::builder()
            .with_access_token("t")
            .with_workspace_name("workspaces/dev")
            .build()
            .unwrap();
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_missing_access_token() {
        let err = ClientConfig::builder()
            .with_workspace_name("workspaces/dev")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("access_token"));
    }

    #[test]
    fn test_workspace_prefix_required() {
        let err = base().with_workspace_name("dev").build().unwrap_err();
        assert!(matches!(err, SdkError::Config { .. }));
        assert!(err.to_string().contains("workspaces/"));

        let err = base().with_workspace_name("workspaces/").build().unwrap_err();
        assert!(matches!(err, SdkError::Config { .. }));
    }

    #[test]
    fn test_invalid_url() {
        let err = base().with_base_url("ftp://t2e").build().unwrap_err();
        assert!(matches!(err, SdkError::InvalidUrl { .. }));

        let err = base().with_base_url("http://").build().unwrap_err();
        assert!(err.to_string().contains("host"));

        let err = base().with_base_url("http://bad host").build().unwrap_err();
        assert!(err.to_string().contains("whitespace"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(base().with_timeout(Duration::ZERO).build().is_err());
        assert!(base().with_connect_timeout(Duration::ZERO).build().is_err());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let policy = RetryPolicy::builder().with_max_attempts(0).build();
        assert!(base().with_retry_policy(policy).build().is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = base().build().unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("token-123"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_retry_policy_builder() {
        let policy = RetryPolicy::builder()
            .with_max_retries(2)
            .with_initial_backoff(Duration::from_millis(5))
            .with_jitter(0.0)
            .build();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_backoff, Duration::from_millis(5));
        assert_eq!(policy.max_backoff, RetryPolicy::default().max_backoff);
        assert_eq!(RetryPolicy::no_retry().max_attempts, 1);
    }

    #[test]
    fn test_bulk_config_builder() {
        let bulk = BulkConfig::builder()
            .max_concurrent_requests(3)
            .strategy(BulkStrategy::PerItem)
            .build()
            .unwrap();
        assert_eq!(bulk.max_concurrent_requests, 3);
        assert_eq!(bulk.strategy, BulkStrategy::PerItem);
        assert!(bulk.validate);
        assert!(!bulk.warm_first_item);

        assert_eq!(BulkConfig::builder().build().unwrap(), BulkConfig::default());
    }

    #[test]
    fn test_bulk_config_rejects_zero_concurrency() {
        let err = BulkConfig::builder().max_concurrent_requests(0).build().unwrap_err();
        assert!(err.to_string().contains("max_concurrent_requests"));
    }
}
