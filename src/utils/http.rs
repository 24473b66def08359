//! HTTP client utilities shared by all source adapters.
//!
//! Per-source request pacing lives in [`crate::utils::RateLimiterRegistry`];
//! this client stays a thin, proxy-aware wrapper around `reqwest` so the
//! worker pool is the single place that decides when a request is allowed
//! to go out.

use reqwest::{header, Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;

use crate::sources::SourceError;

/// Environment variable for custom user agent
const USER_AGENT_ENV_VAR: &str = "LITREVIEW_USER_AGENT";

/// Environment variable for HTTP proxy
const HTTP_PROXY_ENV_VAR: &str = "HTTP_PROXY";

/// Environment variable for HTTPS proxy
const HTTPS_PROXY_ENV_VAR: &str = "HTTPS_PROXY";

/// Environment variable for no proxy (comma-separated list of hosts to bypass proxy)
const NO_PROXY_ENV_VAR: &str = "NO_PROXY";

/// Proxy configuration
#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub no_proxy: Option<Vec<String>>,
}

impl ProxyConfig {
    /// Merge CLI-provided proxy settings with this config.
    /// CLI settings take precedence over existing config values.
    pub fn with_cli_args(
        mut self,
        http_proxy: Option<String>,
        https_proxy: Option<String>,
        no_proxy: Option<String>,
    ) -> Self {
        if http_proxy.is_some() {
            self.http_proxy = http_proxy;
        }
        if https_proxy.is_some() {
            self.https_proxy = https_proxy;
        }
        if let Some(no_proxy_str) = no_proxy {
            self.no_proxy = Some(no_proxy_str.split(',').map(|s| s.trim().to_string()).collect());
        }
        self
    }
}

/// Create proxy configuration from environment variables
pub fn create_proxy_config() -> ProxyConfig {
    let http_proxy = std::env::var(HTTP_PROXY_ENV_VAR).ok();
    let https_proxy = std::env::var(HTTPS_PROXY_ENV_VAR).ok();
    let no_proxy: Option<Vec<String>> = std::env::var(NO_PROXY_ENV_VAR)
        .ok()
        .map(|s| s.split(',').map(|v| v.trim().to_string()).collect());

    if http_proxy.is_some() || https_proxy.is_some() {
        tracing::info!(
            "Proxy configured: HTTP={:?}, HTTPS={:?}, NO_PROXY={:?}",
            http_proxy,
            https_proxy,
            no_proxy
        );
    }

    ProxyConfig {
        http_proxy,
        https_proxy,
        no_proxy,
    }
}

/// Create proxy configuration from CLI arguments.
/// CLI args take precedence over environment variables.
pub fn create_proxy_config_from_cli(
    http_proxy: Option<String>,
    https_proxy: Option<String>,
    no_proxy: Option<String>,
) -> ProxyConfig {
    let env_config = create_proxy_config();
    env_config.with_cli_args(http_proxy, https_proxy, no_proxy)
}

/// Apply CLI proxy arguments to environment variables so every client built
/// afterward (including inside source adapters) picks them up uniformly.
pub fn apply_cli_proxy_args(http_proxy: Option<String>, https_proxy: Option<String>, no_proxy: Option<String>) {
    if let Some(http) = http_proxy {
        std::env::set_var(HTTP_PROXY_ENV_VAR, http);
    }
    if let Some(https) = https_proxy {
        std::env::set_var(HTTPS_PROXY_ENV_VAR, https);
    }
    if let Some(no_proxy_val) = no_proxy {
        std::env::set_var(NO_PROXY_ENV_VAR, no_proxy_val);
    }
}

/// Check if a URL should bypass the proxy
fn should_bypass_proxy(url: &str, no_proxy: &Option<Vec<String>>) -> bool {
    let Some(hosts) = no_proxy else {
        return false;
    };

    if hosts.iter().any(|h| h == "*") {
        return true;
    }

    if let Ok(url) = reqwest::Url::parse(url) {
        if let Some(host) = url.host_str().map(|h| h.to_lowercase()) {
            for no_proxy_host in hosts {
                if host == no_proxy_host.to_lowercase() {
                    return true;
                }
                if host.ends_with(&format!(".{}", no_proxy_host.to_lowercase())) {
                    return true;
                }
            }
        }
    }

    false
}

/// Shared HTTP client with sensible defaults and proxy support.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Arc<Client>,
    no_proxy: Option<Vec<String>>,
}

/// Thin wrapper around `reqwest::RequestBuilder` kept for call-site symmetry
/// across adapters; carries no state of its own beyond the inner builder.
pub struct RateLimitedRequestBuilder {
    inner: reqwest::RequestBuilder,
}

impl RateLimitedRequestBuilder {
    pub async fn send(self) -> Result<reqwest::Response, reqwest::Error> {
        self.inner.send().await
    }

    /// Add a header (accepts &str for convenience - most common use case)
    pub fn header<K, V>(mut self, key: K, value: V) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.inner = self.inner.header(key.as_ref(), value.as_ref());
        self
    }

    pub fn headers(mut self, headers: header::HeaderMap) -> Self {
        self.inner = self.inner.headers(headers);
        self
    }

    pub fn basic_auth<U, P>(self, username: U, password: Option<P>) -> Self
    where
        U: Into<String> + std::fmt::Display,
        P: Into<String> + std::fmt::Display,
    {
        Self {
            inner: self.inner.basic_auth(username, password),
        }
    }

    pub fn bearer_auth<T>(self, token: T) -> Self
    where
        T: Into<String> + std::fmt::Display,
    {
        Self {
            inner: self.inner.bearer_auth(token),
        }
    }

    pub fn query<T: serde::Serialize + ?Sized>(mut self, query: &T) -> Self {
        self.inner = self.inner.query(query);
        self
    }

    pub fn json<T: serde::Serialize + ?Sized>(mut self, json: &T) -> Self {
        self.inner = self.inner.json(json);
        self
    }

    pub fn build(self) -> Result<reqwest::Request, reqwest::Error> {
        self.inner.build()
    }
}

/// Get user agent from environment or use default
pub fn get_user_agent() -> String {
    std::env::var(USER_AGENT_ENV_VAR)
        .unwrap_or_else(|_| format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")))
}

impl HttpClient {
    /// Create a new HTTP client with default settings.
    pub fn new(user_agent: &str) -> Result<Self, SourceError> {
        Self::with_timeout(user_agent, 30)
    }

    /// Create a new HTTP client with a custom timeout.
    pub fn with_timeout(user_agent: &str, timeout_secs: u64) -> Result<Self, SourceError> {
        let proxy = create_proxy_config();

        let mut builder = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90));

        if let Some(proxy_url) = proxy.http_proxy {
            builder = builder.proxy(reqwest::Proxy::http(&proxy_url)?);
        }
        if let Some(proxy_url) = proxy.https_proxy {
            builder = builder.proxy(reqwest::Proxy::https(&proxy_url)?);
        }

        let client = builder
            .build()
            .map_err(|e| SourceError::Network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
            no_proxy: proxy.no_proxy,
        })
    }

    /// Alias kept for adapter call-site clarity: request pacing lives in the
    /// rate limiter registry, not in this client, so there is nothing to
    /// disable here — this simply constructs a client with the default
    /// user agent.
    pub fn without_rate_limit(user_agent: &str) -> Result<Self, SourceError> {
        Self::new(user_agent)
    }

    /// Create HTTP client with per-source proxy overrides.
    pub fn with_proxy(
        user_agent: &str,
        http_proxy: Option<String>,
        https_proxy: Option<String>,
    ) -> Result<Self, SourceError> {
        let mut builder = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90));

        if let Some(proxy_url) = http_proxy {
            builder = builder.proxy(reqwest::Proxy::http(&proxy_url)?);
        }
        if let Some(proxy_url) = https_proxy {
            builder = builder.proxy(reqwest::Proxy::https(&proxy_url)?);
        }

        let client = builder
            .build()
            .map_err(|e| SourceError::Network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
            no_proxy: None,
        })
    }

    /// Create from an existing reqwest Client.
    pub fn from_client(client: Arc<Client>) -> Self {
        Self {
            client,
            no_proxy: None,
        }
    }

    /// Check if a URL should bypass the proxy
    pub fn should_bypass_proxy(&self, url: &str) -> bool {
        should_bypass_proxy(url, &self.no_proxy)
    }

    /// Get the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn get(&self, url: &str) -> RateLimitedRequestBuilder {
        RateLimitedRequestBuilder {
            inner: self.client.get(url),
        }
    }

    pub fn post(&self, url: &str) -> RateLimitedRequestBuilder {
        RateLimitedRequestBuilder {
            inner: self.client.post(url),
        }
    }

    /// Check if a URL returns success status
    pub async fn head(&self, url: &str) -> Result<bool, SourceError> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| SourceError::Network(format!("head request failed: {}", e)))?;
        Ok(response.status() == StatusCode::OK)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(&get_user_agent()).expect("failed to create default HTTP client")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_bypass_proxy_no_config() {
        let result = should_bypass_proxy("https://api.semanticscholar.org", &None);
        assert!(!result, "should not bypass when no no_proxy configured");
    }

    #[test]
    fn test_should_bypass_proxy_wildcard() {
        let no_proxy = Some(vec!["*".to_string()]);
        let result = should_bypass_proxy("https://api.semanticscholar.org", &no_proxy);
        assert!(result, "should bypass for wildcard");
    }

    #[test]
    fn test_should_bypass_proxy_exact_match() {
        let no_proxy = Some(vec!["api.semanticscholar.org".to_string()]);
        let result = should_bypass_proxy("https://api.semanticscholar.org", &no_proxy);
        assert!(result, "should bypass for exact match");
    }

    #[test]
    fn test_should_bypass_proxy_domain_suffix() {
        let no_proxy = Some(vec!["semanticscholar.org".to_string()]);
        let result = should_bypass_proxy("https://api.semanticscholar.org", &no_proxy);
        assert!(result, "should bypass for domain suffix match");
    }

    #[test]
    fn test_should_bypass_proxy_no_match() {
        let no_proxy = Some(vec!["other-domain.org".to_string()]);
        let result = should_bypass_proxy("https://api.semanticscholar.org", &no_proxy);
        assert!(!result, "should not bypass when domain doesn't match");
    }

    #[test]
    fn test_should_bypass_proxy_multiple_hosts() {
        let no_proxy = Some(vec![
            "api.semanticscholar.org".to_string(),
            "arxiv.org".to_string(),
        ]);
        assert!(should_bypass_proxy("https://api.semanticscholar.org", &no_proxy));
        assert!(should_bypass_proxy("https://arxiv.org", &no_proxy));
        assert!(!should_bypass_proxy("https://openalex.org", &no_proxy));
    }
}
