use std::time::Duration;

use cortex_core::config::{
    ConnectionConfig, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS,
    DEFAULT_TIMEOUT_SECS,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use tracing::{debug, warn};

use crate::error::AgentError;

const EVENT_STREAM: &str = "text/event-stream";
const JSON: &str = "application/json";

/// Connection settings for one client. Immutable once the client is built.
#[derive(Clone)]
pub struct ClientConfig {
    base_url: String,
    auth_token: String,
    pub timeout: Duration,
    pub read_timeout: Duration,
    pub connect_timeout: Duration,
    pub verify_tls: bool,
}

impl ClientConfig {
    pub fn new(account_url: &str, auth_token: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(account_url),
            auth_token: auth_token.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            verify_tls: true,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn with_timeouts(mut self, timeout: Duration, read_timeout: Duration) -> Self {
        self.timeout = timeout;
        self.read_timeout = read_timeout;
        self
    }

    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }
}

impl From<&ConnectionConfig> for ClientConfig {
    fn from(c: &ConnectionConfig) -> Self {
        let mut config = ClientConfig::new(&c.account_url, c.auth_token.clone());
        config.timeout = Duration::from_secs(c.timeout_secs);
        config.read_timeout = Duration::from_secs(c.read_timeout_secs);
        config.connect_timeout = Duration::from_secs(c.connect_timeout_secs);
        config.verify_tls = c.verify_tls;
        config
    }
}

// Hand-written so the token never lands in logs.
impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("auth_token", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("read_timeout", &self.read_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("verify_tls", &self.verify_tls)
            .finish()
    }
}

/// Trim, add `https://` when no scheme is given, drop trailing slashes.
pub fn normalize_base_url(account_url: &str) -> String {
    let trimmed = account_url.trim();
    let with_scheme = if trimmed.is_empty()
        || trimmed.starts_with("http://")
        || trimmed.starts_with("https://")
    {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    with_scheme.trim_end_matches('/').to_string()
}

/// Timeout policy for a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// `timeout` for both the connect and read phases (create, buffered runs).
    Coarse,
    /// Short connect timeout paired with `read_timeout` (list, describe, streams).
    Paired,
}

/// One outgoing request, described before it is sent.
#[derive(Debug)]
pub struct Call<'a> {
    method: Method,
    path: &'a str,
    body: Option<&'a serde_json::Value>,
    query: Vec<(&'static str, String)>,
    timeout: TimeoutPolicy,
    event_stream: bool,
}

impl<'a> Call<'a> {
    fn new(method: Method, path: &'a str) -> Self {
        Self {
            method,
            path,
            body: None,
            query: Vec::new(),
            timeout: TimeoutPolicy::Paired,
            event_stream: false,
        }
    }

    pub fn get(path: &'a str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: &'a str) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn post(path: &'a str, body: &'a serde_json::Value) -> Self {
        let mut call = Self::new(Method::POST, path);
        call.body = Some(body);
        call.timeout = TimeoutPolicy::Coarse;
        call
    }

    pub fn query(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }

    pub fn timeout(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout = policy;
        self
    }

    /// Ask for `text/event-stream` instead of JSON.
    pub fn event_stream(mut self) -> Self {
        self.event_stream = true;
        self
    }
}

/// Authenticated HTTP session. Does not retry.
pub struct Transport {
    coarse: reqwest::Client,
    paired: reqwest::Client,
    config: ClientConfig,
}

impl Transport {
    pub fn new(config: ClientConfig) -> Result<Self, AgentError> {
        if config.base_url.is_empty() {
            return Err(AgentError::Config("account URL is empty".to_string()));
        }
        if !config.verify_tls {
            warn!(
                base_url = %config.base_url,
                "TLS certificate verification is DISABLED for this client"
            );
        }

        let headers = default_headers(&config.auth_token)?;
        let coarse = build_http(&config, headers.clone(), config.timeout, config.timeout)?;
        let paired = build_http(
            &config,
            headers,
            config.connect_timeout,
            config.read_timeout,
        )?;

        Ok(Self {
            coarse,
            paired,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Send a call and hand back the response whatever its status.
    pub async fn send(&self, call: Call<'_>) -> Result<reqwest::Response, AgentError> {
        let url = self.url(call.path);
        let http = match call.timeout {
            TimeoutPolicy::Coarse => &self.coarse,
            TimeoutPolicy::Paired => &self.paired,
        };

        debug!(method = %call.method, url = %url, stream = call.event_stream, "sending request");

        let mut builder = http.request(call.method, &url);
        if !call.query.is_empty() {
            builder = builder.query(&call.query);
        }
        if let Some(body) = call.body {
            builder = builder.json(body);
        }
        if call.event_stream {
            builder = builder.header(ACCEPT, EVENT_STREAM);
        }

        Ok(builder.send().await?)
    }

    /// Send a call and fail with `HttpStatus` on any non-2xx response.
    pub async fn request(&self, call: Call<'_>) -> Result<reqwest::Response, AgentError> {
        let resp = self.send(call).await?;
        ensure_success(resp).await
    }
}

/// Turn a non-2xx response into `AgentError::HttpStatus` with a truncated body.
pub async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, AgentError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp
        .text()
        .await
        .unwrap_or_else(|_| "<no body>".to_string());
    warn!(status, "Cortex API error");
    Err(AgentError::http_status(status, &body))
}

fn default_headers(token: &str) -> Result<HeaderMap, AgentError> {
    let mut headers = HeaderMap::new();
    let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| AgentError::Config(format!("invalid auth token: {e}")))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
    headers.insert(ACCEPT, HeaderValue::from_static(JSON));
    Ok(headers)
}

fn build_http(
    config: &ClientConfig,
    headers: HeaderMap,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<reqwest::Client, AgentError> {
    reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(connect_timeout)
        .read_timeout(read_timeout)
        .danger_accept_invalid_certs(!config.verify_tls)
        .build()
        .map_err(|e| AgentError::Config(e.to_string()))
}
