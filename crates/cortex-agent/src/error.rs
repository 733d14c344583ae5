use cortex_core::config::MAX_ERROR_BODY_CHARS;

/// Which phase of an HTTP exchange ran out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    Connect,
    Read,
}

impl std::fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect => f.write_str("connect"),
            Self::Read => f.write_str("read"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Connection refused, DNS failure, TLS failure.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("{phase} timeout: {detail}")]
    Timeout { phase: TimeoutPhase, detail: String },

    /// Non-2xx response. `body` is already truncated.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Response body was not the JSON shape we expected.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("client configuration error: {0}")]
    Config(String),
}

impl AgentError {
    pub fn http_status(status: u16, body: &str) -> Self {
        Self::HttpStatus {
            status,
            body: truncate_body(body),
        }
    }

    /// Short error code string for logs and callers that branch on kind.
    pub fn code(&self) -> &'static str {
        match self {
            AgentError::Transport(_) => "TRANSPORT_ERROR",
            AgentError::Timeout { .. } => "TIMEOUT",
            AgentError::HttpStatus { .. } => "HTTP_STATUS",
            AgentError::Decode(_) => "DECODE_ERROR",
            AgentError::Config(_) => "CONFIG_ERROR",
        }
    }

    pub fn is_read_timeout(&self) -> bool {
        matches!(
            self,
            AgentError::Timeout {
                phase: TimeoutPhase::Read,
                ..
            }
        )
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            let phase = if e.is_connect() {
                TimeoutPhase::Connect
            } else {
                TimeoutPhase::Read
            };
            return AgentError::Timeout {
                phase,
                detail: e.to_string(),
            };
        }
        if let Some(status) = e.status() {
            return AgentError::http_status(status.as_u16(), &e.to_string());
        }
        if e.is_decode() {
            return AgentError::Decode(e.to_string());
        }
        AgentError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::Decode(e.to_string())
    }
}

/// Cap an error body at `MAX_ERROR_BODY_CHARS` characters (not bytes).
pub fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((idx, _)) => body[..idx].to_string(),
        None => body.to_string(),
    }
}
