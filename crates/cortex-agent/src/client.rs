use std::sync::Mutex;

use cortex_core::config::ConnectionConfig;
use tracing::error;

use crate::error::AgentError;
use crate::transport::{ClientConfig, Transport};

/// Client for the Cortex Agent REST API: thread CRUD plus agent runs.
///
/// Thread operations never return errors; they log, remember the failure
/// (see [`last_error`](Self::last_error)) and return an empty result. Runs
/// report failures inline as an `error` chunk.
pub struct CortexAgentClient {
    pub(crate) transport: Transport,
    last_error: Mutex<Option<String>>,
}

impl CortexAgentClient {
    pub fn new(config: ClientConfig) -> Result<Self, AgentError> {
        Ok(Self {
            transport: Transport::new(config)?,
            last_error: Mutex::new(None),
        })
    }

    pub fn from_connection(connection: &ConnectionConfig) -> Result<Self, AgentError> {
        Self::new(ClientConfig::from(connection))
    }

    pub fn config(&self) -> &ClientConfig {
        self.transport.config()
    }

    /// Most recent failure recorded by any operation on this client.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|slot| slot.clone())
    }

    pub(crate) fn record_error(&self, message: impl Into<String>) {
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = Some(message.into());
        }
    }

    /// Log and record a failed thread operation, then hand back `fallback`.
    pub(crate) fn fail<T>(&self, op: &'static str, err: AgentError, fallback: T) -> T {
        let message = err.to_string();
        error!(op, code = err.code(), error = %message, "thread operation failed");
        self.record_error(message);
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_error_starts_empty_and_keeps_latest() {
        let client = CortexAgentClient::new(ClientConfig::new("acct", "tok")).unwrap();
        assert_eq!(client.last_error(), None);
        client.record_error("first");
        client.record_error("second");
        assert_eq!(client.last_error().as_deref(), Some("second"));
    }

    #[test]
    fn fail_returns_fallback() {
        let client = CortexAgentClient::new(ClientConfig::new("acct", "tok")).unwrap();
        let got = client.fail("delete_thread", AgentError::http_status(404, "gone"), false);
        assert!(!got);
        assert_eq!(client.last_error().as_deref(), Some("HTTP 404: gone"));
    }
}
