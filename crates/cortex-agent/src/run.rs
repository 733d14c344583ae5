use cortex_core::config::API_PREFIX;
use futures_util::{Stream, StreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::client::CortexAgentClient;
use crate::error::AgentError;
use crate::event::NormalizedEvent;
use crate::extract::extract_content;
use crate::message::AgentMessage;
use crate::sse::decode_events;
use crate::stream::{classify, StreamChunk};
use crate::transport::{Call, TimeoutPolicy};

/// `tool_choice` as the run endpoint expects it, e.g. `{"type": "auto"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolChoice {
    #[serde(rename = "type")]
    pub kind: String,
    /// Tool names, only meaningful when `kind` is `tool`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name: Vec<String>,
}

impl ToolChoice {
    pub fn auto() -> Self {
        Self::of_kind("auto")
    }

    pub fn of_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: Vec::new(),
        }
    }
}

/// One agent run: which agent, what to send, and which thread to continue.
#[derive(Debug, Clone)]
pub struct AgentRunRequest {
    pub database: String,
    pub schema: String,
    pub agent_name: String,
    pub messages: Vec<AgentMessage>,
    pub thread_id: Option<String>,
    pub parent_message_id: Option<String>,
    pub tool_choice: Option<ToolChoice>,
}

impl AgentRunRequest {
    pub fn new(
        database: impl Into<String>,
        schema: impl Into<String>,
        agent_name: impl Into<String>,
        messages: Vec<AgentMessage>,
    ) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
            agent_name: agent_name.into(),
            messages,
            thread_id: None,
            parent_message_id: None,
            tool_choice: None,
        }
    }

    pub fn in_thread(
        mut self,
        thread_id: Option<String>,
        parent_message_id: Option<String>,
    ) -> Self {
        self.thread_id = thread_id;
        self.parent_message_id = parent_message_id;
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: Option<ToolChoice>) -> Self {
        self.tool_choice = tool_choice;
        self
    }

    /// True when both thread and parent ids are set: the run continues a thread.
    pub fn continues_thread(&self) -> bool {
        self.thread_id.is_some() && self.parent_message_id.is_some()
    }

    pub fn path(&self) -> String {
        format!(
            "{API_PREFIX}/databases/{}/schemas/{}/agents/{}:run",
            self.database, self.schema, self.agent_name
        )
    }

    /// Request body. Thread ids are sent only as a pair; the messages are sent
    /// exactly as given, never padded with earlier history.
    pub fn payload(&self) -> Value {
        let mut body = json!({ "messages": self.messages });
        if let Some(ref tool_choice) = self.tool_choice {
            body["tool_choice"] = json!(tool_choice);
        }
        if let (Some(thread_id), Some(parent)) = (&self.thread_id, &self.parent_message_id) {
            body["thread_id"] = json!(thread_id);
            body["parent_message_id"] = json!(parent);
        }
        body
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
}

/// Result of a buffered (non chunk-by-chunk) run.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRunResult {
    pub status: RunStatus,
    /// Every extracted content fragment, in block order.
    pub response: String,
    /// Every normalized event, in order. Empty for non-streaming runs.
    pub events: Vec<NormalizedEvent>,
    /// Raw response body of a non-streaming run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentRunResult {
    fn failed(error: String) -> Self {
        Self {
            status: RunStatus::Error,
            response: String::new(),
            events: Vec::new(),
            json: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

impl CortexAgentClient {
    /// Run the agent and stream its answer.
    ///
    /// Nothing is sent until the returned stream is first polled. Dropping the
    /// stream early releases the connection. The stream ends after the first
    /// `final` or `error` chunk, or when the server closes the connection; in
    /// the last case no `final` is synthesized.
    pub fn run_agent_stream(
        &self,
        request: AgentRunRequest,
        yield_events: bool,
    ) -> impl Stream<Item = StreamChunk> + '_ {
        async_stream::stream! {
            let path = request.path();
            let payload = request.payload();
            info!(
                agent = %request.agent_name,
                messages = request.messages.len(),
                continues_thread = request.continues_thread(),
                "starting streaming agent run"
            );

            let call = Call::post(&path, &payload)
                .timeout(TimeoutPolicy::Paired)
                .event_stream();
            let resp = match self.transport.send(call).await {
                Ok(resp) => resp,
                Err(e) => {
                    yield StreamChunk::Error { error: self.stream_failure(&e) };
                    return;
                }
            };

            if resp.status() != StatusCode::OK {
                let error = status_error(resp).await.to_string();
                self.record_error(error.clone());
                yield StreamChunk::Error { error };
                return;
            }

            let events = decode_events(resp.bytes_stream());
            futures_util::pin_mut!(events);
            while let Some(item) = events.next().await {
                let event = match item {
                    Ok(event) => event,
                    Err(e) => {
                        yield StreamChunk::Error { error: self.stream_failure(&AgentError::from(e)) };
                        return;
                    }
                };
                debug!(event = event.name().unwrap_or("<unnamed>"), "stream event");

                if yield_events {
                    yield StreamChunk::Event { event: event.clone() };
                }
                match classify(&event) {
                    Some(chunk @ StreamChunk::Final { .. }) => {
                        info!(agent = %request.agent_name, "agent run completed");
                        yield chunk;
                        return;
                    }
                    Some(chunk) => {
                        yield chunk;
                    }
                    None => {}
                }
            }
            warn!(agent = %request.agent_name, "stream closed without a final response");
        }
    }

    /// Run the agent and wait for the whole answer.
    ///
    /// With `stream` the run still goes over SSE, but every event is collected
    /// and all extracted content (incremental and terminal) is concatenated in
    /// block order. Without it a plain JSON response is requested.
    pub async fn run_agent(&self, request: &AgentRunRequest, stream: bool) -> AgentRunResult {
        let result = if stream {
            self.run_buffered_sse(request).await
        } else {
            self.run_json(request).await
        };
        result.unwrap_or_else(|e| {
            let message = e.to_string();
            warn!(agent = %request.agent_name, error = %message, "agent run failed");
            self.record_error(message.clone());
            AgentRunResult::failed(message)
        })
    }

    async fn run_buffered_sse(&self, request: &AgentRunRequest) -> Result<AgentRunResult, AgentError> {
        let path = request.path();
        let payload = request.payload();
        let call = Call::post(&path, &payload).event_stream();
        let resp = self.transport.send(call).await?;
        if resp.status() != StatusCode::OK {
            return Err(status_error(resp).await);
        }

        let mut response = String::new();
        let mut events = Vec::new();
        let decoded = decode_events(resp.bytes_stream());
        futures_util::pin_mut!(decoded);
        while let Some(item) = decoded.next().await {
            let event = item?;
            response.push_str(&extract_content(&event));
            events.push(event);
        }

        debug!(events = events.len(), len = response.len(), "buffered run collected");
        Ok(AgentRunResult {
            status: RunStatus::Success,
            response,
            events,
            json: None,
            error: None,
        })
    }

    async fn run_json(&self, request: &AgentRunRequest) -> Result<AgentRunResult, AgentError> {
        let path = request.path();
        let payload = request.payload();
        let resp = self.transport.request(Call::post(&path, &payload)).await?;
        let body: Value = resp.json().await?;
        let response = match &body {
            Value::Object(map) => extract_content(&NormalizedEvent::from_map(map.clone())),
            _ => String::new(),
        };
        Ok(AgentRunResult {
            status: RunStatus::Success,
            response,
            events: Vec::new(),
            json: Some(body),
            error: None,
        })
    }

    /// Format a transport failure for an `error` chunk and remember it.
    fn stream_failure(&self, err: &AgentError) -> String {
        let message = if err.is_read_timeout() {
            format!("Stream read timeout: {err}")
        } else {
            err.to_string()
        };
        warn!(code = err.code(), error = %message, "agent stream failed");
        self.record_error(message.clone());
        message
    }
}

async fn status_error(resp: reqwest::Response) -> AgentError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    AgentError::http_status(status, &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AgentRunRequest {
        AgentRunRequest::new("DB", "SCH", "AGENT", vec![AgentMessage::user("hi")])
    }

    #[test]
    fn path_targets_agent_run_endpoint() {
        assert_eq!(
            request().path(),
            "/api/v2/databases/DB/schemas/SCH/agents/AGENT:run"
        );
    }

    #[test]
    fn fresh_run_omits_thread_fields() {
        let body = request().payload();
        assert!(body.get("thread_id").is_none());
        assert!(body.get("parent_message_id").is_none());
        assert!(body.get("tool_choice").is_none());
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn thread_fields_only_sent_as_a_pair() {
        let half = request().in_thread(Some("t1".into()), None).payload();
        assert!(half.get("thread_id").is_none());
        assert!(half.get("parent_message_id").is_none());

        let half = request().in_thread(None, Some("5".into())).payload();
        assert!(half.get("parent_message_id").is_none());

        let both = request().in_thread(Some("t1".into()), Some("5".into()));
        assert!(both.continues_thread());
        let body = both.payload();
        assert_eq!(body["thread_id"], "t1");
        assert_eq!(body["parent_message_id"], "5");
    }

    #[test]
    fn continued_run_sends_only_given_messages() {
        // second turn on an existing thread: just the newest user message
        let body = AgentRunRequest::new("DB", "SCH", "AGENT", vec![AgentMessage::user("next?")])
            .in_thread(Some("t1".into()), Some("42".into()))
            .payload();
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["content"][0]["text"], "next?");
    }

    #[test]
    fn tool_choice_included_when_set() {
        let body = request().with_tool_choice(Some(ToolChoice::auto())).payload();
        assert_eq!(body["tool_choice"], json!({"type": "auto"}));
    }

    #[test]
    fn tool_choice_from_configured_kind() {
        let configured: Option<&str> = Some("auto");
        assert_eq!(configured.map(ToolChoice::of_kind), Some(ToolChoice::auto()));
        let body = request()
            .with_tool_choice(Some("required").map(ToolChoice::of_kind))
            .payload();
        assert_eq!(body["tool_choice"], json!({"type": "required"}));
    }
}
