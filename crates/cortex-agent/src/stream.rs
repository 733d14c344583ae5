use futures_util::{Stream, StreamExt};
use serde::Serialize;

use crate::event::NormalizedEvent;
use crate::extract::extract_content;

/// Unit yielded to the caller of a streaming run.
///
/// At most one `Final` or `Error` ends a run; `Content` and `Event` chunks
/// may precede it any number of times.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Raw normalized event. Only emitted when the caller opts in.
    Event { event: NormalizedEvent },
    /// Incremental text from a non-terminal event.
    Content { content: String },
    /// Complete answer from the terminal `response` event.
    Final { content: String },
    Error { error: String },
}

impl StreamChunk {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamChunk::Final { .. } | StreamChunk::Error { .. })
    }
}

/// Map one event to its content chunk. `None` when it carries no text.
pub fn classify(event: &NormalizedEvent) -> Option<StreamChunk> {
    let content = extract_content(event);
    if content.is_empty() {
        return None;
    }
    if event.kind().is_terminal() {
        Some(StreamChunk::Final { content })
    } else {
        Some(StreamChunk::Content { content })
    }
}

/// How a streaming run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// A `final` chunk arrived.
    Completed,
    /// The stream closed without a terminal `response` event; only the
    /// incremental content is available. Treated as success-with-partial-content.
    Partial,
    /// An `error` chunk ended the run.
    Failed,
}

/// Everything observed from one streaming run, folded chunk by chunk.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Concatenated `content` chunks.
    pub streamed: String,
    pub final_text: Option<String>,
    pub error: Option<String>,
    pub events: Vec<NormalizedEvent>,
}

impl RunSummary {
    pub fn observe(&mut self, chunk: &StreamChunk) {
        match chunk {
            StreamChunk::Event { event } => self.events.push(event.clone()),
            StreamChunk::Content { content } => self.streamed.push_str(content),
            StreamChunk::Final { content } => self.final_text = Some(content.clone()),
            StreamChunk::Error { error } => self.error = Some(error.clone()),
        }
    }

    /// Drain a chunk stream to the end.
    pub async fn collect<S>(chunks: S) -> Self
    where
        S: Stream<Item = StreamChunk>,
    {
        futures_util::pin_mut!(chunks);
        let mut summary = Self::default();
        while let Some(chunk) = chunks.next().await {
            summary.observe(&chunk);
        }
        summary
    }

    pub fn outcome(&self) -> RunOutcome {
        if self.error.is_some() {
            RunOutcome::Failed
        } else if self.final_text.is_some() {
            RunOutcome::Completed
        } else {
            RunOutcome::Partial
        }
    }

    /// The best answer available: the final text, else what streamed in.
    pub fn answer(&self) -> &str {
        self.final_text.as_deref().unwrap_or(&self.streamed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: serde_json::Value) -> NormalizedEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn classify_delta_as_content() {
        let chunk = classify(&event(json!({"event": "response.text.delta", "text": "Hi"})));
        assert_eq!(chunk, Some(StreamChunk::Content { content: "Hi".into() }));
    }

    #[test]
    fn classify_response_as_final() {
        let chunk = classify(&event(json!({
            "event": "response",
            "content": [{"type": "text", "text": "Hi there"}]
        })));
        assert_eq!(chunk, Some(StreamChunk::Final { content: "Hi there".into() }));
    }

    #[test]
    fn classify_skips_empty() {
        assert_eq!(classify(&event(json!({"event": "response.status", "message": "x"}))), None);
        assert_eq!(classify(&event(json!({"event": "response", "content": []}))), None);
    }

    #[test]
    fn chunk_wire_shape() {
        let v = serde_json::to_value(StreamChunk::Error { error: "HTTP 503: down".into() }).unwrap();
        assert_eq!(v, json!({"type": "error", "error": "HTTP 503: down"}));
        let v = serde_json::to_value(StreamChunk::Final { content: "A".into() }).unwrap();
        assert_eq!(v, json!({"type": "final", "content": "A"}));
    }

    #[tokio::test]
    async fn summary_outcomes() {
        let done = RunSummary::collect(futures_util::stream::iter(vec![
            StreamChunk::Content { content: "Hi".into() },
            StreamChunk::Final { content: "Hi there".into() },
        ]))
        .await;
        assert_eq!(done.outcome(), RunOutcome::Completed);
        assert_eq!(done.answer(), "Hi there");

        let partial = RunSummary::collect(futures_util::stream::iter(vec![
            StreamChunk::Content { content: "Hi".into() },
            StreamChunk::Content { content: " th".into() },
        ]))
        .await;
        assert_eq!(partial.outcome(), RunOutcome::Partial);
        assert_eq!(partial.answer(), "Hi th");

        let failed = RunSummary::collect(futures_util::stream::iter(vec![StreamChunk::Error {
            error: "boom".into(),
        }]))
        .await;
        assert_eq!(failed.outcome(), RunOutcome::Failed);
    }
}
