use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A decoded SSE frame: the JSON object from its `data:` lines, or a
/// `{data, event}` wrapper when the payload was not an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct NormalizedEvent(Map<String, Value>);

impl NormalizedEvent {
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Wrap a non-object payload under `data`, tagging it with the frame name.
    pub fn wrap(data: Value, name: Option<&str>) -> Self {
        let mut map = Map::new();
        map.insert("data".to_string(), data);
        if let Some(name) = name {
            map.insert("event".to_string(), Value::String(name.to_string()));
        }
        Self(map)
    }

    /// The semantic event name (`response.text.delta`, `response`, ...).
    pub fn name(&self) -> Option<&str> {
        self.str_field("event")
    }

    pub fn kind(&self) -> EventKind {
        self.name().map(EventKind::from_name).unwrap_or(EventKind::Unnamed)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// `message` of a `response.status` event.
    pub fn status_message(&self) -> Option<&str> {
        match self.kind() {
            EventKind::Status => self.str_field("message"),
            _ => None,
        }
    }

    /// `text` of a thinking event, whole or delta.
    pub fn thinking_text(&self) -> Option<&str> {
        match self.kind() {
            EventKind::Thinking | EventKind::ThinkingDelta => self.str_field("text"),
            _ => None,
        }
    }

    /// Progress line for tool activity, e.g. `Using tool: cortex_analyst_text_to_sql revenue`.
    pub fn tool_step(&self) -> Option<String> {
        match self.kind() {
            EventKind::ToolUse => {
                let tool_type = self
                    .str_field("type")
                    .or_else(|| self.str_field("tool_type"));
                let name = self.str_field("name");
                if tool_type.is_none() && name.is_none() {
                    return None;
                }
                let label = format!("{} {}", tool_type.unwrap_or(""), name.unwrap_or(""));
                Some(format!("Using tool: {}", label.trim()))
            }
            EventKind::ToolResultStatus => self
                .str_field("status")
                .or_else(|| self.str_field("message"))
                .map(|s| format!("Tool result: {s}")),
            _ => None,
        }
    }
}

/// Server-defined event names the client knows about. Unknown names are
/// still decoded and passed through as `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    TextDelta,
    Text,
    TextAnnotation,
    Thinking,
    ThinkingDelta,
    Status,
    ToolUse,
    ToolResultStatus,
    Table,
    Chart,
    Error,
    /// The terminal aggregate event, named exactly `response`.
    Response,
    Other(String),
    /// Neither the payload nor the frame carried a name.
    Unnamed,
}

impl EventKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "response.text.delta" => Self::TextDelta,
            "response.text" => Self::Text,
            "response.text.annotation" => Self::TextAnnotation,
            "response.thinking" => Self::Thinking,
            "response.thinking.delta" => Self::ThinkingDelta,
            "response.status" => Self::Status,
            "response.tool_use" => Self::ToolUse,
            "response.tool_result.status" => Self::ToolResultStatus,
            "response.table" => Self::Table,
            "response.chart" => Self::Chart,
            "error" => Self::Error,
            "response" => Self::Response,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: Value) -> NormalizedEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn kind_from_known_and_unknown_names() {
        assert_eq!(EventKind::from_name("response.text.delta"), EventKind::TextDelta);
        assert_eq!(EventKind::from_name("response"), EventKind::Response);
        assert_eq!(
            EventKind::from_name("response.suggested_queries"),
            EventKind::Other("response.suggested_queries".to_string())
        );
        assert!(EventKind::Response.is_terminal());
        assert!(!EventKind::Text.is_terminal());
    }

    #[test]
    fn unnamed_event() {
        let ev = event(json!({"content": "x"}));
        assert_eq!(ev.name(), None);
        assert_eq!(ev.kind(), EventKind::Unnamed);
    }

    #[test]
    fn wrap_without_name_has_no_event_key() {
        let ev = NormalizedEvent::wrap(json!([1, 2]), None);
        assert!(ev.get("event").is_none());
        assert_eq!(ev.get("data"), Some(&json!([1, 2])));
    }

    #[test]
    fn tool_use_step_label() {
        let ev = event(json!({
            "event": "response.tool_use",
            "type": "cortex_analyst_text_to_sql",
            "name": "revenue"
        }));
        assert_eq!(
            ev.tool_step().as_deref(),
            Some("Using tool: cortex_analyst_text_to_sql revenue")
        );
    }

    #[test]
    fn tool_result_falls_back_to_message() {
        let ev = event(json!({
            "event": "response.tool_result.status",
            "message": "Executing SQL"
        }));
        assert_eq!(ev.tool_step().as_deref(), Some("Tool result: Executing SQL"));
    }

    #[test]
    fn status_only_for_status_events() {
        let ev = event(json!({"event": "response.status", "message": "Planning"}));
        assert_eq!(ev.status_message(), Some("Planning"));
        let ev = event(json!({"event": "response.text", "message": "nope"}));
        assert_eq!(ev.status_message(), None);
    }

    #[test]
    fn serializes_as_plain_object() {
        let ev = event(json!({"event": "response", "content": []}));
        let s = serde_json::to_string(&ev).unwrap();
        assert!(s.starts_with('{'));
        assert!(s.contains(r#""event":"response""#));
    }
}
