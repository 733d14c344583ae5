use serde_json::Value;

use crate::event::{EventKind, NormalizedEvent};

/// One shape rule. `Some` stops the search, even when the text is empty.
type Rule = fn(&NormalizedEvent) -> Option<String>;

// Order matters: text deltas must never fall through to the generic
// `content` rule, which is reserved for the terminal aggregate.
const RULES: &[Rule] = &[text_field, terminal_blocks, generic_content, output_messages];

/// Pull the user-visible text out of an event. Empty when nothing matches.
pub fn extract_content(event: &NormalizedEvent) -> String {
    RULES
        .iter()
        .find_map(|rule| rule(event))
        .unwrap_or_default()
}

/// `response.text.delta` / `response.text` with a string `text`.
fn text_field(event: &NormalizedEvent) -> Option<String> {
    match event.kind() {
        EventKind::TextDelta | EventKind::Text => event.str_field("text").map(str::to_string),
        _ => None,
    }
}

/// `response`: every block exposing a string `text`, in order.
fn terminal_blocks(event: &NormalizedEvent) -> Option<String> {
    if !event.kind().is_terminal() {
        return None;
    }
    let blocks = event.get("content")?.as_array()?;
    non_empty(join_text(blocks, |_| true))
}

/// Top-level `content`: a string as-is, or the `text` blocks of a list.
fn generic_content(event: &NormalizedEvent) -> Option<String> {
    match event.get("content")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(blocks) => non_empty(join_text(blocks, is_text_block)),
        _ => None,
    }
}

/// `output.messages[*].content[*]` text blocks.
fn output_messages(event: &NormalizedEvent) -> Option<String> {
    let messages = event.get("output")?.get("messages")?.as_array()?;
    let text: String = messages
        .iter()
        .filter_map(|m| m.get("content").and_then(Value::as_array))
        .map(|blocks| join_text(blocks, is_text_block))
        .collect();
    non_empty(text)
}

fn is_text_block(block: &Value) -> bool {
    block.get("type").and_then(Value::as_str) == Some("text")
}

fn join_text(blocks: &[Value], keep: fn(&Value) -> bool) -> String {
    blocks
        .iter()
        .filter(|b| keep(b))
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extract(value: Value) -> String {
        extract_content(&serde_json::from_value(value).unwrap())
    }

    #[test]
    fn text_delta_uses_text_field() {
        assert_eq!(
            extract(json!({"event": "response.text.delta", "text": "Hello"})),
            "Hello"
        );
    }

    #[test]
    fn text_delta_is_not_read_through_content() {
        // a delta with both fields must come from `text`
        let got = extract(json!({
            "event": "response.text.delta",
            "text": "delta",
            "content": "aggregate"
        }));
        assert_eq!(got, "delta");
    }

    #[test]
    fn empty_delta_text_stops_search() {
        let got = extract(json!({
            "event": "response.text",
            "text": "",
            "content": "fallback"
        }));
        assert_eq!(got, "");
    }

    #[test]
    fn response_concatenates_text_blocks() {
        let got = extract(json!({
            "event": "response",
            "content": [{"type": "text", "text": "A"}, {"type": "text", "text": "B"}]
        }));
        assert_eq!(got, "AB");
    }

    #[test]
    fn response_accepts_untyped_text_blocks() {
        let got = extract(json!({
            "event": "response",
            "role": "assistant",
            "content": [
                {"type": "thinking", "thinking": {"text": "hmm"}},
                {"type": "text", "text": "A"},
                {"type": "tool_use", "tool_use": {}},
                {"text": "B"}
            ]
        }));
        assert_eq!(got, "AB");
    }

    #[test]
    fn generic_string_content() {
        assert_eq!(
            extract(json!({"event": "response.custom", "content": "plain"})),
            "plain"
        );
    }

    #[test]
    fn generic_list_content_only_takes_text_blocks() {
        let got = extract(json!({
            "event": "response.custom",
            "content": [{"type": "text", "text": "x"}, {"text": "skipped"}]
        }));
        assert_eq!(got, "x");
    }

    #[test]
    fn nested_output_messages() {
        let got = extract(json!({
            "output": {"messages": [
                {"content": [{"type": "text", "text": "one "}]},
                {"content": [{"type": "chart"}, {"type": "text", "text": "two"}]}
            ]}
        }));
        assert_eq!(got, "one two");
    }

    #[test]
    fn unknown_shape_is_empty() {
        assert_eq!(extract(json!({"event": "response.status", "message": "Planning"})), "");
        assert_eq!(extract(json!({"data": "[DONE]"})), "");
        assert_eq!(extract(json!({"output": "not-an-object"})), "");
    }
}
