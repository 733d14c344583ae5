//! Plain-text rendering of threads, messages and stream events.

use chrono::{DateTime, Utc};
use cortex_agent::blocks::{self, RichBlock};
use cortex_agent::{AgentMessage, ContentBlock, EventKind, NormalizedEvent, Role, ThreadRecord};
use serde_json::{Map, Value};

pub fn timestamp(millis: Option<i64>) -> String {
    millis
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn thread_line(thread: &ThreadRecord) -> String {
    format!(
        "{:<24} {:<24} {}",
        thread.thread_id,
        timestamp(thread.created_on),
        thread.origin_application.as_deref().unwrap_or("-")
    )
}

pub fn speaker(role: Role) -> &'static str {
    match role {
        Role::User => "you",
        Role::Assistant => "agent",
    }
}

pub fn message(msg: &AgentMessage) -> String {
    let body: Vec<String> = msg.content.iter().map(content_block).collect();
    format!("{}> {}", speaker(msg.role), body.join("\n"))
}

fn content_block(block: &ContentBlock) -> String {
    match block {
        ContentBlock::Text { text } => text.clone(),
        ContentBlock::Table { fields } => rich(&blocks::table_from_block(fields)),
        ContentBlock::Chart { chart_spec } => {
            let mut stored = Map::new();
            if let Some(spec) = chart_spec {
                stored.insert("chart_spec".into(), spec.clone().into());
            }
            rich(&blocks::chart_from_block(&stored))
        }
    }
}

pub fn rich(block: &RichBlock) -> String {
    match block {
        RichBlock::Table { rows } => format!("[table: {} rows]", rows.len()),
        RichBlock::Chart { spec } => {
            let mark = spec
                .get("mark")
                .and_then(|m| m.as_str().or_else(|| m.get("type").and_then(|t| t.as_str())))
                .unwrap_or("chart");
            format!("[chart: {mark}, {} points]", block.chart_values().len())
        }
        RichBlock::Raw(value) => format!("[unrecognised content: {value}]"),
    }
}

/// Progress lines for an event: the step it reports plus any detail panels.
pub fn event_notes(event: &NormalizedEvent) -> Vec<String> {
    let mut notes: Vec<String> = step_note(event).into_iter().collect();
    notes.extend(detail_notes(event));
    notes
}

fn step_note(event: &NormalizedEvent) -> Option<String> {
    if let Some(step) = event.tool_step() {
        return Some(step);
    }
    match event.kind() {
        EventKind::Status => event.status_message().map(|m| format!("status: {m}")),
        EventKind::Thinking => event.thinking_text().map(|t| format!("thinking: {t}")),
        EventKind::TextAnnotation => {
            let mut annotation = event.as_map().clone();
            annotation.remove("event");
            Some(format!("annotation: {}", Value::Object(annotation)))
        }
        EventKind::Table | EventKind::Chart => blocks::from_event(event).map(|b| rich(&b)),
        EventKind::Error => Some(format!(
            "agent error: {}",
            event
                .str_field("message")
                .unwrap_or("unknown error")
        )),
        _ => None,
    }
}

/// Agent instructions, execution environment and model configuration, when
/// an event carries them. Instructions are read from the top level only; the
/// other two may also sit under `json`.
fn detail_notes(event: &NormalizedEvent) -> Vec<String> {
    let top = event.as_map();
    let nested = event.get("json").and_then(Value::as_object);
    let deep = |keys: &[&str]| {
        first_present(top, keys).or_else(|| nested.and_then(|j| first_present(j, keys)))
    };

    let mut notes = Vec::new();
    if let Some(instructions) = first_present(top, &["agent_instructions", "instructions"]) {
        notes.push(format!("agent instructions: {instructions}"));
    }
    if let Some(env) = deep(&["execution_environment"]).filter(|v| v.is_object()) {
        notes.push(format!("execution environment: {env}"));
    }
    if let Some(models) = deep(&["models", "model_config"]) {
        notes.push(format!("model config: {models}"));
    }
    notes
}

fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
}
