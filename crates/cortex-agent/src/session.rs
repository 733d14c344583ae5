//! Conversation state a front end keeps between agent runs.

use serde_json::{Map, Value};
use tracing::debug;

use crate::blocks::chart_spec_string;
use crate::message::{AgentMessage, ContentBlock, Role};
use crate::threads::{ThreadDescription, ThreadMessage};

/// Parent id the service expects for the first message of a thread.
pub const ROOT_PARENT_ID: &str = "0";

#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub thread_id: Option<String>,
    pub parent_message_id: Option<String>,
    /// Rendered conversation, oldest first.
    pub history: Vec<AgentMessage>,
    pub loaded_thread_id: Option<String>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to a freshly created thread.
    pub fn start_thread(&mut self, thread_id: impl Into<String>) {
        let thread_id = thread_id.into();
        self.thread_id = Some(thread_id.clone());
        self.parent_message_id = Some(ROOT_PARENT_ID.to_string());
        self.history.clear();
        self.loaded_thread_id = Some(thread_id);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Replace the session with a stored thread. `description.messages`
    /// arrive newest first.
    pub fn load_thread(&mut self, thread_id: impl Into<String>, description: &ThreadDescription) {
        let thread_id = thread_id.into();
        self.history = description.messages.iter().rev().map(render_stored).collect();
        self.parent_message_id = Some(
            description
                .latest_message_id()
                .unwrap_or(ROOT_PARENT_ID)
                .to_string(),
        );
        debug!(
            thread_id = %thread_id,
            messages = self.history.len(),
            parent = ?self.parent_message_id,
            "thread loaded into session"
        );
        self.thread_id = Some(thread_id.clone());
        self.loaded_thread_id = Some(thread_id);
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.history.push(AgentMessage::user(text));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.history.push(AgentMessage::assistant(text));
    }

    pub fn set_parent_message_id(&mut self, id: impl Into<String>) {
        self.parent_message_id = Some(id.into());
    }

    /// True when runs continue a server-side thread.
    pub fn in_thread(&self) -> bool {
        self.thread_id.is_some() && self.parent_message_id.is_some()
    }

    /// Messages for the next run. Inside a thread the service already holds
    /// the history, so only the newest message goes out.
    pub fn outgoing_messages(&self) -> Vec<AgentMessage> {
        if self.in_thread() {
            self.history.last().cloned().into_iter().collect()
        } else {
            self.history.clone()
        }
    }
}

fn render_stored(message: &ThreadMessage) -> AgentMessage {
    let fallback_role = Role::parse(message.role.as_deref().unwrap_or("assistant"));
    let payload = match &message.message_payload {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    let parsed = match payload.trim_start().chars().next() {
        Some('{') | Some('[') => serde_json::from_str::<Value>(&payload).ok(),
        _ => None,
    };
    let Some(Value::Object(stored)) = parsed else {
        return AgentMessage {
            role: fallback_role,
            content: vec![ContentBlock::text(payload)],
        };
    };

    let role = stored
        .get("role")
        .and_then(Value::as_str)
        .map(Role::parse)
        .unwrap_or(fallback_role);
    let content: Vec<ContentBlock> = stored
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(Value::as_object)
                .filter_map(keep_block)
                .collect()
        })
        .unwrap_or_default();

    if content.is_empty() {
        return AgentMessage {
            role,
            content: vec![ContentBlock::text(payload)],
        };
    }
    AgentMessage { role, content }
}

// thinking and unknown block types are dropped
fn keep_block(block: &Map<String, Value>) -> Option<ContentBlock> {
    match block.get("type").and_then(Value::as_str)? {
        "text" => block
            .get("text")
            .and_then(Value::as_str)
            .map(ContentBlock::text),
        "chart" => Some(ContentBlock::Chart {
            chart_spec: chart_spec_string(block),
        }),
        "table" => {
            let mut fields = block.clone();
            fields.remove("type");
            Some(ContentBlock::Table { fields })
        }
        _ => None,
    }
}
