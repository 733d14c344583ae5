//! Threads REST API: create, list, describe, delete.
//!
//! Records are lenient pass-through values. Ids may arrive as JSON strings or
//! numbers and are normalized to strings; fields this crate does not model are
//! kept in `extra`.

use cortex_core::config::API_PREFIX;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::client::CortexAgentClient;
use crate::error::AgentError;
use crate::transport::Call;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadRecord {
    #[serde(default, deserialize_with = "de::id")]
    pub thread_id: String,
    #[serde(default)]
    pub thread_name: Option<String>,
    #[serde(default)]
    pub origin_application: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(default, deserialize_with = "de::opt_millis")]
    pub created_on: Option<i64>,
    #[serde(default, deserialize_with = "de::opt_millis")]
    pub updated_on: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    #[serde(default, deserialize_with = "de::opt_id")]
    pub message_id: Option<String>,
    #[serde(default, deserialize_with = "de::opt_id")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    /// Usually a string, itself often a JSON-encoded `{role, content}` message.
    #[serde(default)]
    pub message_payload: Option<Value>,
    #[serde(default, deserialize_with = "de::opt_millis")]
    pub created_on: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Thread metadata plus one page of messages, newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadDescription {
    /// `None` when absent or not a thread object.
    #[serde(default, deserialize_with = "de::lenient")]
    pub metadata: Option<ThreadRecord>,
    /// Empty when absent, null or not a list; malformed entries are skipped.
    #[serde(default, deserialize_with = "de::lenient_list")]
    pub messages: Vec<ThreadMessage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ThreadDescription {
    /// Id of the newest message on this page.
    pub fn latest_message_id(&self) -> Option<&str> {
        self.messages.first().and_then(|m| m.message_id.as_deref())
    }
}

fn threads_path() -> String {
    format!("{API_PREFIX}/cortex/threads")
}

fn thread_path(thread_id: &str) -> String {
    format!("{API_PREFIX}/cortex/threads/{thread_id}")
}

impl CortexAgentClient {
    /// Create a thread tagged with `origin_application`. Returns its id.
    pub async fn create_thread(&self, origin_application: &str) -> Option<String> {
        match self.try_create_thread(origin_application).await {
            Ok(id) => {
                info!(thread_id = ?id, origin_application, "thread created");
                id
            }
            Err(e) => self.fail("create_thread", e, None),
        }
    }

    async fn try_create_thread(&self, origin_application: &str) -> Result<Option<String>, AgentError> {
        let path = threads_path();
        let body = json!({ "origin_application": origin_application });
        let resp = self.transport.request(Call::post(&path, &body)).await?;
        let data: Value = resp.json().await?;
        Ok(data.get("thread_id").and_then(de::id_from_value))
    }

    /// List threads, optionally filtered by origin application.
    pub async fn list_threads(&self, limit: u32, origin_application: Option<&str>) -> Vec<ThreadRecord> {
        match self.try_list_threads(limit, origin_application).await {
            Ok(threads) => threads,
            Err(e) => self.fail("list_threads", e, Vec::new()),
        }
    }

    async fn try_list_threads(
        &self,
        limit: u32,
        origin_application: Option<&str>,
    ) -> Result<Vec<ThreadRecord>, AgentError> {
        let path = threads_path();
        let mut call = Call::get(&path).query("limit", limit);
        if let Some(origin) = origin_application.filter(|o| !o.is_empty()) {
            call = call.query("origin_application", origin);
        }
        let resp = self.transport.request(call).await?;
        let data: Value = resp.json().await?;
        Ok(parse_thread_list(data))
    }

    /// Fetch a thread resource without paging parameters.
    pub async fn get_thread(&self, thread_id: &str) -> Option<ThreadDescription> {
        let path = thread_path(thread_id);
        match self.fetch_description(Call::get(&path)).await {
            Ok(desc) => Some(desc),
            Err(e) => self.fail("get_thread", e, None),
        }
    }

    /// Thread metadata plus a page of up to `page_size` messages, newest first.
    /// `last_message_id` pages backwards from that message.
    pub async fn describe_thread(
        &self,
        thread_id: &str,
        page_size: u32,
        last_message_id: Option<i64>,
    ) -> Option<ThreadDescription> {
        let path = thread_path(thread_id);
        let mut call = Call::get(&path).query("page_size", page_size);
        if let Some(last) = last_message_id {
            call = call.query("last_message_id", last);
        }
        match self.fetch_description(call).await {
            Ok(desc) => {
                debug!(thread_id, messages = desc.messages.len(), "thread described");
                Some(desc)
            }
            Err(e) => self.fail("describe_thread", e, None),
        }
    }

    async fn fetch_description(&self, call: Call<'_>) -> Result<ThreadDescription, AgentError> {
        let resp = self.transport.request(call).await?;
        let data: Value = resp.json().await?;
        Ok(serde_json::from_value(data)?)
    }

    /// Delete a thread. `true` on success.
    pub async fn delete_thread(&self, thread_id: &str) -> bool {
        let path = thread_path(thread_id);
        match self.transport.request(Call::delete(&path)).await {
            Ok(_) => {
                info!(thread_id, "thread deleted");
                true
            }
            Err(e) => self.fail("delete_thread", e, false),
        }
    }
}

/// Accepts `{threads: [...]}` or a bare list; anything else is empty.
/// Entries that are not thread objects are skipped.
fn parse_thread_list(data: Value) -> Vec<ThreadRecord> {
    let items = match data {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("threads") {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<ThreadRecord>(item) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(error = %e, "skipping malformed thread entry");
                None
            }
        })
        .collect()
}

mod de {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn id_from_value(v: &Value) -> Option<String> {
        match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(opt_id(d)?.unwrap_or_default())
    }

    pub fn opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let v = Option::<Value>::deserialize(d)?;
        Ok(v.as_ref().and_then(id_from_value))
    }

    pub fn lenient<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let v = Option::<Value>::deserialize(d)?;
        Ok(v.and_then(|v| serde_json::from_value(v).ok()))
    }

    pub fn lenient_list<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            _ => Vec::new(),
        })
    }

    pub fn opt_millis<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        let v = Option::<Value>::deserialize(d)?;
        Ok(match v {
            Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_accepts_wrapped_and_bare_shapes() {
        let wrapped = json!({"threads": [{"thread_id": 1, "origin_application": "app"}]});
        let bare = json!([{"thread_id": "abc"}]);
        assert_eq!(parse_thread_list(wrapped)[0].thread_id, "1");
        assert_eq!(parse_thread_list(bare)[0].thread_id, "abc");
    }

    #[test]
    fn list_of_unexpected_shape_is_empty() {
        assert!(parse_thread_list(json!({"items": []})).is_empty());
        assert!(parse_thread_list(json!("nope")).is_empty());
    }

    #[test]
    fn list_skips_non_objects() {
        let threads = parse_thread_list(json!([42, {"thread_id": 7}]));
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].thread_id, "7");
    }

    #[test]
    fn record_keeps_unknown_fields_and_lenient_timestamps() {
        let record: ThreadRecord = serde_json::from_value(json!({
            "thread_id": 12,
            "created_on": 1_700_000_000_000.0,
            "updated_on": "1700000000500",
            "custom": true
        }))
        .unwrap();
        assert_eq!(record.created_on, Some(1_700_000_000_000));
        assert_eq!(record.updated_on, Some(1_700_000_000_500));
        assert_eq!(record.extra.get("custom"), Some(&json!(true)));
    }

    #[test]
    fn description_latest_is_first_message() {
        let desc: ThreadDescription = serde_json::from_value(json!({
            "metadata": {"thread_id": "t1"},
            "messages": [
                {"message_id": 9, "role": "assistant", "message_payload": "hi"},
                {"message_id": 8, "role": "user", "message_payload": "hello"}
            ]
        }))
        .unwrap();
        assert_eq!(desc.latest_message_id(), Some("9"));
        assert_eq!(desc.metadata.unwrap().thread_id, "t1");
    }

    #[test]
    fn description_tolerates_odd_shapes() {
        let desc: ThreadDescription =
            serde_json::from_value(json!({"metadata": {"thread_id": "t1"}, "messages": null}))
                .unwrap();
        assert!(desc.messages.is_empty());
        assert_eq!(desc.latest_message_id(), None);

        let desc: ThreadDescription = serde_json::from_value(json!({
            "metadata": "not an object",
            "messages": {"unexpected": true}
        }))
        .unwrap();
        assert!(desc.metadata.is_none());
        assert!(desc.messages.is_empty());

        let desc: ThreadDescription =
            serde_json::from_value(json!({"messages": [7, {"message_id": 3}]})).unwrap();
        assert_eq!(desc.messages.len(), 1);
        assert_eq!(desc.latest_message_id(), Some("3"));
    }
}
