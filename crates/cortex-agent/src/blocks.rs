//! Tables and charts carried by `response.table` / `response.chart` events and
//! by stored message content.
//!
//! The service nests these payloads differently depending on the feature that
//! produced them, so each kind is resolved by walking an ordered list of shape
//! matchers; the first match wins and anything unrecognised stays raw.

use serde_json::{Map, Value};

use crate::event::{EventKind, NormalizedEvent};

type Object = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum RichBlock {
    Table { rows: Vec<Value> },
    /// A Vega-Lite spec.
    Chart { spec: Object },
    /// Recognised kind, unrecognised shape.
    Raw(Value),
}

impl RichBlock {
    /// Inline `data.values` of a chart spec.
    pub fn chart_values(&self) -> &[Value] {
        match self {
            RichBlock::Chart { spec } => spec
                .get("data")
                .and_then(|d| d.get("values"))
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
            _ => &[],
        }
    }
}

/// Resolve the table or chart carried by an event. `None` for other kinds.
pub fn from_event(event: &NormalizedEvent) -> Option<RichBlock> {
    match event.kind() {
        EventKind::Table => Some(table_from_event(event.as_map())),
        EventKind::Chart => Some(chart_from_event(event.as_map())),
        _ => None,
    }
}

fn table_from_event(ev: &Object) -> RichBlock {
    let data = ["table", "json", "content"]
        .iter()
        .find_map(|key| ev.get(*key).filter(|v| is_truthy(v)));
    match data {
        Some(Value::Object(obj)) => match obj.get("rows") {
            Some(Value::Array(rows)) => RichBlock::Table { rows: rows.clone() },
            _ => RichBlock::Raw(Value::Object(ev.clone())),
        },
        Some(Value::Array(rows)) => RichBlock::Table { rows: rows.clone() },
        Some(_) => RichBlock::Raw(Value::Object(ev.clone())),
        // no nested payload: the event itself is the table
        None => table_from_block(ev),
    }
}

type SpecMatcher = fn(&Object) -> Option<Object>;

const EVENT_CHART_SHAPES: &[SpecMatcher] = &[spec_string, nested_chart, json_object];

fn chart_from_event(ev: &Object) -> RichBlock {
    EVENT_CHART_SHAPES
        .iter()
        .find_map(|matcher| matcher(ev))
        .filter(looks_like_vega)
        .map(|spec| RichBlock::Chart { spec })
        .unwrap_or_else(|| RichBlock::Raw(Value::Object(ev.clone())))
}

/// `chart_spec` holding a JSON-encoded spec.
fn spec_string(obj: &Object) -> Option<Object> {
    let raw = obj.get("chart_spec")?.as_str()?;
    match serde_json::from_str(raw).ok()? {
        Value::Object(spec) => Some(spec),
        _ => None,
    }
}

/// `chart.chart_spec` string, or `chart` itself when it is a spec.
fn nested_chart(obj: &Object) -> Option<Object> {
    let chart = obj.get("chart")?.as_object()?;
    spec_string(chart).or_else(|| looks_like_vega(chart).then(|| chart.clone()))
}

/// `json` holding a spec object.
fn json_object(obj: &Object) -> Option<Object> {
    let json = obj.get("json")?.as_object()?;
    looks_like_vega(json).then(|| json.clone())
}

fn looks_like_vega(spec: &Object) -> bool {
    ["mark", "encoding", "$schema"]
        .iter()
        .any(|key| spec.get(*key).is_some_and(is_truthy))
}

/// Where a stored chart block keeps its spec string.
pub fn chart_spec_string(block: &Object) -> Option<String> {
    let candidates = [
        block.get("chart_spec"),
        block.get("chart").and_then(|c| c.get("chart_spec")),
        block.get("json").and_then(|j| j.get("chart_spec")),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(Value::as_str)
        .map(str::to_string)
}

/// Resolve a stored chart block (`{"type":"chart", ...}`) into a spec.
pub fn chart_from_block(block: &Object) -> RichBlock {
    let spec = chart_spec_string(block)
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
        .and_then(|v| match v {
            Value::Object(spec) => Some(spec),
            _ => None,
        })
        .or_else(|| {
            block
                .get("chart")
                .and_then(Value::as_object)
                .filter(|c| looks_like_vega(c))
                .cloned()
        });
    match spec {
        Some(spec) => RichBlock::Chart { spec },
        None => RichBlock::Raw(Value::Object(block.clone())),
    }
}

/// Resolve a stored table block: `rows`, else `data`.
pub fn table_from_block(block: &Object) -> RichBlock {
    let rows = block
        .get("rows")
        .filter(|v| is_truthy(v))
        .or_else(|| block.get("data"));
    match rows {
        Some(Value::Array(rows)) => RichBlock::Table { rows: rows.clone() },
        _ => RichBlock::Raw(Value::Object(block.clone())),
    }
}

// null, false, 0, "" and empty containers are "missing"
fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
