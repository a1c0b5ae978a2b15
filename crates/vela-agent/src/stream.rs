//! Normalized streaming event shapes.
//!
//! The provider's SDK surfaces tool calls under several attribute paths
//! depending on the item kind. One adapter (`tool_call_from_item`) owns all
//! of that probing; the rest of the engine only ever sees [`ToolCallEvent`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool invocation observed on the streaming channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallEvent {
    pub name: String,
    /// Provider call id — present for function calls that need an output
    /// submitted back.
    pub call_id: Option<String>,
    pub arguments: Value,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl ToolCallEvent {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            call_id: None,
            arguments: Value::Null,
            output: None,
            error: None,
        }
    }
}

/// Token accounting reported by the provider (zeroes when unavailable —
/// callers fall back to a tokenizer estimate).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u32,
    pub output: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input + self.output
    }

    pub fn is_reported(&self) -> bool {
        self.input > 0 || self.output > 0
    }
}

/// Events emitted while streaming one model response.
#[derive(Debug, Clone)]
pub enum RunnerEvent {
    /// Incremental text content.
    TextDelta { delta: String },

    /// A tool call item landed (hosted or function).
    ToolCall(ToolCallEvent),

    /// A tool call produced output. Logged; tags never depend on it.
    ToolOutput { name: String, output: String },

    /// A complete message item. May supersede the accumulated delta text.
    MessageOutput { text: String },

    /// The image-generation tool produced a result payload.
    ImageGenerated {
        b64: String,
        revised_prompt: Option<String>,
    },

    /// Stream completed.
    Completed { usage: TokenUsage },

    /// Error event on the stream.
    Error { message: String },
}

/// Build a [`ToolCallEvent`] from a streamed output item, probing the
/// attribute paths different item kinds use.
///
/// Returns `None` for items that are not tool calls (plain messages,
/// reasoning items).
pub fn tool_call_from_item(item: &Value) -> Option<ToolCallEvent> {
    let item_type = item.get("type").and_then(Value::as_str)?;
    if !item_type.contains("call") {
        return None;
    }

    // Name probing order: explicit name, tool_name, server-side tool label,
    // finally the item type itself (e.g. "web_search_call" → "web_search").
    let name = item
        .get("name")
        .and_then(Value::as_str)
        .or_else(|| item.get("tool_name").and_then(Value::as_str))
        .map(String::from)
        .unwrap_or_else(|| item_type.trim_end_matches("_call").to_string());

    let arguments = item
        .get("arguments")
        .cloned()
        .unwrap_or(Value::Null);

    Some(ToolCallEvent {
        name,
        call_id: item
            .get("call_id")
            .or_else(|| item.get("id"))
            .and_then(Value::as_str)
            .map(String::from),
        arguments,
        output: item
            .get("output")
            .and_then(Value::as_str)
            .map(String::from),
        error: item.get("error").and_then(Value::as_str).map(String::from),
    })
}

/// Parse a single SSE line.
/// SSE format: `event: <type>\ndata: <json>\n\n`
pub fn parse_sse_line(line: &str) -> Option<SseParsed> {
    if let Some(event_type) = line.strip_prefix("event: ") {
        Some(SseParsed::Event(event_type.to_string()))
    } else {
        line.strip_prefix("data: ")
            .map(|data| SseParsed::Data(data.to_string()))
    }
}

#[derive(Debug)]
pub enum SseParsed {
    Event(String),
    Data(String),
}
