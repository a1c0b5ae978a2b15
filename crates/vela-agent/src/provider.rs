//! Provider-facing contracts: the Responses-API client trait the pipelines
//! drive, and the sink the pipelines stream into.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::stream::{RunnerEvent, ToolCallEvent};

pub use crate::stream::TokenUsage;

/// Input to a responses call.
#[derive(Debug, Clone)]
pub enum ResponsesInput {
    /// Plain user text.
    Text(String),
    /// One user turn of mixed content parts (`input_text` / `input_image`).
    Parts(Vec<Value>),
    /// Full item list — used by the agent loop to append `function_call` /
    /// `function_call_output` items across turns.
    Items(Vec<Value>),
}

impl ResponsesInput {
    /// Standard mixed-content turn: text plus low-detail image parts.
    pub fn with_images(text: &str, image_urls: &[String]) -> Self {
        if image_urls.is_empty() {
            return ResponsesInput::Text(text.to_string());
        }
        let mut parts = vec![serde_json::json!({ "type": "input_text", "text": text })];
        for url in image_urls {
            parts.push(serde_json::json!({
                "type": "input_image",
                "image_url": url,
                "detail": "low",
            }));
        }
        ResponsesInput::Parts(parts)
    }

    /// Render into the wire `input` value.
    pub fn to_value(&self) -> Value {
        match self {
            ResponsesInput::Text(t) => Value::String(t.clone()),
            ResponsesInput::Parts(parts) => serde_json::json!([
                { "role": "user", "content": parts }
            ]),
            ResponsesInput::Items(items) => Value::Array(items.clone()),
        }
    }
}

/// One call against the streaming responses endpoint.
#[derive(Debug, Clone)]
pub struct ResponsesRequest {
    pub model: String,
    pub input: ResponsesInput,
    pub instructions: Option<String>,
    /// Tool descriptors (hosted MCP, builtins, function tools) as wire JSON.
    pub tools: Vec<Value>,
    /// `Some("required")` forces tool usage (every MCP-routed request).
    pub tool_choice: Option<String>,
}

/// Streaming responses endpoint. The single implementation speaks SSE over
/// reqwest; tests substitute scripted impls.
#[async_trait]
pub trait ResponsesClient: Send + Sync {
    /// Stream one response, emitting [`RunnerEvent`]s through `tx`.
    /// Returns once the stream is drained. A `Completed` event is always
    /// emitted before returning `Ok`.
    async fn stream(&self, req: &ResponsesRequest, tx: mpsc::Sender<RunnerEvent>) -> Result<()>;

    /// Non-streaming call; returns the output text. Used for the mail
    /// narrowed retry and the thinking sub-agent.
    async fn complete(&self, req: &ResponsesRequest) -> Result<String>;
}

/// Receives live updates while a pipeline streams.
///
/// Implementations must tolerate being called from a spawned task and keep
/// their own interior state (the presenter holds a mutex).
#[async_trait]
pub trait StreamSink: Send + Sync {
    /// A text delta arrived; `accumulated` is the full text so far.
    async fn on_delta(&self, delta: &str, accumulated: &str);

    /// The set of observed tool calls grew.
    async fn on_tool_calls(&self, calls: &[ToolCallEvent]);
}

/// Sink that ignores everything. Useful for tests and fire-and-forget runs.
pub struct NoopSink;

#[async_trait]
impl StreamSink for NoopSink {
    async fn on_delta(&self, _: &str, _: &str) {}
    async fn on_tool_calls(&self, _: &[ToolCallEvent]) {}
}

/// Final result of a pipeline run (either MCP or native agent).
#[derive(Debug, Clone, Default)]
pub struct PipelineResult {
    pub text: String,
    pub tool_calls: Vec<ToolCallEvent>,
    pub usage: TokenUsage,
    /// Base64 payload produced by the image-generation tool, if any.
    pub generated_image: Option<GeneratedImage>,
}

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub b64: String,
    pub revised_prompt: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_input_renders_as_string() {
        let input = ResponsesInput::Text("oi".into());
        assert_eq!(input.to_value(), serde_json::json!("oi"));
    }

    #[test]
    fn image_parts_render_as_single_user_turn() {
        let input =
            ResponsesInput::with_images("describe", &["https://x/img.png".to_string()]);
        let value = input.to_value();
        let content = value[0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 2);
        assert_eq!(content[0]["type"], "input_text");
        assert_eq!(content[1]["type"], "input_image");
        assert_eq!(content[1]["detail"], "low");
    }

    #[test]
    fn no_images_degrades_to_text() {
        let input = ResponsesInput::with_images("hello", &[]);
        assert!(matches!(input, ResponsesInput::Text(_)));
    }
}
