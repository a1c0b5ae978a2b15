//! OpenAI-backed implementation of the provider contracts: the streaming
//! Responses endpoint, the files/vector-store API and audio transcription.
//!
//! SSE is parsed by hand from the byte stream: lines are buffered across
//! chunks, `data:` payloads are JSON with a `type` discriminator.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use vela_media::audio::Transcriber;
use vela_media::documents::FileStore;
use vela_media::MediaError;

use crate::error::{ProviderError, Result};
use crate::provider::{ResponsesClient, ResponsesRequest};
use crate::stream::{parse_sse_line, tool_call_from_item, RunnerEvent, SseParsed, TokenUsage};

/// Per-request timeout for the non-streaming endpoints (uploads,
/// transcription, narrowed retries). Streams run unbounded — the presenter's
/// circuit breaker owns that budget.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    fn request_body(req: &ResponsesRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": req.model,
            "input": req.input.to_value(),
            "stream": stream,
        });
        if let Some(instructions) = &req.instructions {
            body["instructions"] = json!(instructions);
        }
        if !req.tools.is_empty() {
            body["tools"] = Value::Array(req.tools.clone());
        }
        if let Some(choice) = &req.tool_choice {
            body["tool_choice"] = json!(choice);
        }
        body
    }

    async fn post_responses(&self, body: &Value, stream: bool) -> Result<reqwest::Response> {
        let mut builder = self
            .http
            .post(format!("{}/v1/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body);
        if !stream {
            builder = builder.timeout(REQUEST_TIMEOUT);
        }
        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| {
                    v.pointer("/error/message")
                        .and_then(Value::as_str)
                        .map(String::from)
                })
                .unwrap_or(text);
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl ResponsesClient for OpenAiClient {
    async fn stream(&self, req: &ResponsesRequest, tx: mpsc::Sender<RunnerEvent>) -> Result<()> {
        let body = Self::request_body(req, true);
        let resp = self.post_responses(&body, true).await?;

        let mut byte_stream = resp.bytes_stream();
        let mut line_buf = String::new();
        let mut usage = TokenUsage::default();

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(|e| ProviderError::Stream(e.to_string()))?;
            let Ok(text) = std::str::from_utf8(&chunk) else {
                continue;
            };

            line_buf.push_str(text);
            let lines: Vec<&str> = line_buf.split('\n').collect();
            let (complete, remainder) = lines.split_at(lines.len() - 1);
            let remainder = remainder.first().unwrap_or(&"").to_string();

            for line in complete {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let Some(SseParsed::Data(data)) = parse_sse_line(line) else {
                    continue;
                };
                if data == "[DONE]" {
                    continue;
                }
                let Ok(payload) = serde_json::from_str::<Value>(&data) else {
                    debug!(len = data.len(), "unparseable sse data, skipping");
                    continue;
                };
                for event in events_from_payload(&payload, &mut usage) {
                    if tx.send(event).await.is_err() {
                        return Ok(()); // receiver dropped
                    }
                }
            }

            line_buf = remainder;
        }

        let _ = tx.send(RunnerEvent::Completed { usage }).await;
        Ok(())
    }

    async fn complete(&self, req: &ResponsesRequest) -> Result<String> {
        let body = Self::request_body(req, false);
        let resp = self.post_responses(&body, false).await?;
        let value: Value = resp.json().await?;
        output_text(&value)
            .ok_or_else(|| ProviderError::Parse("response has no output text".into()))
    }
}

/// Map one SSE payload into runner events, updating `usage` on completion
/// payloads.
fn events_from_payload(payload: &Value, usage: &mut TokenUsage) -> Vec<RunnerEvent> {
    let payload_type = payload.get("type").and_then(Value::as_str).unwrap_or("");

    match payload_type {
        "response.output_text.delta" => {
            let delta = payload
                .get("delta")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if delta.is_empty() {
                Vec::new()
            } else {
                vec![RunnerEvent::TextDelta {
                    delta: delta.to_string(),
                }]
            }
        }
        "response.output_item.done" => {
            let Some(item) = payload.get("item") else {
                return Vec::new();
            };
            item_events(item)
        }
        "response.completed" => {
            if let Some(u) = payload.pointer("/response/usage") {
                usage.input = u
                    .get("input_tokens")
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as u32;
                usage.output = u
                    .get("output_tokens")
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as u32;
            }
            Vec::new()
        }
        "response.failed" | "error" => {
            let message = payload
                .pointer("/response/error/message")
                .or_else(|| payload.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("stream error")
                .to_string();
            warn!(message, "provider stream error");
            vec![RunnerEvent::Error { message }]
        }
        _ => Vec::new(),
    }
}

/// Events for one finished output item.
fn item_events(item: &Value) -> Vec<RunnerEvent> {
    let item_type = item.get("type").and_then(Value::as_str).unwrap_or("");
    let mut events = Vec::new();

    if item_type == "message" {
        if let Some(text) = message_text(item) {
            events.push(RunnerEvent::MessageOutput { text });
        }
        return events;
    }

    if item_type == "image_generation_call" {
        if let Some(b64) = item.get("result").and_then(Value::as_str) {
            events.push(RunnerEvent::ImageGenerated {
                b64: b64.to_string(),
                revised_prompt: item
                    .get("revised_prompt")
                    .and_then(Value::as_str)
                    .map(String::from),
            });
        }
    }

    if let Some(call) = tool_call_from_item(item) {
        if let Some(output) = call.output.clone() {
            events.push(RunnerEvent::ToolOutput {
                name: call.name.clone(),
                output,
            });
        }
        events.push(RunnerEvent::ToolCall(call));
    }

    events
}

fn message_text(item: &Value) -> Option<String> {
    let content = item.get("content")?.as_array()?;
    let text: String = content
        .iter()
        .filter(|part| part.get("type").and_then(Value::as_str) == Some("output_text"))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    (!text.is_empty()).then_some(text)
}

/// Output text of a non-streaming response payload.
fn output_text(value: &Value) -> Option<String> {
    let output = value.get("output")?.as_array()?;
    let text: String = output
        .iter()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("message"))
        .filter_map(message_text)
        .collect();
    (!text.is_empty()).then_some(text)
}

#[async_trait]
impl Transcriber for OpenAiClient {
    async fn transcribe(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        language: &str,
    ) -> std::result::Result<String, MediaError> {
        // The endpoint takes ISO-639-1; "pt-BR" → "pt".
        let iso = language.split('-').next().unwrap_or(language).to_string();
        let form = reqwest::multipart::Form::new()
            .text("model", "whisper-1")
            .text("language", iso)
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string()),
            );

        let resp = self
            .http
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .map_err(|e| MediaError::Transcription(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MediaError::Transcription(format!("HTTP {status}: {body}")));
        }
        let value: Value = resp
            .json()
            .await
            .map_err(|e| MediaError::Transcription(e.to_string()))?;
        value
            .get("text")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| MediaError::Transcription("response missing text".into()))
    }
}

#[async_trait]
impl FileStore for OpenAiClient {
    async fn upload_file(
        &self,
        path: &Path,
        file_name: &str,
    ) -> std::result::Result<String, MediaError> {
        let bytes = tokio::fs::read(path).await?;
        let form = reqwest::multipart::Form::new()
            .text("purpose", "assistants")
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string()),
            );

        let value = self
            .store_call(|http, base| {
                http.post(format!("{base}/v1/files")).multipart(form)
            })
            .await?;
        value
            .get("id")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| MediaError::Store("file upload response missing id".into()))
    }

    async fn create_vector_store(&self, name: &str) -> std::result::Result<String, MediaError> {
        let body = json!({
            "name": name,
            "expires_after": { "anchor": "last_active_at", "days": 1 },
        });
        let value = self
            .store_call(|http, base| {
                http.post(format!("{base}/v1/vector_stores")).json(&body)
            })
            .await?;
        value
            .get("id")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| MediaError::Store("vector store response missing id".into()))
    }

    async fn add_files(
        &self,
        vector_store_id: &str,
        file_ids: &[String],
    ) -> std::result::Result<(), MediaError> {
        let body = json!({ "file_ids": file_ids });
        self.store_call(|http, base| {
            http.post(format!("{base}/v1/vector_stores/{vector_store_id}/file_batches"))
                .json(&body)
        })
        .await?;
        Ok(())
    }

    async fn list_files(
        &self,
        vector_store_id: &str,
    ) -> std::result::Result<Vec<String>, MediaError> {
        let value = self
            .store_call(|http, base| {
                http.get(format!("{base}/v1/vector_stores/{vector_store_id}/files"))
            })
            .await?;
        Ok(value
            .get("data")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.get("id").and_then(Value::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl OpenAiClient {
    async fn store_call(
        &self,
        build: impl FnOnce(&reqwest::Client, &str) -> reqwest::RequestBuilder,
    ) -> std::result::Result<Value, MediaError> {
        let resp = build(&self.http, &self.base_url)
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| MediaError::Store(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MediaError::Store(format!("HTTP {status}: {body}")));
        }
        resp.json()
            .await
            .map_err(|e| MediaError::Store(e.to_string()))
    }
}
