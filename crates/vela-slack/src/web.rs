//! Reqwest implementation of [`ChatClient`] over the Slack Web API.
//!
//! Every call checks the `ok` field of the JSON envelope; `ok: false`
//! surfaces as `ChatError::Api` with the platform error code.

use std::path::Path;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::client::ChatClient;
use crate::error::{ChatError, Result};
use crate::types::{ThreadMessage, UserProfile};

const API_BASE: &str = "https://slack.com/api";

pub struct SlackWebClient {
    http: reqwest::Client,
    bot_token: String,
}

impl SlackWebClient {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            bot_token: bot_token.into(),
        }
    }

    async fn call(&self, method: &str, body: Value) -> Result<Value> {
        let resp = self
            .http
            .post(format!("{API_BASE}/{method}"))
            .bearer_auth(&self.bot_token)
            .json(&body)
            .send()
            .await?;
        let value: Value = resp.json().await?;
        check_ok(method, value)
    }

    async fn call_get(&self, method: &str, query: &[(&str, &str)]) -> Result<Value> {
        let resp = self
            .http
            .get(format!("{API_BASE}/{method}"))
            .bearer_auth(&self.bot_token)
            .query(query)
            .send()
            .await?;
        let value: Value = resp.json().await?;
        check_ok(method, value)
    }
}

fn check_ok(method: &str, value: Value) -> Result<Value> {
    if value.get("ok").and_then(Value::as_bool).unwrap_or(false) {
        debug!(method, "slack api ok");
        Ok(value)
    } else {
        let code = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error")
            .to_string();
        Err(ChatError::Api { code })
    }
}

#[async_trait]
impl ChatClient for SlackWebClient {
    async fn post_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        text: &str,
    ) -> Result<String> {
        let mut body = json!({ "channel": channel, "text": text });
        if let Some(ts) = thread_ts {
            body["thread_ts"] = json!(ts);
        }
        let value = self.call("chat.postMessage", body).await?;
        value
            .get("ts")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| ChatError::Parse("chat.postMessage response missing ts".into()))
    }

    async fn update_message(&self, channel: &str, ts: &str, text: &str) -> Result<()> {
        self.call(
            "chat.update",
            json!({ "channel": channel, "ts": ts, "text": text }),
        )
        .await?;
        Ok(())
    }

    async fn delete_message(&self, channel: &str, ts: &str) -> Result<()> {
        self.call("chat.delete", json!({ "channel": channel, "ts": ts }))
            .await?;
        Ok(())
    }

    async fn upload_file(
        &self,
        channel: &str,
        path: &Path,
        title: Option<&str>,
        comment: Option<&str>,
        thread_ts: Option<&str>,
    ) -> Result<()> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ChatError::Parse(format!("read upload file: {e}")))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let mut form = reqwest::multipart::Form::new()
            .text("channels", channel.to_string())
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(filename),
            );
        if let Some(t) = title {
            form = form.text("title", t.to_string());
        }
        if let Some(c) = comment {
            form = form.text("initial_comment", c.to_string());
        }
        if let Some(ts) = thread_ts {
            form = form.text("thread_ts", ts.to_string());
        }

        let resp = self
            .http
            .post(format!("{API_BASE}/files.upload"))
            .bearer_auth(&self.bot_token)
            .multipart(form)
            .send()
            .await?;
        let value: Value = resp.json().await?;
        check_ok("files.upload", value)?;
        Ok(())
    }

    async fn thread_replies(
        &self,
        channel: &str,
        ts: &str,
        limit: u32,
    ) -> Result<Vec<ThreadMessage>> {
        let limit = limit.to_string();
        let value = self
            .call_get(
                "conversations.replies",
                &[("channel", channel), ("ts", ts), ("limit", &limit)],
            )
            .await?;
        let messages = value
            .get("messages")
            .cloned()
            .unwrap_or(Value::Array(Vec::new()));
        serde_json::from_value(messages)
            .map_err(|e| ChatError::Parse(format!("conversations.replies: {e}")))
    }

    async fn user_info(&self, user: &str) -> Result<UserProfile> {
        let value = self.call_get("users.info", &[("user", user)]).await?;
        let profile = value
            .pointer("/user/profile")
            .cloned()
            .unwrap_or(Value::Null);
        let mut parsed: UserProfile = serde_json::from_value(profile).unwrap_or_default();
        if parsed.real_name.is_empty() {
            if let Some(name) = value.pointer("/user/real_name").and_then(Value::as_str) {
                parsed.real_name = name.to_string();
            }
        }
        Ok(parsed)
    }

    async fn channel_is_im(&self, channel: &str) -> Result<bool> {
        let value = self
            .call_get("conversations.info", &[("channel", channel)])
            .await?;
        Ok(value
            .pointer("/channel/is_im")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    async fn auth_test(&self) -> Result<String> {
        let value = self.call("auth.test", json!({})).await?;
        value
            .get("user_id")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| ChatError::Parse("auth.test response missing user_id".into()))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.bot_token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ChatError::Api {
                code: format!("download_http_{}", resp.status().as_u16()),
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_envelope_passes_through() {
        let value = json!({ "ok": true, "ts": "1712.0001" });
        assert!(check_ok("chat.postMessage", value).is_ok());
    }

    #[test]
    fn error_envelope_yields_api_code() {
        let value = json!({ "ok": false, "error": "channel_not_found" });
        match check_ok("chat.postMessage", value) {
            Err(ChatError::Api { code }) => assert_eq!(code, "channel_not_found"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn missing_ok_treated_as_error() {
        assert!(check_ok("x", json!({})).is_err());
    }
}
