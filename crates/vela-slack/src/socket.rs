//! Socket-Mode event feed.
//!
//! Opens a Socket-Mode connection (`apps.connections.open` with the
//! app-level token), reads envelopes, acks each one immediately and forwards
//! `message` events into an mpsc channel. The engine never blocks the read
//! loop: slow handlers only back-pressure the channel.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{info, warn};

use crate::error::{ChatError, Result};
use crate::types::ChatEvent;

/// Feed inbound message events into `tx` until the sender side fails
/// permanently. Reconnects on `disconnect` envelopes and socket errors.
pub async fn run_event_feed(app_token: String, tx: mpsc::Sender<ChatEvent>) -> Result<()> {
    let http = reqwest::Client::new();
    loop {
        let url = open_connection(&http, &app_token).await?;
        info!("socket mode: connected");
        match read_until_disconnect(&url, &tx).await {
            Ok(()) => info!("socket mode: server requested reconnect"),
            Err(e) => warn!(error = %e, "socket mode: connection dropped, reconnecting"),
        }
        if tx.is_closed() {
            return Ok(());
        }
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    }
}

async fn open_connection(http: &reqwest::Client, app_token: &str) -> Result<String> {
    let value: Value = http
        .post("https://slack.com/api/apps.connections.open")
        .bearer_auth(app_token)
        .send()
        .await?
        .json()
        .await?;
    if !value.get("ok").and_then(Value::as_bool).unwrap_or(false) {
        let code = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error")
            .to_string();
        return Err(ChatError::Api { code });
    }
    value
        .get("url")
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| ChatError::Parse("apps.connections.open missing url".into()))
}

async fn read_until_disconnect(url: &str, tx: &mpsc::Sender<ChatEvent>) -> Result<()> {
    let (stream, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| ChatError::Socket(e.to_string()))?;
    let (mut write, mut read) = stream.split();

    while let Some(frame) = read.next().await {
        let frame = frame.map_err(|e| ChatError::Socket(e.to_string()))?;
        let text = match frame {
            WsMessage::Text(t) => t.to_string(),
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            WsMessage::Close(_) => return Ok(()),
            _ => continue,
        };

        let envelope: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "socket mode: unparseable envelope");
                continue;
            }
        };

        match envelope.get("type").and_then(Value::as_str) {
            Some("hello") => continue,
            Some("disconnect") => return Ok(()),
            Some("events_api") => {
                // Ack before processing so Slack doesn't redeliver.
                if let Some(envelope_id) = envelope.get("envelope_id").and_then(Value::as_str) {
                    let ack = json!({ "envelope_id": envelope_id }).to_string();
                    write
                        .send(WsMessage::text(ack))
                        .await
                        .map_err(|e| ChatError::Socket(e.to_string()))?;
                }
                if let Some(event) = parse_message_event(&envelope) {
                    if tx.send(event).await.is_err() {
                        return Ok(());
                    }
                }
            }
            _ => continue,
        }
    }
    Ok(())
}

/// Extract a message event from an `events_api` envelope, or `None` for
/// non-message event types.
fn parse_message_event(envelope: &Value) -> Option<ChatEvent> {
    let event = envelope.pointer("/payload/event")?;
    if event.get("type").and_then(Value::as_str) != Some("message") {
        return None;
    }
    serde_json::from_value(event.clone()).ok()
}
