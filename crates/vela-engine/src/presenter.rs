//! Streaming presenter: one editable message per request.
//!
//! Lifecycle: placeholder with the initial tag header → header-only on the
//! first delta → gated `header + formatted(accumulated)` edits → one final
//! edit. The circuit breaker freezes the message once streaming misbehaves;
//! the last successful edit stays up.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{error, warn};

use vela_agent::tags::{derive_tags, format_tags, TagInputs};
use vela_agent::{StreamSink, ToolCallEvent};
use vela_core::config::AgentConfig;
use vela_slack::format::format_message_for_slack;
use vela_slack::ChatClient;

/// Abort streaming after this much wall-clock time.
const MAX_STREAM_DURATION: Duration = Duration::from_secs(120);
/// Abort once the accumulated text grows past this.
const MAX_RESPONSE_CHARS: usize = 8_000;
/// Abort after this many edit operations.
const MAX_EDITS: u32 = 200;

/// Minimum growth between edits.
const EDIT_CHAR_GATE: usize = 10;
/// Minimum time between edits.
const EDIT_TIME_GATE: Duration = Duration::from_millis(500);

pub const PLACEHOLDER_TEXT: &str = ":hourglass_flowing_sand: Pensando...";

struct PresenterState {
    header: String,
    sent_header: bool,
    last_edit_len: usize,
    last_edit_at: Instant,
    edits: u32,
    started: Instant,
    tripped: bool,
    last_accumulated: String,
    tool_calls: Vec<ToolCallEvent>,
}

/// Owns the single editable message for one request. Implements
/// [`StreamSink`], so the pipelines drive it directly.
pub struct Presenter {
    client: Arc<dyn ChatClient>,
    channel: String,
    ts: String,
    user_text: String,
    has_images: bool,
    has_audio: bool,
    models: AgentConfig,
    state: Mutex<PresenterState>,
}

impl Presenter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<dyn ChatClient>,
        channel: impl Into<String>,
        ts: impl Into<String>,
        initial_header: impl Into<String>,
        user_text: impl Into<String>,
        has_images: bool,
        has_audio: bool,
        models: AgentConfig,
    ) -> Self {
        let now = Instant::now();
        Self {
            client,
            channel: channel.into(),
            ts: ts.into(),
            user_text: user_text.into(),
            has_images,
            has_audio,
            models,
            state: Mutex::new(PresenterState {
                header: initial_header.into(),
                sent_header: false,
                last_edit_len: 0,
                last_edit_at: now,
                edits: 0,
                started: now,
                tripped: false,
                last_accumulated: String::new(),
                tool_calls: Vec::new(),
            }),
        }
    }

    /// The message ts this presenter owns.
    pub fn message_ts(&self) -> &str {
        &self.ts
    }

    /// Whether the circuit breaker has tripped.
    pub async fn tripped(&self) -> bool {
        self.state.lock().await.tripped
    }

    /// Final edit: full response + final header (+ optional footer). If the
    /// breaker tripped, the last successful edit stays as the final message.
    /// If the edit itself fails, exactly one fallback message is posted.
    pub async fn finalize(&self, response_text: &str, footer: &str) {
        let header = {
            let state = self.state.lock().await;
            if state.tripped {
                return;
            }
            self.header_for(&state.tool_calls, response_text)
        };
        let body = format_message_for_slack(&format!("{response_text}{footer}"));
        let full = format!("{header}\n\n{body}");

        if let Err(e) = self
            .client
            .update_message(&self.channel, &self.ts, &full)
            .await
        {
            warn!(error = %e, "final edit failed, posting fallback message");
            if let Err(e2) = self
                .client
                .post_message(&self.channel, Some(&self.ts), &full)
                .await
            {
                error!(error = %e2, "fallback post also failed");
            }
        }
    }

    /// Replace the message with a fixed error text (never model-generated).
    pub async fn fail(&self, message: &str) {
        let _ = self
            .client
            .update_message(&self.channel, &self.ts, message)
            .await;
    }

    fn header_for(&self, tool_calls: &[ToolCallEvent], response_text: &str) -> String {
        let tags = derive_tags(&TagInputs {
            tool_calls,
            has_images: self.has_images,
            has_audio: self.has_audio,
            user_text: &self.user_text,
            response_text,
            models: &self.models,
        });
        format_tags(&tags)
    }

    /// Check the breaker conditions; marks and logs the trip.
    fn check_breaker(state: &mut PresenterState, accumulated: &str) -> bool {
        if state.tripped {
            return true;
        }
        let elapsed = state.started.elapsed();
        let reason = if elapsed > MAX_STREAM_DURATION {
            Some("stream timeout")
        } else if accumulated.len() > MAX_RESPONSE_CHARS {
            Some("response too long")
        } else if state.edits > MAX_EDITS {
            Some("too many edits")
        } else if is_repetitive(accumulated) {
            Some("repetitive content")
        } else {
            None
        };
        if let Some(reason) = reason {
            error!(
                reason,
                elapsed_secs = elapsed.as_secs(),
                chars = accumulated.len(),
                edits = state.edits,
                "circuit breaker tripped, freezing message"
            );
            state.tripped = true;
        }
        state.tripped
    }
}

#[async_trait]
impl StreamSink for Presenter {
    async fn on_delta(&self, delta: &str, accumulated: &str) {
        let mut state = self.state.lock().await;
        if Self::check_breaker(&mut state, accumulated) {
            return;
        }
        state.last_accumulated = accumulated.to_string();

        // First delta: replace the placeholder with the header alone.
        if !state.sent_header {
            let header = state.header.clone();
            if let Err(e) = self
                .client
                .update_message(&self.channel, &self.ts, &header)
                .await
            {
                warn!(error = %e, "failed to set header before streaming");
            }
            state.sent_header = true;
            state.edits += 1;
            state.last_edit_len = 0;
            state.last_edit_at = Instant::now();
            return;
        }

        let should_update = accumulated.len().saturating_sub(state.last_edit_len)
            >= EDIT_CHAR_GATE
            || state.last_edit_at.elapsed() >= EDIT_TIME_GATE
            || delta.is_empty();

        if should_update && !accumulated.is_empty() {
            let text = format!(
                "{}\n\n{}",
                state.header,
                format_message_for_slack(accumulated)
            );
            match self
                .client
                .update_message(&self.channel, &self.ts, &text)
                .await
            {
                Ok(()) => {
                    state.edits += 1;
                    state.last_edit_len = accumulated.len();
                    state.last_edit_at = Instant::now();
                }
                Err(e) => warn!(error = %e, "streaming edit failed"),
            }
        }
    }

    async fn on_tool_calls(&self, calls: &[ToolCallEvent]) {
        let mut state = self.state.lock().await;
        if state.tripped {
            return;
        }
        state.tool_calls = calls.to_vec();
        let accumulated = state.last_accumulated.clone();
        // Recomputed header lands with the next edit.
        state.header = self.header_for(&state.tool_calls, &accumulated);
    }
}

/// Repetition detector: the last 50 chars appearing verbatim in the
/// preceding 100 signal a degenerate loop.
fn is_repetitive(text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= 150 {
        return false;
    }
    let tail: String = chars[chars.len() - 50..].iter().collect();
    let window: String = chars[chars.len() - 150..chars.len() - 50].iter().collect();
    window.contains(&tail)
}
