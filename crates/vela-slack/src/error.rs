use thiserror::Error;

use vela_core::error::{classify_message, Classify, ErrorClass};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Slack replied `ok: false` with an error code (e.g. `channel_not_found`).
    #[error("Slack API error: {code}")]
    Api { code: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("WebSocket error: {0}")]
    Socket(String),
}

impl Classify for ChatError {
    fn class(&self) -> ErrorClass {
        match self {
            ChatError::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    ErrorClass::Transient
                } else if e.status().is_some_and(|s| s.is_server_error() || s.as_u16() == 429) {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Internal
                }
            }
            ChatError::Api { code } => match code.as_str() {
                "rate_limited" | "ratelimited" | "service_unavailable" => ErrorClass::Transient,
                "invalid_auth" | "not_authed" | "missing_scope" | "not_in_channel"
                | "restricted_action" => ErrorClass::Auth,
                "channel_not_found" | "message_not_found" | "user_not_found" => {
                    ErrorClass::NotFound
                }
                other => classify_message(other),
            },
            ChatError::Parse(_) => ErrorClass::Internal,
            ChatError::Socket(msg) => classify_message(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
