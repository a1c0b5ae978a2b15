use thiserror::Error;

use vela_core::error::{classify_message, Classify, ErrorClass};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Stream error: {0}")]
    Stream(String),
}

impl Classify for ProviderError {
    fn class(&self) -> ErrorClass {
        match self {
            ProviderError::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    ErrorClass::Transient
                } else if e.status().is_some_and(|s| s.is_server_error() || s.as_u16() == 429) {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Internal
                }
            }
            ProviderError::Api { status, message } => {
                let by_message = classify_message(message);
                if by_message == ErrorClass::ContextOverflow {
                    return ErrorClass::ContextOverflow;
                }
                match status {
                    429 => ErrorClass::Transient,
                    s if *s >= 500 => ErrorClass::Transient,
                    401 | 403 => ErrorClass::Auth,
                    404 => ErrorClass::NotFound,
                    _ => by_message,
                }
            }
            ProviderError::Parse(_) => ErrorClass::Internal,
            ProviderError::Stream(msg) => classify_message(msg),
        }
    }
}

impl ProviderError {
    /// True for the "conversation too long" family, which gets special
    /// handling on the mail route.
    pub fn is_context_overflow(&self) -> bool {
        self.class() == ErrorClass::ContextOverflow
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
