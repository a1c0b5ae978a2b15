use thiserror::Error;

use vela_core::error::{classify_message, Classify, ErrorClass};
use vela_slack::ChatError;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Chat platform error: {0}")]
    Chat(#[from] ChatError),

    #[error("File store error: {0}")]
    Store(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("File '{name}' too large: {size} bytes (max {max})")]
    TooLarge { name: String, size: u64, max: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Classify for MediaError {
    fn class(&self) -> ErrorClass {
        match self {
            MediaError::Chat(e) => e.class(),
            MediaError::Store(msg) | MediaError::Transcription(msg) => classify_message(msg),
            MediaError::TooLarge { .. } => ErrorClass::Resource,
            MediaError::Io(_) => ErrorClass::Resource,
        }
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;
