use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A file attached to a chat message, as reported by the platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mimetype: String,
    #[serde(default)]
    pub size: u64,
    /// Platform-private download URL; fetching requires the bot bearer token.
    #[serde(default)]
    pub url_private: String,
}

/// The unit of work produced by the event router. Immutable once built.
#[derive(Debug, Clone)]
pub struct Request {
    /// Correlation id for log lines across the pipeline.
    pub id: Uuid,
    pub channel: String,
    /// Thread the response belongs to. For a mention outside a thread this is
    /// the triggering message's ts (the mention roots a new thread).
    pub thread_ts: String,
    pub user: String,
    /// Message text with the bot mention stripped.
    pub text: String,
    /// Image references: attachment URLs plus inline URLs found in the text.
    pub image_urls: Vec<String>,
    pub audio: Vec<FileRef>,
    pub documents: Vec<FileRef>,
    /// Set when the channel is a direct message (everything is eligible).
    pub is_dm: bool,
    /// Optional per-request model id overriding the configured default.
    pub model_override: Option<String>,
}

impl Request {
    /// Key into the per-thread state map. DMs are keyed by channel alone so
    /// the whole conversation shares one token counter and vector index.
    pub fn thread_key(&self) -> String {
        if self.is_dm {
            self.channel.clone()
        } else {
            format!("{}:{}", self.channel, self.thread_ts)
        }
    }
}

/// One message of a thread's reconstructed history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub author: String,
    pub text: String,
    pub ts: String,
}

/// Convenience constructor used by the router and by tests.
pub fn new_request(channel: &str, thread_ts: &str, user: &str, text: &str) -> Request {
    Request {
        id: Uuid::new_v4(),
        channel: channel.to_string(),
        thread_ts: thread_ts.to_string(),
        user: user.to_string(),
        text: text.to_string(),
        image_urls: Vec::new(),
        audio: Vec::new(),
        documents: Vec::new(),
        is_dm: false,
        model_override: None,
    }
}
