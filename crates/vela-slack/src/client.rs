use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ThreadMessage, UserProfile};

/// Outbound chat-platform operations the engine depends on.
///
/// Implementations must be `Send + Sync`: one client instance is shared by
/// every concurrently running handler. All methods take `&self` so a
/// connected client can be driven from multiple Tokio tasks.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Post a message; returns the new message's `ts`.
    async fn post_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        text: &str,
    ) -> Result<String>;

    /// Edit an existing message in place.
    async fn update_message(&self, channel: &str, ts: &str, text: &str) -> Result<()>;

    async fn delete_message(&self, channel: &str, ts: &str) -> Result<()>;

    /// Upload a local file into a channel (optionally threaded).
    async fn upload_file(
        &self,
        channel: &str,
        path: &Path,
        title: Option<&str>,
        comment: Option<&str>,
        thread_ts: Option<&str>,
    ) -> Result<()>;

    /// Fetch up to `limit` replies of the thread rooted at `ts` (root included).
    async fn thread_replies(&self, channel: &str, ts: &str, limit: u32)
        -> Result<Vec<ThreadMessage>>;

    async fn user_info(&self, user: &str) -> Result<UserProfile>;

    /// True when the channel is a direct-message conversation.
    async fn channel_is_im(&self, channel: &str) -> Result<bool>;

    /// Resolve the bot's own user id.
    async fn auth_test(&self) -> Result<String>;

    /// Download a platform-private URL with the bot bearer token.
    async fn download(&self, url: &str) -> Result<Vec<u8>>;
}
