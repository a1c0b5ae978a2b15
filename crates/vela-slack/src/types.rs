use serde::{Deserialize, Serialize};

use vela_core::types::FileRef;

/// Inbound message event as carried by the Socket-Mode stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
    /// Present when the author is a bot integration.
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub files: Vec<FileRef>,
}

impl ChatEvent {
    /// True when the author is a bot (integration or app).
    pub fn from_bot(&self) -> bool {
        self.bot_id.is_some() || self.subtype.as_deref() == Some("bot_message")
    }
}

/// One reply of a thread as returned by `conversations.replies`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: String,
}

/// Subset of `users.info` the engine cares about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub real_name: String,
}

impl UserProfile {
    /// Display name, falling back to real name, falling back to the id.
    pub fn best_name(&self, user_id: &str) -> String {
        if !self.display_name.is_empty() {
            self.display_name.clone()
        } else if !self.real_name.is_empty() {
            self.real_name.clone()
        } else {
            user_id.to_string()
        }
    }
}

/// Bot mention token: `<@U...>`.
pub fn mention_token(bot_user_id: &str) -> String {
    format!("<@{bot_user_id}>")
}

pub fn contains_mention(text: &str, bot_user_id: &str) -> bool {
    !bot_user_id.is_empty() && text.contains(&mention_token(bot_user_id))
}

/// Remove every occurrence of the bot mention and trim the remainder.
pub fn strip_mention(text: &str, bot_user_id: &str) -> String {
    text.replace(&mention_token(bot_user_id), "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mention_detection() {
        assert!(contains_mention("<@U057233T98A> oi", "U057233T98A"));
        assert!(!contains_mention("oi pessoal", "U057233T98A"));
        assert!(!contains_mention("<@U057233T98A>", ""));
    }

    #[test]
    fn strip_mention_trims() {
        assert_eq!(strip_mention("<@U1> hello", "U1"), "hello");
        assert_eq!(strip_mention("hello <@U1>", "U1"), "hello");
        assert_eq!(strip_mention("no mention", "U1"), "no mention");
    }

    #[test]
    fn bot_authorship() {
        let mut ev = ChatEvent::default();
        assert!(!ev.from_bot());
        ev.bot_id = Some("B123".into());
        assert!(ev.from_bot());
        let mut ev2 = ChatEvent::default();
        ev2.subtype = Some("bot_message".into());
        assert!(ev2.from_bot());
    }

    #[test]
    fn best_name_fallback_chain() {
        let p = UserProfile { display_name: "".into(), real_name: "Ana Lima".into() };
        assert_eq!(p.best_name("U9"), "Ana Lima");
        let q = UserProfile::default();
        assert_eq!(q.best_name("U9"), "U9");
    }
}
