//! Slack platform surface: inbound event shape, the `ChatClient` trait the
//! engine talks to, the reqwest Web-API implementation, the Socket-Mode
//! event feed and the markdown→mrkdwn formatter.

pub mod client;
pub mod error;
pub mod format;
pub mod socket;
pub mod types;
pub mod web;

pub use client::ChatClient;
pub use error::ChatError;
pub use types::{ChatEvent, ThreadMessage, UserProfile};
