//! Thread-context assembler: fetch replies, resolve display names, trim to
//! the model's context budget, format as `[name]: text` lines.

use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use tracing::{debug, warn};

use vela_core::config::model_context_limit;
use vela_slack::ChatClient;

/// Safety margin kept free below the window.
const CONTEXT_MARGIN: u32 = 1_000;
/// Tokens reserved for the model's response.
const RESPONSE_RESERVE: u32 = 4_000;
/// Replies fetched per thread before trimming.
const HISTORY_LIMIT: u32 = 100;

static BPE: LazyLock<tiktoken_rs::CoreBPE> =
    LazyLock::new(|| tiktoken_rs::cl100k_base().expect("embedded tokenizer data"));

/// Token count for accounting and trimming. cl100k is close enough for
/// every model we run; exact per-model encodings don't change the trim
/// decisions materially.
pub fn count_tokens(text: &str) -> u32 {
    BPE.encode_with_special_tokens(text).len() as u32
}

/// A formatted history line ready for trimming.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryLine {
    pub author: String,
    pub text: String,
}

impl HistoryLine {
    fn formatted(&self) -> String {
        format!("[{}]: {}", self.author, self.text)
    }
}

pub struct ContextAssembler {
    client: Arc<dyn ChatClient>,
    /// user id → display name. Names don't change mid-process; a plain
    /// insert-only cache is enough.
    names: DashMap<String, String>,
}

impl ContextAssembler {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self {
            client,
            names: DashMap::new(),
        }
    }

    /// Fetch and format the thread history, trimmed to the model's budget.
    ///
    /// Fails soft: any platform error returns `None` and the caller
    /// proceeds without history.
    pub async fn fetch_thread_history(
        &self,
        channel: &str,
        thread_ts: &str,
        model: &str,
    ) -> Option<String> {
        let replies = match self
            .client
            .thread_replies(channel, thread_ts, HISTORY_LIMIT)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(channel, thread_ts, error = %e, "thread history fetch failed");
                return None;
            }
        };
        if replies.is_empty() {
            return None;
        }

        let mut lines = Vec::with_capacity(replies.len());
        for msg in &replies {
            let author = self.display_name(&msg.user).await;
            lines.push(HistoryLine {
                author,
                text: msg.text.clone(),
            });
        }

        let kept = trim_to_window(&lines, model_context_limit(model));
        if kept.len() < lines.len() {
            debug!(
                removed = lines.len() - kept.len(),
                kept = kept.len(),
                "history trimmed to context window"
            );
        }

        let mut out = String::from("Histórico da Thread:\n");
        for line in &kept {
            out.push_str(&line.formatted());
            out.push('\n');
        }
        Some(out)
    }

    async fn display_name(&self, user: &str) -> String {
        if user.is_empty() {
            return "Desconhecido".to_string();
        }
        if let Some(name) = self.names.get(user) {
            return name.clone();
        }
        let name = match self.client.user_info(user).await {
            Ok(profile) => profile.best_name(user),
            Err(_) => user.to_string(),
        };
        self.names.insert(user.to_string(), name.clone());
        name
    }
}

/// Keep the newest messages whose formatted token sum fits under
/// `context_limit - RESPONSE_RESERVE - CONTEXT_MARGIN`, preserving order
/// (oldest retained first).
pub fn trim_to_window(lines: &[HistoryLine], context_limit: u32) -> Vec<HistoryLine> {
    let budget = context_limit
        .saturating_sub(RESPONSE_RESERVE)
        .saturating_sub(CONTEXT_MARGIN);

    let mut kept = Vec::new();
    let mut total: u32 = 0;
    for line in lines.iter().rev() {
        let cost = count_tokens(&line.formatted());
        if total + cost > budget {
            break;
        }
        total += cost;
        kept.push(line.clone());
    }
    kept.reverse();
    kept
}
