//! Process-wide shared state: per-thread token counters and vector-index
//! handles, the event dedupe cache, and the resolved-DM cache.
//!
//! All state is in-process and ephemeral. Vector-index handles outlive a
//! thread only until the provider evicts them (1-day last-active TTL).

use std::num::NonZeroUsize;
use std::sync::Mutex;

use dashmap::DashMap;
use lru::LruCache;

use vela_core::config::model_context_limit;

/// Bounded LRU instead of a reset-at-capacity set: a just-seen event can
/// never be re-admitted by a cache flush.
const DEDUPE_CAPACITY: usize = 4096;

/// Hard memory-limit warning, appended at ≥100 % of the model window.
pub const MEMORY_LIMIT_WARNING: &str =
    "\n\n⚠️ Você chegou no limite de memória, comece uma nova conversa.";

/// Soft warning at ≥90 %.
pub const MEMORY_SOFT_WARNING: &str =
    "\n\n⚠️ A conversa está se aproximando do limite de memória.";

#[derive(Debug, Default, Clone)]
struct ThreadState {
    /// Cumulative tokens across all responses in this thread. Monotonic for
    /// the process lifetime.
    tokens_used: u64,
    vector_store_id: Option<String>,
}

pub struct EngineState {
    threads: DashMap<String, ThreadState>,
    dedupe: Mutex<LruCache<String, ()>>,
    /// Channels confirmed as DMs with an allowed user (production mode).
    allowed_dm_channels: DashMap<String, ()>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineState {
    pub fn new() -> Self {
        Self {
            threads: DashMap::new(),
            dedupe: Mutex::new(LruCache::new(
                NonZeroUsize::new(DEDUPE_CAPACITY).unwrap(),
            )),
            allowed_dm_channels: DashMap::new(),
        }
    }

    /// Record the event key; returns `true` if it was already present.
    /// Insertion happens before any work begins, so a duplicate event is a
    /// guaranteed no-op.
    pub fn seen_before(&self, channel: &str, ts: &str, user: &str) -> bool {
        let key = format!("{channel}_{ts}_{user}");
        let mut cache = self.dedupe.lock().unwrap();
        cache.put(key, ()).is_some()
    }

    /// Add to the thread's token counter and return the new total.
    pub fn add_tokens(&self, thread_key: &str, tokens: u64) -> u64 {
        let mut entry = self.threads.entry(thread_key.to_string()).or_default();
        entry.tokens_used += tokens;
        entry.tokens_used
    }

    pub fn tokens_used(&self, thread_key: &str) -> u64 {
        self.threads
            .get(thread_key)
            .map(|t| t.tokens_used)
            .unwrap_or(0)
    }

    pub fn vector_store(&self, thread_key: &str) -> Option<String> {
        self.threads
            .get(thread_key)
            .and_then(|t| t.vector_store_id.clone())
    }

    pub fn set_vector_store(&self, thread_key: &str, vector_store_id: &str) {
        let mut entry = self.threads.entry(thread_key.to_string()).or_default();
        entry.vector_store_id = Some(vector_store_id.to_string());
    }

    /// Memory-limit footer for the thread after `total_tokens` more tokens
    /// were spent: hard warning at ≥100 % of the model window, soft at ≥90 %.
    pub fn memory_warning(
        &self,
        thread_key: &str,
        total_tokens: u64,
        model: &str,
    ) -> Option<&'static str> {
        let used = self.add_tokens(thread_key, total_tokens);
        let limit = model_context_limit(model) as u64;
        let percent = used * 100 / limit;
        if percent >= 100 {
            Some(MEMORY_LIMIT_WARNING)
        } else if percent >= 90 {
            Some(MEMORY_SOFT_WARNING)
        } else {
            None
        }
    }

    pub fn mark_dm_allowed(&self, channel: &str) {
        self.allowed_dm_channels.insert(channel.to_string(), ());
    }

    pub fn is_known_dm(&self, channel: &str) -> bool {
        self.allowed_dm_channels.contains_key(channel)
    }
}
