use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Process-wide handler concurrency bound when not configured.
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

/// Default cap on thread replies fetched for context assembly.
pub const DEFAULT_HISTORY_LIMIT: u32 = 100;

/// Top-level config (vela.toml + VELA_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelaConfig {
    pub slack: SlackConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub mcp: McpGatewayConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Bot token (`xoxb-...`) — Web API calls and private file downloads.
    pub bot_token: String,
    /// App-level token (`xapp-...`) — Socket Mode connections.
    pub app_token: String,
    /// Workspace/team id, for logging only.
    #[serde(default)]
    pub team_id: String,
    /// The bot's own user id. Resolved via auth.test at startup when empty.
    #[serde(default)]
    pub bot_user_id: String,
    /// Channels the bot is permitted to respond in.
    #[serde(default)]
    pub allowed_channels: Vec<String>,
    /// Users allowed to DM the bot (production mode only).
    #[serde(default)]
    pub allowed_users: Vec<String>,
    /// Development mode: the channel allow-list is the sole rule, DMs denied.
    #[serde(default = "bool_true")]
    pub development_mode: bool,
    /// Mention handle appended to fixed error messages for escalation.
    #[serde(default = "default_owner_handle")]
    pub owner_handle: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Default text model.
    #[serde(default = "default_text_model")]
    pub text_model: String,
    /// Model used when image inputs are present.
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    /// Reasoner model backing the deep-thinking sub-agent.
    #[serde(default = "default_reasoner_model")]
    pub reasoner_model: String,
    /// Process-wide handler semaphore size.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            text_model: default_text_model(),
            vision_model: default_vision_model(),
            reasoner_model: default_reasoner_model(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

/// Per-service MCP gateway endpoint. The slug keys the static registry;
/// URL and credential are secrets and therefore live here, not in code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpEndpoint {
    pub slug: String,
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpGatewayConfig {
    #[serde(default)]
    pub endpoints: Vec<McpEndpoint>,
}

/// Rate-envelope knobs for one API pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeConfig {
    pub max_concurrent: usize,
    pub requests_per_minute: usize,
    pub requests_per_hour: usize,
    pub retry_attempts: u32,
    /// Minimum backoff in seconds.
    pub min_wait_secs: f64,
    /// Maximum backoff in seconds.
    pub max_wait_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_llm_envelope")]
    pub llm: EnvelopeConfig,
    #[serde(default = "default_integration_envelope")]
    pub integration: EnvelopeConfig,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            llm: default_llm_envelope(),
            integration: default_integration_envelope(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_owner_handle() -> String {
    "<@U046LTU4TT5>".to_string()
}
fn default_text_model() -> String {
    "gpt-4.1-mini".to_string()
}
fn default_vision_model() -> String {
    "gpt-4o".to_string()
}
fn default_reasoner_model() -> String {
    "o3-mini".to_string()
}
fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}
fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_llm_envelope() -> EnvelopeConfig {
    EnvelopeConfig {
        max_concurrent: 8,
        requests_per_minute: 500,
        requests_per_hour: 10_000,
        retry_attempts: 5,
        min_wait_secs: 1.0,
        max_wait_secs: 60.0,
    }
}

fn default_integration_envelope() -> EnvelopeConfig {
    EnvelopeConfig {
        max_concurrent: 3,
        requests_per_minute: 60,
        requests_per_hour: 75,
        retry_attempts: 3,
        min_wait_secs: 2.0,
        max_wait_secs: 30.0,
    }
}

impl VelaConfig {
    /// Load config from a TOML file with VELA_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ./vela.toml
    ///   3. ~/.vela/vela.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: VelaConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("VELA_").split("__"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    if std::path::Path::new("vela.toml").exists() {
        return "vela.toml".to_string();
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.vela/vela.toml")
}

/// Context-window sizes per model; 128k for everything we currently run.
pub fn model_context_limit(model: &str) -> u32 {
    match model {
        "gpt-4o" | "gpt-4o-mini" | "gpt-4.1-mini" | "o3-mini" => 128_000,
        _ => 128_000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_envelopes_match_published_limits() {
        let limits = LimitsConfig::default();
        assert_eq!(limits.llm.max_concurrent, 8);
        assert_eq!(limits.llm.requests_per_minute, 500);
        assert_eq!(limits.llm.requests_per_hour, 10_000);
        assert_eq!(limits.llm.retry_attempts, 5);
        assert_eq!(limits.integration.max_concurrent, 3);
        assert_eq!(limits.integration.requests_per_minute, 60);
        assert_eq!(limits.integration.requests_per_hour, 75);
        assert_eq!(limits.integration.retry_attempts, 3);
    }

    #[test]
    fn agent_defaults() {
        let agent = AgentConfig::default();
        assert_eq!(agent.text_model, "gpt-4.1-mini");
        assert_eq!(agent.vision_model, "gpt-4o");
        assert_eq!(agent.reasoner_model, "o3-mini");
        assert_eq!(agent.max_concurrency, 5);
    }

    #[test]
    fn context_limit_has_fallback() {
        assert_eq!(model_context_limit("gpt-4o"), 128_000);
        assert_eq!(model_context_limit("some-future-model"), 128_000);
    }
}
