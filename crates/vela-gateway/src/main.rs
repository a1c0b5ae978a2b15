//! Vela gateway binary: load config, wire the engine, pump Socket-Mode
//! events into the router.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vela_agent::mcp::McpRegistry;
use vela_agent::openai::OpenAiClient;
use vela_agent::provider::ResponsesClient;
use vela_agent::AgentRuntime;
use vela_core::config::VelaConfig;
use vela_engine::router::RequestHandler;
use vela_engine::{EngineState, EventRouter, Orchestrator};
use vela_governor::{ApiPool, RateEnvelope, RateGovernor};
use vela_media::audio::Transcriber;
use vela_media::documents::FileStore;
use vela_slack::socket::run_event_feed;
use vela_slack::web::SlackWebClient;
use vela_slack::ChatClient;

#[derive(Parser)]
#[command(name = "vela", about = "Chat-ops assistant engine")]
struct Cli {
    /// Path to vela.toml (defaults to ./vela.toml, then ~/.vela/vela.toml).
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = VelaConfig::load(cli.config.as_deref()).context("loading configuration")?;

    let chat: Arc<SlackWebClient> = Arc::new(SlackWebClient::new(&config.slack.bot_token));

    // Resolve our own user id unless pinned in config — mention detection
    // depends on it.
    let mut slack_config = config.slack.clone();
    if slack_config.bot_user_id.is_empty() {
        slack_config.bot_user_id = chat.auth_test().await.context("auth.test")?;
        info!(bot_user_id = %slack_config.bot_user_id, "resolved bot identity");
    }

    let openai = Arc::new(OpenAiClient::new(
        &config.openai.api_key,
        &config.openai.base_url,
    ));
    let governor = Arc::new(RateGovernor::new(
        RateEnvelope::from_config(&config.limits.llm),
        RateEnvelope::from_config(&config.limits.integration),
    ));
    let registry = Arc::new(McpRegistry::from_config(&config.mcp));
    if registry.descriptors().is_empty() {
        warn!("no MCP gateway endpoints configured; integration routing disabled");
    }
    let state = Arc::new(EngineState::new());

    let runtime = AgentRuntime::new(
        Arc::clone(&openai) as Arc<dyn ResponsesClient>,
        Arc::clone(&governor),
        Arc::clone(&registry),
        config.agent.clone(),
    );

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&chat) as Arc<dyn ChatClient>,
        runtime,
        Arc::clone(&openai) as Arc<dyn Transcriber>,
        Arc::clone(&openai) as Arc<dyn FileStore>,
        Arc::clone(&state),
        config.agent.clone(),
        slack_config.owner_handle.clone(),
    ));

    let router = EventRouter::new(
        slack_config.clone(),
        Arc::clone(&chat) as Arc<dyn ChatClient>,
        state,
        orchestrator as Arc<dyn RequestHandler>,
    );

    // Periodic governor report: per-pool totals, success rate and average
    // response time.
    let stats_governor = Arc::clone(&governor);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(300));
        tick.tick().await; // the first tick fires immediately
        loop {
            tick.tick().await;
            for pool in [ApiPool::Llm, ApiPool::Integration] {
                let stats = stats_governor.stats(pool);
                if stats.total_requests == 0 {
                    continue;
                }
                info!(
                    pool = pool.name(),
                    total = stats.total_requests,
                    failed = stats.failed_requests,
                    retried = stats.retried_requests,
                    success_rate_pct = stats.success_rate(),
                    avg_response_ms = stats.average_response_time.as_millis() as u64,
                    "governor stats"
                );
            }
        }
    });

    let (tx, mut rx) = mpsc::channel(256);
    let app_token = config.slack.app_token.clone();
    tokio::spawn(async move {
        if let Err(e) = run_event_feed(app_token, tx).await {
            warn!(error = %e, "event feed terminated");
        }
    });

    info!(
        channels = slack_config.allowed_channels.len(),
        development_mode = slack_config.development_mode,
        max_concurrency = config.agent.max_concurrency,
        "vela started, waiting for messages"
    );

    while let Some(event) = rx.recv().await {
        router.dispatch(event).await;
    }

    Ok(())
}
