//! The `+think` sub-flow: direct deep-thinking analysis with the reasoner,
//! bypassing the outer agent. Long analyses are split into chat-sized
//! messages on paragraph boundaries.

use tracing::{error, info};

use vela_agent::tags::format_tags;
use vela_agent::thinking::split_long_message;
use vela_agent::AgentRuntime;
use vela_core::config::AgentConfig;
use vela_core::error::Classify;
use vela_slack::format::format_message_for_slack;
use vela_slack::ChatClient;

use crate::context::{count_tokens, ContextAssembler};
use crate::state::EngineState;

/// Slack message budget for split parts.
const PART_MAX_CHARS: usize = 3_000;

#[allow(clippy::too_many_arguments)]
pub(crate) async fn run(
    chat: &dyn ChatClient,
    runtime: &AgentRuntime,
    assembler: &ContextAssembler,
    state: &EngineState,
    models: &AgentConfig,
    owner_handle: &str,
    channel: &str,
    thread_ts: &str,
    is_dm: bool,
    prompt: &str,
) {
    if prompt.trim().is_empty() {
        let _ = chat
            .post_message(
                channel,
                Some(thread_ts),
                "Por favor, forneça uma mensagem após o comando +think.",
            )
            .await;
        return;
    }

    let header = format_tags(&[models.reasoner_model.clone(), "Thinking".to_string()]);
    let placeholder = format!("{header}\n\n🧠 Analisando cuidadosamente...");
    let message_ts = match chat.post_message(channel, Some(thread_ts), &placeholder).await {
        Ok(ts) => ts,
        Err(e) => {
            error!(channel, error = %e, "think placeholder post failed");
            return;
        }
    };

    // Thread context sharpens the analysis; its absence is not an error.
    let full_prompt = match assembler
        .fetch_thread_history(channel, thread_ts, &models.reasoner_model)
        .await
    {
        Some(history) => format!("Contexto da conversa:\n{history}\n\n{prompt}"),
        None => prompt.to_string(),
    };

    let analysis = match runtime.deep_analysis(&full_prompt).await {
        Ok(a) => a,
        Err(e) => {
            error!(error = %e, "deep analysis failed");
            let _ = chat
                .update_message(channel, &message_ts, &e.class().user_message(owner_handle))
                .await;
            return;
        }
    };

    let thread_key = if is_dm {
        channel.to_string()
    } else {
        format!("{channel}:{thread_ts}")
    };
    let tokens = (count_tokens(&full_prompt) + count_tokens(&analysis)) as u64;
    let warning = state
        .memory_warning(&thread_key, tokens, &models.reasoner_model)
        .unwrap_or("");

    let parts = split_long_message(&analysis, PART_MAX_CHARS);
    info!(parts = parts.len(), chars = analysis.len(), "think analysis complete");

    for (i, part) in parts.iter().enumerate() {
        let is_last = i + 1 == parts.len();
        let footer = if is_last { warning } else { "" };
        let body = format_message_for_slack(part);
        if i == 0 {
            let text = format!("{header}\n\n{body}{footer}");
            let _ = chat.update_message(channel, &message_ts, &text).await;
        } else {
            let _ = chat
                .post_message(channel, Some(thread_ts), &format!("{body}{footer}"))
                .await;
        }
    }
}
