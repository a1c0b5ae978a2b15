//! Integration (MCP) pipeline.
//!
//! One streamer, parameterized by a per-service profile: system prompt,
//! enhanced multi-turn instructions, and the mail narrowed-retry handler.
//! Every outbound descriptor carries `tool_choice = "required"` — an
//! integration-routed message must act, not chat.
//!
//! Fallback chain: enhanced multi-turn → generic instructions → (caller
//! falls back to the native agent pipeline). The mail service additionally
//! gets exactly one maximally restrictive retry on context overflow.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use vela_governor::{ApiPool, RateGovernor};

use crate::error::{ProviderError, Result};
use crate::mcp::{McpDescriptor, McpService};
use crate::provider::{
    GeneratedImage, PipelineResult, ResponsesClient, ResponsesInput, ResponsesRequest, StreamSink,
};
use crate::stream::RunnerEvent;

pub struct McpPipeline {
    client: Arc<dyn ResponsesClient>,
    governor: Arc<RateGovernor>,
    model: String,
}

impl McpPipeline {
    pub fn new(
        client: Arc<dyn ResponsesClient>,
        governor: Arc<RateGovernor>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            governor,
            model: model.into(),
        }
    }

    /// Run the integration pipeline for an already-routed message.
    ///
    /// `Err` means every MCP attempt failed and the caller should fall back
    /// to the native agent — except a mail context overflow, which has
    /// already consumed its one narrowed retry and must surface as-is.
    pub async fn run(
        &self,
        descriptor: &McpDescriptor,
        text: &str,
        image_urls: &[String],
        sink: &dyn StreamSink,
    ) -> Result<PipelineResult> {
        let service = descriptor.service;
        info!(service = service.slug(), "mcp pipeline: enhanced multi-turn attempt");

        let enhanced = self
            .stream_once(descriptor, text, image_urls, &enhanced_instructions(service), sink)
            .await;
        let first_err = match enhanced {
            Ok(result) => return Ok(result),
            Err(e) => {
                warn!(service = service.slug(), error = %e, "enhanced multi-turn failed");
                e
            }
        };

        if service == McpService::Mail && first_err.is_context_overflow() {
            return self.narrowed_mail_retry(descriptor).await.map_err(|e| {
                warn!(error = %e, "mail narrowed retry failed");
                first_err
            });
        }

        info!(service = service.slug(), "mcp pipeline: generic attempt");
        match self
            .stream_once(descriptor, text, image_urls, &generic_instructions(service), sink)
            .await
        {
            Ok(result) => Ok(result),
            Err(e) if service == McpService::Mail && e.is_context_overflow() => {
                self.narrowed_mail_retry(descriptor).await.map_err(|retry| {
                    warn!(error = %retry, "mail narrowed retry failed");
                    e
                })
            }
            Err(e) => {
                warn!(service = service.slug(), error = %e, "generic mcp attempt failed");
                Err(e)
            }
        }
    }

    async fn stream_once(
        &self,
        descriptor: &McpDescriptor,
        text: &str,
        image_urls: &[String],
        instructions: &str,
        sink: &dyn StreamSink,
    ) -> Result<PipelineResult> {
        let req = ResponsesRequest {
            model: self.model.clone(),
            input: ResponsesInput::with_images(text, image_urls),
            instructions: Some(instructions.to_string()),
            tools: vec![descriptor.tool_json()],
            tool_choice: Some("required".to_string()),
        };

        self.governor
            .execute(ApiPool::Integration, "mcp_stream", || {
                drive_stream(Arc::clone(&self.client), req.clone(), sink)
            })
            .await
    }

    /// One maximally restrictive, non-streaming mail retry.
    async fn narrowed_mail_retry(&self, descriptor: &McpDescriptor) -> Result<PipelineResult> {
        info!("mail context overflow, retrying with narrowed prompt");
        let req = ResponsesRequest {
            model: self.model.clone(),
            input: ResponsesInput::Text(
                "Busque apenas o último email recebido na caixa de entrada e faça um resumo muito breve"
                    .to_string(),
            ),
            instructions: Some(NARROWED_MAIL_INSTRUCTIONS.to_string()),
            tools: vec![descriptor.tool_json()],
            tool_choice: Some("required".to_string()),
        };
        let text = self
            .governor
            .execute(ApiPool::Integration, "mcp_mail_narrowed", || {
                let client = Arc::clone(&self.client);
                let req = req.clone();
                async move { client.complete(&req).await }
            })
            .await?;
        Ok(PipelineResult {
            text,
            ..Default::default()
        })
    }
}

/// Consume one streamed response: forward deltas and tool calls to the
/// sink, accumulate the result. Shared by the MCP and agent pipelines.
pub(crate) async fn drive_stream(
    client: Arc<dyn ResponsesClient>,
    req: ResponsesRequest,
    sink: &dyn StreamSink,
) -> Result<PipelineResult> {
    let (tx, mut rx) = mpsc::channel::<RunnerEvent>(64);
    let stream_client = Arc::clone(&client);
    let stream_req = req.clone();
    let handle =
        tokio::spawn(async move { stream_client.stream(&stream_req, tx).await });

    let mut result = PipelineResult::default();
    let mut stream_error: Option<String> = None;

    while let Some(event) = rx.recv().await {
        match event {
            RunnerEvent::TextDelta { delta } => {
                result.text.push_str(&delta);
                sink.on_delta(&delta, &result.text).await;
            }
            RunnerEvent::ToolCall(call) => {
                debug!(tool = %call.name, "tool call observed");
                result.tool_calls.push(call);
                sink.on_tool_calls(&result.tool_calls).await;
            }
            RunnerEvent::ToolOutput { name, output } => {
                debug!(tool = %name, bytes = output.len(), "tool output");
            }
            RunnerEvent::MessageOutput { text } => {
                if text != result.text && !text.is_empty() {
                    result.text = text;
                    sink.on_delta("", &result.text).await;
                }
            }
            RunnerEvent::ImageGenerated { b64, revised_prompt } => {
                result.generated_image = Some(GeneratedImage { b64, revised_prompt });
            }
            RunnerEvent::Completed { usage } => {
                result.usage = usage;
            }
            RunnerEvent::Error { message } => {
                warn!(message, "stream error event");
                stream_error = Some(message);
            }
        }
    }

    handle
        .await
        .map_err(|e| ProviderError::Stream(format!("stream task panicked: {e}")))??;

    if result.text.is_empty() {
        if let Some(message) = stream_error {
            return Err(ProviderError::Stream(message));
        }
    }

    Ok(result)
}

const NARROWED_MAIL_INSTRUCTIONS: &str = "You are Vela, a chat-ops assistant. \
Search for the latest email in inbox using the 'in:inbox' operator.\n\
CRITICAL: Return only a 2-sentence summary in Portuguese.\n\
Format: 'Último email de [sender] com assunto \"[subject]\". [Brief summary].'\n\
NEVER return full email content - only essential information.";

/// Service-specific step-by-step usage rules.
fn generic_instructions(service: McpService) -> String {
    let base = match service {
        McpService::TimeTracker => {
            "TIME TRACKER AVAILABLE COMMANDS:\n\
             SEARCH & FIND: find_project, find_section, find_member, find_task\n\
             CREATE & MANAGE: create_client, create_project, create_section, create_task\n\
             TIME TRACKING: start_timer, stop_timer, add_time\n\n\
             TIME TRACKING WORKFLOW:\n\
             - Step 1: Use find_project to find the project\n\
             - Step 2: Use find_task to find the specific task\n\
             - Step 3: If the task is not found, try list_tasks for the project\n\
             - Step 4: Use add_time with exact parameters\n\
             - Time format: 1h, 2h, 30m (examples: '2h', '1.5h', '30m')\n\
             - Task ids look like ev:273393148295192; when the user provides one, use it directly\n\n\
             DATE & TIME HANDLING (Timezone: America/Sao_Paulo):\n\
             - 'hoje' / 'today' = current date in Brazil timezone\n\
             - 'ontem' / 'yesterday' = previous day\n\
             - Always convert relative dates to YYYY-MM-DD format\n\n\
             FALLBACK STRATEGY:\n\
             If find_task returns {}, try list_tasks or use a task id given by the user\n\n\
             RESPONSE FORMAT:\n\
             SUCCESS: 'Tempo adicionado com sucesso! [time] na task [task_name] ([task_id])'\n\
             ERROR: 'Erro: [details]'\n\n\
             GOAL: Add time efficiently and provide clear feedback in Portuguese."
        }
        McpService::Mail => {
            "Use mail tools to search and read emails.\n\n\
             STEP-BY-STEP APPROACH:\n\
             1. First: search with the query 'in:inbox'\n\
             2. Then: read the first email from the results\n\
             3. Finally: summarize the email content\n\n\
             SEARCH EXAMPLES:\n\
             - Latest emails: 'in:inbox'\n\
             - Unread emails: 'is:unread'\n\
             - Recent emails: 'newer_than:1d'\n\n\
             RESPONSE FORMAT (Portuguese):\n\
             De: [sender]\nAssunto: [subject]\nData: [date]\nResumo: [2-3 sentences]\n\n\
             Summarize content - never return full email text."
        }
        McpService::Calendar => {
            "Use calendar tools to search and manage events.\n\n\
             Search Strategy:\n\
             - Use dynamic date parameters: start_date='today', end_date='next week'\n\
             - Default range: today to next 7 days\n\
             - Timezone: America/Sao_Paulo\n\
             - If no events are found, widen the date range\n\n\
             Response Format (Portuguese):\n\
             1. [Nome do Evento]\n   - Data: [data]\n   - Horário: [início] às [fim]\n   - Link: [se disponível]"
        }
        McpService::ChatBridge => {
            "Use the message-search tool with 'in:channel-name' queries, sorted by \
             timestamp descending.\n\
             Return: user, timestamp, message content, permalink, and a summary in Portuguese."
        }
        _ => {
            "Sequential search: workspace → project → task.\n\
             Always include ALL ids/numbers from responses. Limit 4 results. Portuguese responses.\n\
             Example: 'Found project Inovação (id:123) with task Name (id:456)'"
        }
    };
    format!(
        "You are Vela, a chat-ops assistant with {} access.\n\n{}",
        service.display_name(),
        base
    )
}

/// Enhanced multi-turn instructions: same rules, plus an explicit directive
/// to chain tool calls across turns within one streamed response.
fn enhanced_instructions(service: McpService) -> String {
    format!(
        "{}\n\n\
         MULTI-TURN EXECUTION STRATEGY:\n\
         1. ANALYZE the user request to identify all required steps\n\
         2. EXECUTE each step sequentially using available tools\n\
         3. CONTINUE until the complete workflow is finished\n\
         4. RESPOND only when the entire task is completed\n\n\
         CRITICAL RULES:\n\
         1. You MUST use the integration tools - never respond without calling tools\n\
         2. Do NOT respond to the user until ALL required steps are completed\n\
         3. Use results from previous calls to inform next steps",
        generic_instructions(service)
    )
}
