//! Top of the model-side stack: route a cleaned message to the MCP pipeline
//! (keyword match) or the native agent, with the documented fallback chain.

use std::sync::Arc;

use tracing::{info, warn};

use vela_core::config::AgentConfig;
use vela_governor::RateGovernor;

use crate::agent_pipeline::{AgentPipeline, AgentRunSpec};
use crate::error::Result;
use crate::mcp::{McpRegistry, McpService};
use crate::mcp_pipeline::McpPipeline;
use crate::provider::{PipelineResult, ResponsesClient, StreamSink};

pub struct AgentRuntime {
    registry: Arc<McpRegistry>,
    mcp: McpPipeline,
    agent: AgentPipeline,
}

/// Inputs for one routed run.
pub struct ProcessSpec<'a> {
    /// Cleaned text, with thread history and media transcriptions folded in.
    pub text: &'a str,
    /// The user's own message, without history — keyword routing must not
    /// trigger on words other people used earlier in the thread.
    pub routing_text: &'a str,
    pub image_urls: &'a [String],
    pub vector_store_id: Option<&'a str>,
    pub model_override: Option<&'a str>,
}

impl AgentRuntime {
    pub fn new(
        client: Arc<dyn ResponsesClient>,
        governor: Arc<RateGovernor>,
        registry: Arc<McpRegistry>,
        models: AgentConfig,
    ) -> Self {
        let mcp = McpPipeline::new(
            Arc::clone(&client),
            Arc::clone(&governor),
            models.text_model.clone(),
        );
        let agent = AgentPipeline::new(client, governor, Arc::clone(&registry), models);
        Self {
            registry,
            mcp,
            agent,
        }
    }

    /// Route and run. Integration keyword match goes through the MCP
    /// pipeline (with its internal enhanced→generic chain); any MCP failure
    /// except a mail context overflow falls back to the native agent.
    pub async fn process(
        &self,
        spec: &ProcessSpec<'_>,
        sink: &dyn StreamSink,
    ) -> Result<PipelineResult> {
        if let Some(descriptor) = self.registry.detect(spec.routing_text) {
            let service = descriptor.service;
            info!(service = service.slug(), "routing to mcp pipeline");
            match self
                .mcp
                .run(descriptor, spec.text, spec.image_urls, sink)
                .await
            {
                Ok(result) => return Ok(result),
                Err(e) if service == McpService::Mail && e.is_context_overflow() => {
                    // Narrowed retry already happened inside the pipeline.
                    return Err(e);
                }
                Err(e) => {
                    warn!(service = service.slug(), error = %e, "mcp failed, falling back to agent");
                }
            }
        }

        self.agent
            .run(
                &AgentRunSpec {
                    text: spec.text,
                    image_urls: spec.image_urls,
                    vector_store_id: spec.vector_store_id,
                    model_override: spec.model_override,
                },
                sink,
            )
            .await
    }

    /// Direct reasoner access for the `+think` command flow.
    pub async fn deep_analysis(&self, prompt: &str) -> Result<String> {
        self.agent.deep_analysis(prompt).await
    }
}
