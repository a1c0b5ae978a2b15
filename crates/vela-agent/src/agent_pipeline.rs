//! Native agent pipeline: streamed multi-turn over the provider's agent
//! runner, with hosted tools (web search, file search, image generation,
//! MCP services) executed provider-side and the thinking function tool
//! executed here.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use vela_core::config::AgentConfig;
use vela_governor::{ApiPool, RateGovernor};

use crate::error::{ProviderError, Result};
use crate::mcp::McpRegistry;
use crate::mcp_pipeline::drive_stream;
use crate::prompt::{agent_instructions, thinking_tool_json};
use crate::provider::{
    PipelineResult, ResponsesClient, ResponsesInput, ResponsesRequest, StreamSink,
};
use crate::stream::ToolCallEvent;
use crate::thinking::ThinkingAgent;

/// Client-side function-call loop bound — hosted tools don't count against
/// this, the provider chains them within a single streamed response.
const MAX_TURNS: usize = 6;

pub struct AgentRunSpec<'a> {
    pub text: &'a str,
    pub image_urls: &'a [String],
    /// Thread-scoped vector index for file search, when documents exist.
    pub vector_store_id: Option<&'a str>,
    pub model_override: Option<&'a str>,
}

pub struct AgentPipeline {
    client: Arc<dyn ResponsesClient>,
    governor: Arc<RateGovernor>,
    thinking: ThinkingAgent,
    registry: Arc<McpRegistry>,
    models: AgentConfig,
}

impl AgentPipeline {
    pub fn new(
        client: Arc<dyn ResponsesClient>,
        governor: Arc<RateGovernor>,
        registry: Arc<McpRegistry>,
        models: AgentConfig,
    ) -> Self {
        let thinking = ThinkingAgent::new(Arc::clone(&client), models.reasoner_model.clone());
        Self {
            client,
            governor,
            thinking,
            registry,
            models,
        }
    }

    /// Effective model for a run: explicit override, else the vision model
    /// when image inputs are present, else the text model. The configured
    /// defaults are never mutated.
    fn resolve_model(&self, spec: &AgentRunSpec<'_>) -> String {
        if let Some(m) = spec.model_override {
            return m.to_string();
        }
        if spec.image_urls.is_empty() {
            self.models.text_model.clone()
        } else {
            self.models.vision_model.clone()
        }
    }

    fn build_tools(&self, vector_store_id: Option<&str>) -> Vec<Value> {
        let mut tools = vec![
            json!({ "type": "web_search", "search_context_size": "medium" }),
            json!({ "type": "image_generation" }),
            thinking_tool_json(),
        ];
        if let Some(id) = vector_store_id {
            tools.push(json!({
                "type": "file_search",
                "vector_store_ids": [id],
                "max_num_results": 5,
            }));
        }
        for descriptor in self.registry.descriptors() {
            tools.push(descriptor.tool_json());
        }
        tools
    }

    pub async fn run(
        &self,
        spec: &AgentRunSpec<'_>,
        sink: &dyn StreamSink,
    ) -> Result<PipelineResult> {
        let model = self.resolve_model(spec);
        let tools = self.build_tools(spec.vector_store_id);
        let instructions = agent_instructions(&self.registry.tools_description());

        info!(model = %model, images = spec.image_urls.len(), "agent pipeline: run");

        let mut items = initial_items(spec.text, spec.image_urls);
        let mut aggregate = PipelineResult::default();

        for turn in 0..MAX_TURNS {
            let req = ResponsesRequest {
                model: model.clone(),
                input: ResponsesInput::Items(items.clone()),
                instructions: Some(instructions.clone()),
                tools: tools.clone(),
                tool_choice: None,
            };

            let result = self
                .governor
                .execute(ApiPool::Llm, "agent_stream", || {
                    drive_stream(Arc::clone(&self.client), req.clone(), sink)
                })
                .await?;

            if !result.text.is_empty() {
                aggregate.text = result.text;
            }
            if result.generated_image.is_some() {
                aggregate.generated_image = result.generated_image;
            }
            aggregate.usage.input += result.usage.input;
            aggregate.usage.output += result.usage.output;

            let function_calls: Vec<ToolCallEvent> = result
                .tool_calls
                .iter()
                .filter(|c| c.name == "deep_thinking_analysis" && c.call_id.is_some())
                .cloned()
                .collect();

            aggregate.tool_calls.extend(result.tool_calls);
            sink.on_tool_calls(&aggregate.tool_calls).await;

            if function_calls.is_empty() {
                return Ok(aggregate);
            }

            // Execute the function tools here and feed the outputs back.
            for call in function_calls {
                let call_id = call.call_id.clone().unwrap_or_default();
                let output = self.execute_function(&call).await;
                items.push(json!({
                    "type": "function_call",
                    "call_id": call_id,
                    "name": call.name,
                    "arguments": arguments_string(&call.arguments),
                }));
                items.push(json!({
                    "type": "function_call_output",
                    "call_id": call_id,
                    "output": output,
                }));
            }
            info!(turn, "function outputs submitted, continuing loop");
        }

        warn!(max_turns = MAX_TURNS, "agent loop hit turn limit");
        if aggregate.text.is_empty() {
            return Err(ProviderError::Stream(format!(
                "agent loop exceeded {MAX_TURNS} turns without a final response"
            )));
        }
        Ok(aggregate)
    }

    async fn execute_function(&self, call: &ToolCallEvent) -> String {
        let query = extract_query(&call.arguments);
        match self
            .governor
            .execute(ApiPool::Llm, "deep_thinking", || {
                let query = query.clone();
                async move { self.thinking.analyze(&query).await }
            })
            .await
        {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(error = %e, "thinking tool failed");
                format!("Erro na análise profunda: {e}. Tente novamente ou reformule a pergunta.")
            }
        }
    }

    /// Direct entry for the `+think` command: skips the outer agent and
    /// queries the reasoner, with history prepended when available.
    pub async fn deep_analysis(&self, prompt: &str) -> Result<String> {
        self.governor
            .execute(ApiPool::Llm, "deep_thinking_direct", || {
                async move { self.thinking.analyze(prompt).await }
            })
            .await
    }
}

fn initial_items(text: &str, image_urls: &[String]) -> Vec<Value> {
    let mut parts = vec![json!({ "type": "input_text", "text": text })];
    for url in image_urls {
        parts.push(json!({
            "type": "input_image",
            "image_url": url,
            "detail": "low",
        }));
    }
    vec![json!({ "role": "user", "content": parts })]
}

/// Function-call arguments arrive either as a JSON object or as a string of
/// JSON. Extract the `query` field, falling back to the raw text.
fn extract_query(arguments: &Value) -> String {
    let object = match arguments {
        Value::String(s) => serde_json::from_str::<Value>(s).unwrap_or(Value::Null),
        other => other.clone(),
    };
    object
        .get("query")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| arguments.to_string())
}

fn arguments_string(arguments: &Value) -> String {
    match arguments {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::McpService;
    use crate::provider::NoopSink;
    use crate::stream::{RunnerEvent, TokenUsage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use vela_core::config::{McpEndpoint, McpGatewayConfig};
    use vela_governor::RateEnvelope;

    fn registry() -> Arc<McpRegistry> {
        Arc::new(McpRegistry::from_config(&McpGatewayConfig {
            endpoints: vec![McpEndpoint {
                slug: "mail".into(),
                url: "https://gateway.example/mail/mcp".into(),
                api_key: "k".into(),
            }],
        }))
    }

    fn governor() -> Arc<RateGovernor> {
        let env = RateEnvelope {
            max_concurrent: 8,
            requests_per_minute: 10_000,
            requests_per_hour: 1_000_000,
            retry_attempts: 1,
            min_wait: std::time::Duration::from_millis(1),
            max_wait: std::time::Duration::from_millis(2),
        };
        Arc::new(RateGovernor::new(env.clone(), env))
    }

    /// First stream emits a thinking function call; second emits the answer.
    struct FunctionCallClient {
        stream_calls: AtomicUsize,
        requests: Mutex<Vec<ResponsesRequest>>,
    }

    #[async_trait]
    impl ResponsesClient for FunctionCallClient {
        async fn stream(
            &self,
            req: &ResponsesRequest,
            tx: mpsc::Sender<RunnerEvent>,
        ) -> Result<()> {
            self.requests.lock().unwrap().push(req.clone());
            let n = self.stream_calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                let _ = tx
                    .send(RunnerEvent::ToolCall(ToolCallEvent {
                        name: "deep_thinking_analysis".into(),
                        call_id: Some("call_7".into()),
                        arguments: json!({"query": "rollout plan"}),
                        output: None,
                        error: None,
                    }))
                    .await;
            } else {
                let _ = tx
                    .send(RunnerEvent::TextDelta {
                        delta: "Plano: fase 1, fase 2.".into(),
                    })
                    .await;
            }
            let _ = tx
                .send(RunnerEvent::Completed {
                    usage: TokenUsage { input: 5, output: 5 },
                })
                .await;
            Ok(())
        }

        async fn complete(&self, _req: &ResponsesRequest) -> Result<String> {
            Ok("Análise profunda do rollout.".into())
        }
    }

    #[tokio::test]
    async fn function_call_loop_executes_thinking_and_continues() {
        let client = Arc::new(FunctionCallClient {
            stream_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        });
        let pipeline = AgentPipeline::new(
            client.clone(),
            governor(),
            registry(),
            AgentConfig::default(),
        );

        let spec = AgentRunSpec {
            text: "+think how should we roll this out?",
            image_urls: &[],
            vector_store_id: None,
            model_override: None,
        };
        let result = pipeline.run(&spec, &NoopSink).await.unwrap();

        assert_eq!(result.text, "Plano: fase 1, fase 2.");
        assert!(result
            .tool_calls
            .iter()
            .any(|c| c.name == "deep_thinking_analysis"));

        // The second streamed request carries the function output item.
        let requests = client.requests.lock().unwrap();
        let second = &requests[1];
        let items = match &second.input {
            ResponsesInput::Items(items) => items,
            _ => panic!("expected item input"),
        };
        assert!(items
            .iter()
            .any(|i| i["type"] == "function_call_output" && i["call_id"] == "call_7"));
    }

    #[tokio::test]
    async fn vision_requests_use_vision_model() {
        let client = Arc::new(FunctionCallClient {
            stream_calls: AtomicUsize::new(1), // skip the function-call turn
            requests: Mutex::new(Vec::new()),
        });
        let pipeline = AgentPipeline::new(
            client.clone(),
            governor(),
            registry(),
            AgentConfig::default(),
        );

        let images = vec!["https://x/cat.png".to_string()];
        let spec = AgentRunSpec {
            text: "what about the attached image?",
            image_urls: &images,
            vector_store_id: None,
            model_override: None,
        };
        pipeline.run(&spec, &NoopSink).await.unwrap();

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests[0].model, "gpt-4o");
    }

    #[tokio::test]
    async fn file_search_tool_bound_only_when_index_exists() {
        let client = Arc::new(FunctionCallClient {
            stream_calls: AtomicUsize::new(1),
            requests: Mutex::new(Vec::new()),
        });
        let pipeline = AgentPipeline::new(
            client.clone(),
            governor(),
            registry(),
            AgentConfig::default(),
        );

        let spec = AgentRunSpec {
            text: "summarise",
            image_urls: &[],
            vector_store_id: Some("vs_abc"),
            model_override: None,
        };
        pipeline.run(&spec, &NoopSink).await.unwrap();

        let requests = client.requests.lock().unwrap();
        let tools = &requests[0].tools;
        let fs = tools.iter().find(|t| t["type"] == "file_search").unwrap();
        assert_eq!(fs["vector_store_ids"][0], "vs_abc");
        // MCP services ride along as hosted tools.
        assert!(tools.iter().any(|t| t["type"] == "mcp"));
    }

    #[tokio::test]
    async fn no_index_means_no_file_search_tool() {
        let client = Arc::new(FunctionCallClient {
            stream_calls: AtomicUsize::new(1),
            requests: Mutex::new(Vec::new()),
        });
        let pipeline = AgentPipeline::new(
            client.clone(),
            governor(),
            registry(),
            AgentConfig::default(),
        );
        let spec = AgentRunSpec {
            text: "oi",
            image_urls: &[],
            vector_store_id: None,
            model_override: None,
        };
        pipeline.run(&spec, &NoopSink).await.unwrap();
        let requests = client.requests.lock().unwrap();
        assert!(!requests[0].tools.iter().any(|t| t["type"] == "file_search"));
    }

    #[test]
    fn query_extraction_handles_both_shapes() {
        assert_eq!(extract_query(&json!({"query": "a"})), "a");
        assert_eq!(extract_query(&json!("{\"query\": \"b\"}")), "b");
        let fallback = extract_query(&json!({"other": 1}));
        assert!(fallback.contains("other"));
    }

    #[test]
    fn registry_is_used_for_mail_service() {
        let reg = registry();
        assert!(reg.get(McpService::Mail).is_some());
    }
}
