//! Model-side machinery: the Responses-API client, the normalized streaming
//! event shapes, capability-tag derivation, keyword tool routing, the MCP
//! pipeline family and the native agent pipeline.

pub mod agent_pipeline;
pub mod error;
pub mod mcp;
pub mod mcp_pipeline;
pub mod openai;
pub mod processor;
pub mod prompt;
pub mod provider;
pub mod stream;
pub mod tags;
pub mod thinking;

pub use error::ProviderError;
pub use processor::AgentRuntime;
pub use provider::{PipelineResult, ResponsesClient, StreamSink, TokenUsage};
pub use stream::{RunnerEvent, ToolCallEvent};
