//! Concurrency and rate-limit governor shared by all outbound API calls.
//!
//! Two pools: `Llm` (the model provider) and `Integration` (the MCP gateway).
//! Each pool owns a FIFO semaphore, sliding minute/hour request windows and a
//! retry budget. The governor has no knowledge of what an operation does.

mod envelope;
mod governor;

pub use envelope::{ApiPool, RateEnvelope};
pub use governor::{PoolStats, RateGovernor};
