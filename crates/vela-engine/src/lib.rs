//! The message-processing engine: event router, thread-context assembler,
//! streaming presenter and the orchestrator tying them to the model-side
//! pipelines.

pub mod context;
pub mod orchestrator;
pub mod presenter;
pub mod router;
pub mod state;
mod thinkflow;

pub use orchestrator::Orchestrator;
pub use router::EventRouter;
pub use state::EngineState;
