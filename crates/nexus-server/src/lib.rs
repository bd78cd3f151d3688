pub mod client;
pub mod orchestrator;
pub mod server;

pub use client::{BroadcastReport, ConnectionRegistry};
pub use orchestrator::{ConversationOrchestrator, PipelineConfig, TurnOutcome};
pub use server::{start, BridgeServices, ServerConfig, ServerHandle};
