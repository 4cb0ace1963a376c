// ABOUTME: Boundary traits for the agent engine that drives a conversation
// ABOUTME: Engines are blocking and stateful; the coordinator only runs them on background threads

use crate::events::EventSink;
use crate::model::Message;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Invalid agent configuration: {0}")]
    InvalidConfig(String),

    #[error("Engine execution failed: {0}")]
    Execution(String),

    #[error("Engine is closed")]
    Closed,
}

/// Snapshot of the engine's own flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineState {
    pub paused: bool,
    pub finished: bool,
    pub waiting_for_confirmation: bool,
}

/// A stateful agent instance.
///
/// `run` blocks until the agent pauses, finishes, waits for confirmation or is
/// closed; calling it again continues where it left off. The other methods may
/// be called from any thread while `run` is in progress.
pub trait AgentEngine: Send + Sync {
    fn run(&self) -> Result<(), EngineError>;

    /// Ask a running loop to stop at the next step boundary
    fn pause(&self) -> Result<(), EngineError>;

    /// Release resources; a blocked `run` must return soon after
    fn close(&self) -> Result<(), EngineError>;

    fn send_message(&self, message: Message) -> Result<(), EngineError>;

    fn state(&self) -> EngineState;
}

/// Everything an engine needs at construction time
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub conversation_id: Uuid,
    pub agent_config: serde_json::Value,
    /// Directory the agent's tools operate in
    pub working_dir: PathBuf,
    /// Directory the engine may persist its own state to
    pub persistence_dir: PathBuf,
    pub events: EventSink,
}

/// Builds engine instances from stored agent configuration
pub trait EngineFactory: Send + Sync {
    /// Fails with [`EngineError::InvalidConfig`] when the configuration is unusable
    fn create(&self, context: EngineContext) -> Result<Arc<dyn AgentEngine>, EngineError>;
}
