use klaude_core::{InvalidEventError, ModelError};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// The orchestrator tried to append an event the session log rejected.
    #[error("session log rejected event: {0}")]
    Log(#[from] InvalidEventError),

    #[error("max turns exceeded: {0}")]
    MaxTurnsExceeded(u32),

    #[error("sub-agent depth limit reached: {0}")]
    DepthExceeded(u32),

    #[error("aborted")]
    Aborted,
}
