//! Agent error type.

use parley_core::error::{ContextError, ProviderError, ToolError};
use thiserror::Error;

/// Failures surfaced by the orchestrator entry points.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Context(#[from] ContextError),
}

impl From<AgentError> for parley_core::Error {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::Provider(e) => Self::Provider(e),
            AgentError::Tool(e) => Self::Tool(e),
            AgentError::Context(e) => Self::Context(e),
        }
    }
}
