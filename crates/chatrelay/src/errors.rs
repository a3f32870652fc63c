use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a tool call could not produce a result.
///
/// These travel back to the model as the tool's output and to the client as
/// `tool-output-error` frames, so they stay serializable.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    /// The model named a tool no registered toolkit offers
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Arguments were not valid JSON or did not match the tool schema
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}

pub type AgentResult<T> = Result<T, AgentError>;
