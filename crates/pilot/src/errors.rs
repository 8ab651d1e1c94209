use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures of a single tool call. These are data, not faults: the agent folds
/// them back into the conversation so the model can correct itself.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Missing required parameter '{param}' for tool '{tool}'")]
    MissingParameter { tool: String, param: String },

    #[error("Parameter '{param}' must be {expected}, got {found}")]
    InvalidType {
        param: String,
        expected: String,
        found: String,
    },

    #[error("Parameter '{param}' is out of range: {detail}")]
    OutOfRange { param: String, detail: String },

    #[error("Could not parse tool arguments: {0}")]
    MalformedArguments(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

pub type ToolResult<T> = Result<T, ToolError>;

/// Failures of a request sent to the control target.
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum RemoteError {
    #[error("OBS is not connected")]
    NotConnected,

    #[error("Connection to OBS was lost")]
    ConnectionLost,

    #[error("OBS did not answer '{0}' in time")]
    Timeout(String),

    #[error("OBS rejected '{request_type}' (code {code}): {comment}")]
    RequestFailed {
        request_type: String,
        code: i64,
        comment: String,
    },

    #[error("Unexpected response from OBS: {0}")]
    Protocol(String),
}

/// Failures while establishing a control target connection.
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum ConnectionError {
    #[error("Could not reach OBS at {address}: {reason}")]
    Unreachable { address: String, reason: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Timed out connecting to OBS at {0}")]
    Timeout(String),
}

/// Failures of a whole generation.
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("A reply is already being generated")]
    Busy,

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Gave up after {0} rounds of tool calls")]
    ToolRoundLimit(usize),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;
